use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::StructuringError;
use crate::config::{LlmSettings, RetrySettings};
use crate::pipeline::retry::RetryPolicy;

/// HTTP client for an OpenAI-compatible chat completions endpoint
/// (Ollama's `/v1/chat/completions` by default).
pub struct OllamaClient {
    api_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(settings: &LlmSettings, retry: &RetrySettings) -> Result<Self, StructuringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            api_url: settings.api_url.clone(),
            model: settings.model.clone(),
            client,
            timeout_secs: settings.timeout_secs,
            retry: RetryPolicy::from_settings(retry),
        })
    }

    fn complete_once(&self, body: &ChatRequest<'_>) -> Result<String, StructuringError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    StructuringError::Connection(self.api_url.clone())
                } else if e.is_timeout() {
                    StructuringError::Timeout(self.timeout_secs)
                } else {
                    StructuringError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| StructuringError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| StructuringError::MalformedResponse("response has no choices".into()))
    }
}

/// Request body for `/v1/chat/completions`
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from `/v1/chat/completions`
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

impl LlmClient for OllamaClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, StructuringError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
        };

        self.retry.run(
            "llm chat completion",
            || self.complete_once(&body),
            StructuringError::is_transient,
        )
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.api_url, self.model)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock LLM client for testing. Returns a configurable response and
/// records every user prompt it receives.
pub struct MockLlmClient {
    response: Result<String, u16>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with the given HTTP status.
    pub fn failing(status: u16) -> Self {
        Self {
            response: Err(status),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn complete(&self, _system: &str, user: &str) -> Result<String, StructuringError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(user.to_string());
        }
        match &self.response {
            Ok(content) => Ok(content.clone()),
            Err(status) => Err(StructuringError::Http {
                status: *status,
                body: "mock failure".into(),
            }),
        }
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}
