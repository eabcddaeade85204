use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::extraction::OcrBackendKind;

/// Application-level constants
pub const APP_NAME: &str = "Laudo";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default maximum upload size: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Words at or above this confidence are tagged green.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 90.0;

/// Echocardiogram variables requested from the language model.
pub const DEFAULT_EXTRACTION_VARIABLES: &[&str] = &[
    "Aorta",
    "VE Diastólico",
    "Parede posterior",
    "VDF",
    "FE Teicholz",
    "Massa do VE",
    "Átrio esquerdo",
    "VE Sistólico",
    "Septo interventricular",
    "VSF",
    "FE Simpson",
];

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "laudo=info,warn"
}

/// Get the application data directory (~/Laudo/).
/// Falls back to the working directory when no home is resolvable.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default root for the on-disk workflow stages.
pub fn default_workflow_dir() -> PathBuf {
    app_data_dir().join("files_workflow")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown OCR backend: {0} (expected tesseract, docling or textract)")]
    UnknownBackend(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    pub backend: OcrBackendKind,
    pub confidence_threshold: f64,
    /// Tesseract language pack(s), e.g. "eng" or "por+eng". Stock installs
    /// only ship `eng`.
    pub language: String,
    pub tesseract_cmd: String,
    pub docling_cmd: String,
    /// Upper bound for any single OCR subprocess.
    pub command_timeout_secs: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Tesseract,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            language: "eng".to_string(),
            tesseract_cmd: "tesseract".to_string(),
            docling_cmd: "docling".to_string(),
            command_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSettings {
    pub allowed_image_extensions: Vec<String>,
    pub allowed_document_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            allowed_image_extensions: vec![".png".into(), ".jpg".into(), ".jpeg".into()],
            allowed_document_extensions: vec![".pdf".into()],
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible chat completions endpoint.
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1/chat/completions".to_string(),
            model: "llama3.1".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSettings {
    pub region: String,
    #[serde(skip_serializing)]
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    /// Overrides the regional Textract endpoint (e.g. a local emulator).
    pub endpoint_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            endpoint_url: None,
            timeout_secs: 60,
        }
    }
}

/// Retry budget for transient network failures at service boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_ms: 250,
        }
    }
}

/// Explicit configuration, built once and handed to each component constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub workflow_dir: PathBuf,
    pub ocr: OcrSettings,
    pub files: FileSettings,
    pub llm: LlmSettings,
    pub aws: AwsSettings,
    pub retry: RetrySettings,
    pub extraction_variables: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workflow_dir: default_workflow_dir(),
            ocr: OcrSettings::default(),
            files: FileSettings::default(),
            llm: LlmSettings::default(),
            aws: AwsSettings::default(),
            retry: RetrySettings::default(),
            extraction_variables: DEFAULT_EXTRACTION_VARIABLES
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by the process environment (after loading `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Separated from `from_env` so tests
    /// never touch process-wide state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("LAUDO_WORKFLOW_DIR") {
            config.workflow_dir = PathBuf::from(dir);
        }
        if let Some(backend) = get("LAUDO_OCR_BACKEND") {
            config.ocr.backend = OcrBackendKind::from_str(&backend)?;
        }
        if let Some(v) = get("LAUDO_CONFIDENCE_THRESHOLD") {
            config.ocr.confidence_threshold = parse_value("LAUDO_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("LAUDO_OCR_LANG") {
            config.ocr.language = v;
        }
        if let Some(v) = get("LAUDO_TESSERACT_CMD") {
            config.ocr.tesseract_cmd = v;
        }
        if let Some(v) = get("LAUDO_DOCLING_CMD") {
            config.ocr.docling_cmd = v;
        }
        if let Some(v) = get("LAUDO_MAX_FILE_SIZE") {
            config.files.max_file_size = parse_value("LAUDO_MAX_FILE_SIZE", &v)?;
        }
        if let Some(v) = get("LAUDO_LLM_URL") {
            config.llm.api_url = v;
        }
        if let Some(v) = get("LAUDO_LLM_MODEL") {
            config.llm.model = v;
        }
        if let Some(v) = get("LAUDO_LLM_TIMEOUT_SECS") {
            config.llm.timeout_secs = parse_value("LAUDO_LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("AWS_REGION") {
            config.aws.region = v;
        }
        config.aws.access_key = get("AWS_ACCESS_KEY");
        config.aws.secret_key = get("AWS_SECRET_KEY");
        config.aws.endpoint_url = get("LAUDO_AWS_ENDPOINT_URL");

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
