use std::path::{Path, PathBuf};

use super::parser::parse_fields;
use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::types::{ExtractionOutcome, ExtractionResponse, LlmClient, StructuredField};
use super::StructuringError;
use crate::pipeline::workflow::{StageLayout, WorkflowStage};

/// Timestamp identity of an extraction run, `YYYYMMDD_HHMMSS` in local time.
pub fn extraction_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Turns recognized text into clinical fields:
/// prompt → LLM → parse → outcome
pub struct ExtractionService {
    llm: Box<dyn LlmClient>,
    variables: Vec<String>,
    layout: StageLayout,
}

impl ExtractionService {
    pub fn new(llm: Box<dyn LlmClient>, variables: Vec<String>, layout: StageLayout) -> Self {
        Self {
            llm,
            variables,
            layout,
        }
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    /// Structure `text`, reporting how well the model's answer held up.
    /// Never fails: transport and parse problems become `Failure`.
    pub fn structure(&self, text: &str) -> ExtractionOutcome {
        if text.trim().is_empty() {
            return ExtractionOutcome::Failure {
                reason: "no text to structure".into(),
            };
        }

        let prompt = build_extraction_prompt(text, &self.variables);
        let content = match self.llm.complete(EXTRACTION_SYSTEM_PROMPT, &prompt) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    endpoint = %self.llm.describe(),
                    error = %e,
                    "Structured extraction call failed"
                );
                return ExtractionOutcome::Failure {
                    reason: e.to_string(),
                };
            }
        };

        let outcome = parse_fields(&content);
        match &outcome {
            ExtractionOutcome::Success { fields } => {
                tracing::debug!(fields = fields.len(), "Structured extraction complete");
            }
            ExtractionOutcome::Degraded { fields, reason } => {
                tracing::warn!(fields = fields.len(), reason = %reason, "Structured extraction degraded");
            }
            ExtractionOutcome::Failure { reason } => {
                tracing::warn!(reason = %reason, "Unparseable structured extraction response");
            }
        }
        outcome
    }

    /// Fields only; any failure yields an empty list.
    pub fn structure_text(&self, text: &str) -> Vec<StructuredField> {
        self.structure(text).into_fields()
    }

    /// Structure `text` and save the fields as `structured_{timestamp}.csv`
    /// in the structured stage.
    pub fn extract_and_save(&self, text: &str) -> Result<ExtractionResponse, StructuringError> {
        let timestamp = extraction_timestamp();
        let fields = self.structure_text(text);

        let dir = self.layout.dir(WorkflowStage::Structured);
        std::fs::create_dir_all(dir)?;
        let path = csv_path(dir, &timestamp);
        let csv_data = fields_csv(&fields)?;
        std::fs::write(&path, &csv_data)?;

        tracing::info!(
            timestamp = %timestamp,
            fields = fields.len(),
            path = %path.display(),
            "Extraction saved"
        );

        Ok(ExtractionResponse {
            success: true,
            timestamp,
            csv_data,
        })
    }
}

pub fn csv_path(dir: &Path, timestamp: &str) -> PathBuf {
    dir.join(format!("structured_{timestamp}.csv"))
}

/// `name,value` table of `fields`, header included.
pub fn fields_csv(fields: &[StructuredField]) -> Result<String, StructuringError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["name", "value"])?;
    for field in fields {
        writer.write_record([field.name.as_str(), field.value.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StructuringError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| StructuringError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
