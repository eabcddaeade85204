use serde::{Deserialize, Serialize};

use super::StructuringError;

/// One clinical variable extracted by the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredField {
    pub name: String,
    pub value: String,
    /// Originating OCR document; absent for ad-hoc text extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl StructuredField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            source: None,
        }
    }
}

/// How a structuring call went. Callers that only want fields use
/// [`ExtractionOutcome::into_fields`], which maps `Failure` to an empty list.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success { fields: Vec<StructuredField> },
    /// Usable fields, but part of the answer was discarded.
    Degraded {
        fields: Vec<StructuredField>,
        reason: String,
    },
    Failure { reason: String },
}

impl ExtractionOutcome {
    pub fn fields(&self) -> &[StructuredField] {
        match self {
            Self::Success { fields } | Self::Degraded { fields, .. } => fields,
            Self::Failure { .. } => &[],
        }
    }

    pub fn into_fields(self) -> Vec<StructuredField> {
        match self {
            Self::Success { fields } | Self::Degraded { fields, .. } => fields,
            Self::Failure { .. } => Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Single-text extraction, identified by its timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub success: bool,
    /// `YYYYMMDD_HHMMSS`; also names the saved CSV.
    pub timestamp: String,
    /// The saved `name,value` table, verbatim.
    pub csv_data: String,
}

/// One confirmed OCR document turned into fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDocument {
    pub filename: String,
    pub page: u32,
    pub fields: Vec<StructuredField>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub documents: Vec<BatchDocument>,
}

/// Chat-completion model abstraction (allows mocking).
///
/// Returns the assistant message content, untouched.
pub trait LlmClient: Send + Sync {
    fn complete(&self, system: &str, user: &str) -> Result<String, StructuringError>;

    /// Endpoint description for logs.
    fn describe(&self) -> String;
}

impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    fn complete(&self, system: &str, user: &str) -> Result<String, StructuringError> {
        (**self).complete(system, user)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_omitted_when_absent() {
        let json = serde_json::to_string(&StructuredField::new("Aorta", "32 mm")).unwrap();
        assert_eq!(json, r#"{"name":"Aorta","value":"32 mm"}"#);
    }

    #[test]
    fn failure_collapses_to_empty_fields() {
        let outcome = ExtractionOutcome::Failure {
            reason: "timeout".into(),
        };
        assert!(outcome.fields().is_empty());
        assert!(outcome.into_fields().is_empty());
    }

    #[test]
    fn degraded_keeps_its_fields() {
        let outcome = ExtractionOutcome::Degraded {
            fields: vec![StructuredField::new("VDF", "110 ml")],
            reason: "1 entry skipped".into(),
        };
        assert!(!outcome.is_failure());
        assert_eq!(outcome.into_fields().len(), 1);
    }
}
