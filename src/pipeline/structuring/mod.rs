pub mod types;
pub mod prompt;
pub mod parser;
pub mod ollama;
pub mod orchestrator;
pub mod batch;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use ollama::*;
pub use orchestrator::*;
pub use batch::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Language model is not reachable at {0}")]
    Connection(String),

    #[error("Language model returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Language model request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed language model response: {0}")]
    MalformedResponse(String),

    #[error("Confirmed OCR directory not found: {0}")]
    ConfirmedDirMissing(PathBuf),

    #[error("No confirmed OCR documents found in {0}")]
    NoConfirmedDocuments(PathBuf),

    #[error("No documents were successfully processed")]
    NothingStructured,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StructuringError {
    /// Worth another attempt: the endpoint may answer next time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
