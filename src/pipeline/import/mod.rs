pub mod format;
pub mod staging;

pub use format::*;
pub use staging::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("File {filename} exceeds maximum size limit of {limit_mb:.1}MB")]
    FileTooLarge { filename: String, limit_mb: f64 },
}
