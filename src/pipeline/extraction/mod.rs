pub mod types;
pub mod confidence;
pub mod preprocess;
pub mod image_io;
pub mod annotate;
pub mod pdf;
pub mod pdfium;
pub mod command;
pub mod ocr;
pub mod tesseract;
pub mod docling;
pub mod textract;

pub use types::*;
pub use confidence::*;
pub use preprocess::*;
pub use annotate::*;
pub use pdf::*;
pub use pdfium::*;
pub use ocr::*;
pub use tesseract::TesseractBackend;
pub use docling::DoclingBackend;
pub use textract::TextractBackend;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("OCR backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR backend configuration error: {0}")]
    BackendConfig(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },
}

impl From<image::ImageError> for ExtractionError {
    fn from(e: image::ImageError) -> Self {
        ExtractionError::ImageProcessing(e.to_string())
    }
}
