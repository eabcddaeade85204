//! OCR backend abstraction.
//!
//! Three engines sit behind one trait and are normalized into the same
//! word-level schema:
//! - Tesseract: local engine via command line, reads the enhanced raster
//! - Docling: document converter for page text, Tesseract for word boxes
//! - Textract: AWS cloud engine, reads the original page

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::confidence::{build_page_result, normalize_detections};
use super::types::{OcrResult, RawBox, Recognition, WordDetection};
use super::{DoclingBackend, ExtractionError, TesseractBackend, TextractBackend};
use crate::config::{AppConfig, ConfigError};

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendKind {
    Tesseract,
    Docling,
    #[serde(alias = "aws")]
    Textract,
}

impl OcrBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendKind::Tesseract => "tesseract",
            OcrBackendKind::Docling => "docling",
            OcrBackendKind::Textract => "textract",
        }
    }
}

impl FromStr for OcrBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Ok(OcrBackendKind::Tesseract),
            "docling" => Ok(OcrBackendKind::Docling),
            "textract" | "aws" => Ok(OcrBackendKind::Textract),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for OcrBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recognition engine. Implementations report raw detections; the shared
/// normalizer turns them into review words.
pub trait OcrBackend: Send + Sync {
    fn kind(&self) -> OcrBackendKind;

    fn recognize(&self, image: &RgbImage) -> Result<Recognition, ExtractionError>;
}

/// Construct the configured backend. Misconfiguration fails here, before
/// any file is touched.
pub fn build_backend(config: &AppConfig) -> Result<Box<dyn OcrBackend>, ExtractionError> {
    let backend: Box<dyn OcrBackend> = match config.ocr.backend {
        OcrBackendKind::Tesseract => Box::new(TesseractBackend::new(&config.ocr)),
        OcrBackendKind::Docling => Box::new(DoclingBackend::new(&config.ocr)),
        OcrBackendKind::Textract => {
            Box::new(TextractBackend::new(&config.aws, &config.retry)?)
        }
    };
    debug!(backend = %backend.kind(), "OCR backend ready");
    Ok(backend)
}

/// One page through a backend and the normalizer.
pub struct PageOcr {
    pub result: OcrResult,
    /// The enhanced raster, when the backend produced one.
    pub enhanced: Option<GrayImage>,
}

pub fn run_ocr(
    backend: &dyn OcrBackend,
    image: &RgbImage,
    threshold: f64,
) -> Result<PageOcr, ExtractionError> {
    let recognition = backend.recognize(image)?;
    let (words, mean) =
        normalize_detections(&recognition.detections, recognition.scale_factor, threshold);

    debug!(
        backend = %backend.kind(),
        detections = recognition.detections.len(),
        words = words.len(),
        mean_confidence = mean,
        "OCR page normalized"
    );

    Ok(PageOcr {
        result: build_page_result(recognition.full_text, words, mean, recognition.warnings),
        enhanced: recognition.enhanced,
    })
}

// ── Mock for testing ──────────────────────────────────────

/// Mock OCR backend for unit testing without any engine installed.
pub struct MockOcrBackend {
    pub text: Option<String>,
    pub detections: Vec<WordDetection>,
    pub scale_factor: f64,
    pub fail: bool,
}

impl MockOcrBackend {
    /// Words laid out left to right on one line, 50 px apart.
    pub fn new(words: &[(&str, f64)]) -> Self {
        let detections = words
            .iter()
            .enumerate()
            .map(|(i, (text, confidence))| WordDetection {
                text: text.to_string(),
                confidence: *confidence,
                bbox: RawBox {
                    x: 2.0 + i as f64 * 50.0,
                    y: 4.0,
                    width: 40.0,
                    height: 12.0,
                },
            })
            .collect();
        Self {
            text: None,
            detections,
            scale_factor: 1.0,
            fail: false,
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }
}

impl OcrBackend for MockOcrBackend {
    fn kind(&self) -> OcrBackendKind {
        OcrBackendKind::Tesseract
    }

    fn recognize(&self, _image: &RgbImage) -> Result<Recognition, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::OcrProcessing("mock engine failure".into()));
        }
        Ok(Recognition {
            full_text: self.text.clone(),
            detections: self.detections.clone(),
            scale_factor: self.scale_factor,
            enhanced: None,
            warnings: vec![],
        })
    }
}
