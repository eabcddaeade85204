//! Docling backend: page text from the Docling document converter, word
//! boxes from Tesseract on the enhanced raster.
//!
//! The converter is best-effort. When it is missing, fails or produces
//! nothing, the page text falls back to the joined word detections.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbImage;
use tracing::{debug, warn};

use super::command::run_command;
use super::image_io::save_rgb;
use super::ocr::{OcrBackend, OcrBackendKind};
use super::preprocess::enhance;
use super::tesseract::TesseractBackend;
use super::types::Recognition;
use super::ExtractionError;
use crate::config::OcrSettings;

const PAGE_STEM: &str = "page";

pub struct DoclingBackend {
    program: String,
    timeout: Duration,
    words: TesseractBackend,
}

impl DoclingBackend {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            program: settings.docling_cmd.clone(),
            timeout: Duration::from_secs(settings.command_timeout_secs),
            words: TesseractBackend::new(settings),
        }
    }

    /// Convert one page image to plain text.
    fn convert(&self, image: &RgbImage) -> Result<String, ExtractionError> {
        let workdir = tempfile::Builder::new().prefix("laudo-docling-").tempdir()?;
        let input = workdir.path().join(format!("{PAGE_STEM}.png"));
        save_rgb(image, &input)?;
        let output_dir = workdir.path().join("out");
        std::fs::create_dir_all(&output_dir)?;

        let args: [&OsStr; 5] = [
            input.as_os_str(),
            OsStr::new("--to"),
            OsStr::new("text"),
            OsStr::new("--output"),
            output_dir.as_os_str(),
        ];
        run_command(&self.program, args, self.timeout)?;

        let text_path = find_output(&output_dir)?;
        let raw = std::fs::read_to_string(&text_path)?;
        Ok(collapse_whitespace(&raw))
    }

    /// Converter text, or `None` with a warning on any failure.
    fn convert_best_effort(&self, image: &RgbImage, warnings: &mut Vec<String>) -> Option<String> {
        match self.convert(image) {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => {
                debug!("Docling produced no text, using word detections");
                None
            }
            Err(e) => {
                warn!(error = %e, "Docling conversion failed, using word detections");
                warnings.push(format!("docling conversion failed: {e}"));
                None
            }
        }
    }
}

/// The converter names its output after the input stem; accept any `.txt`.
fn find_output(dir: &Path) -> Result<PathBuf, ExtractionError> {
    let expected = dir.join(format!("{PAGE_STEM}.txt"));
    if expected.is_file() {
        return Ok(expected);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "txt") {
            return Ok(path);
        }
    }
    Err(ExtractionError::OcrProcessing(
        "docling wrote no text output".into(),
    ))
}

/// Collapse every whitespace run (newlines included) into one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl OcrBackend for DoclingBackend {
    fn kind(&self) -> OcrBackendKind {
        OcrBackendKind::Docling
    }

    fn recognize(&self, image: &RgbImage) -> Result<Recognition, ExtractionError> {
        let mut warnings = Vec::new();
        let full_text = self.convert_best_effort(image, &mut warnings);

        // Boxes and confidences come from a different engine than the text;
        // the two can disagree.
        let enhanced = enhance(image);
        let detections = self.words.detect_words(&enhanced.image)?;

        Ok(Recognition {
            full_text,
            detections,
            scale_factor: enhanced.scale_factor,
            enhanced: Some(enhanced.image),
            warnings,
        })
    }
}
