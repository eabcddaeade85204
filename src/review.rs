//! Correction store for the human review step.
//!
//! A reviewer edits the OCR document of one page and the edited version is
//! written into the ocr-confirmed stage, where the batch aggregator picks
//! it up.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::extraction::{file_stem, OcrResult};
use crate::pipeline::workflow::{StageLayout, WorkflowStage};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Invalid filename for correction: {0:?}")]
    InvalidFilename(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A human-corrected OCR document for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrCorrection {
    /// Name of the page's source file.
    pub filename: String,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(flatten)]
    pub ocr: OcrResult,
}

fn first_page() -> u32 {
    1
}

/// `{base}_ocr_corrected.json` for page 1, `{base}_page_{n}_ocr_corrected.json` after.
pub fn corrected_filename(filename: &str, page: u32) -> String {
    let base = file_stem(filename);
    if page > 1 {
        format!("{base}_page_{page}_ocr_corrected.json")
    } else {
        format!("{base}_ocr_corrected.json")
    }
}

/// Persist `correction` into the ocr-confirmed stage and return its path.
/// An earlier correction of the same page is replaced.
pub fn save_corrections(
    layout: &StageLayout,
    correction: &OcrCorrection,
) -> Result<PathBuf, ReviewError> {
    let name = correction.filename.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
        return Err(ReviewError::InvalidFilename(correction.filename.clone()));
    }

    let dir = layout.dir(WorkflowStage::OcrConfirmed);
    std::fs::create_dir_all(dir)?;
    let path = dir.join(corrected_filename(name, correction.page));
    std::fs::write(&path, serde_json::to_string_pretty(correction)?)?;

    tracing::info!(
        filename = %correction.filename,
        page = correction.page,
        words = correction.ocr.word_objects.len(),
        path = %path.display(),
        "OCR corrections saved"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::{BoundingBox, WordColor, WordObject};

    fn correction(filename: &str, page: u32) -> OcrCorrection {
        OcrCorrection {
            filename: filename.into(),
            page,
            ocr: OcrResult {
                text: "Átrio esquerdo 38".into(),
                word_objects: vec![WordObject {
                    text: "Átrio".into(),
                    confidence: 95.0,
                    bbox: BoundingBox {
                        x: 1,
                        y: 2,
                        width: 30,
                        height: 10,
                    },
                    color: WordColor::Green,
                }],
                mean_confidence: 95.0,
                warnings: vec![],
            },
        }
    }

    #[test]
    fn first_page_has_no_page_suffix() {
        assert_eq!(corrected_filename("eco.png", 1), "eco_ocr_corrected.json");
        assert_eq!(corrected_filename("laudo.pdf", 3), "laudo_page_3_ocr_corrected.json");
    }

    #[test]
    fn saved_document_is_flat_and_keeps_accents() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StageLayout::new(tmp.path());
        let path = save_corrections(&layout, &correction("eco.png", 1)).unwrap();
        assert!(path.ends_with("ocr-confirmed/eco_ocr_corrected.json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Átrio"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["filename"], "eco.png");
        assert_eq!(value["page"], 1);
        assert_eq!(value["word_objects"][0]["color"], "green");
    }

    #[test]
    fn resaving_replaces_the_previous_correction() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StageLayout::new(tmp.path());
        save_corrections(&layout, &correction("laudo.pdf", 2)).unwrap();
        let mut edited = correction("laudo.pdf", 2);
        edited.ocr.text = "corrigido".into();
        let path = save_corrections(&layout, &edited).unwrap();

        let loaded: OcrCorrection =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.ocr.text, "corrigido");
        let count = std::fs::read_dir(layout.dir(WorkflowStage::OcrConfirmed))
            .unwrap()
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn page_defaults_to_one_when_absent() {
        let raw = r#"{"filename":"eco.png","text":"","word_objects":[],"mean_confidence":0.0}"#;
        let parsed: OcrCorrection = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.page, 1);
    }

    #[test]
    fn path_like_filenames_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StageLayout::new(tmp.path());
        let err = save_corrections(&layout, &correction("../etc/passwd", 1)).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidFilename(_)));
    }
}
