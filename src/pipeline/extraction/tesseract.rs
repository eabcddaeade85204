//! Tesseract OCR backend.
//!
//! Runs the `tesseract` command line on the enhanced raster: once in block
//! mode (`--psm 6 --oem 3`) for the page text and once with `tsv` output
//! for per-word boxes and confidences.

use std::path::Path;
use std::time::Duration;

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::debug;

use super::command::run_command;
use super::image_io::write_temp_png;
use super::ocr::{OcrBackend, OcrBackendKind};
use super::preprocess::enhance;
use super::types::{RawBox, Recognition, WordDetection};
use super::ExtractionError;
use crate::config::OcrSettings;

/// TSV level for word rows.
const TSV_WORD_LEVEL: i32 = 5;

pub struct TesseractBackend {
    program: String,
    language: String,
    timeout: Duration,
}

impl TesseractBackend {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            program: settings.tesseract_cmd.clone(),
            language: settings.language.clone(),
            timeout: Duration::from_secs(settings.command_timeout_secs),
        }
    }

    fn run(&self, image_path: &Path, extra: &[&str]) -> Result<String, ExtractionError> {
        let mut args: Vec<String> = vec![
            image_path.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        args.extend(extra.iter().map(|a| a.to_string()));
        Ok(run_command(&self.program, &args, self.timeout)?.stdout)
    }

    /// Page text in uniform-block mode.
    pub fn read_text(&self, image_path: &Path) -> Result<String, ExtractionError> {
        self.run(image_path, &["--psm", "6", "--oem", "3"])
    }

    /// Word boxes as measured on the image at `image_path`.
    pub fn read_words(&self, image_path: &Path) -> Result<Vec<WordDetection>, ExtractionError> {
        let tsv = self.run(image_path, &["tsv"])?;
        Ok(parse_tsv_words(&tsv))
    }

    /// Word boxes for an already enhanced raster.
    pub fn detect_words(&self, enhanced: &GrayImage) -> Result<Vec<WordDetection>, ExtractionError> {
        let temp = write_temp_png(&DynamicImage::ImageLuma8(enhanced.clone()))?;
        self.read_words(temp.path())
    }
}

impl OcrBackend for TesseractBackend {
    fn kind(&self) -> OcrBackendKind {
        OcrBackendKind::Tesseract
    }

    fn recognize(&self, image: &RgbImage) -> Result<Recognition, ExtractionError> {
        let enhanced = enhance(image);
        let temp = write_temp_png(&DynamicImage::ImageLuma8(enhanced.image.clone()))?;

        let text = self.read_text(temp.path())?;
        let detections = self.read_words(temp.path())?;

        debug!(
            chars = text.len(),
            detections = detections.len(),
            "Tesseract recognized page"
        );

        Ok(Recognition {
            full_text: Some(text),
            detections,
            scale_factor: enhanced.scale_factor,
            enhanced: Some(enhanced.image),
            warnings: vec![],
        })
    }
}

/// Parse Tesseract TSV output into raw word detections.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
///
/// Rows with a `-1` confidence are kept; the normalizer drops them.
pub fn parse_tsv_words(tsv: &str) -> Vec<WordDetection> {
    let mut results = Vec::new();

    for line in tsv.lines().skip(1) {
        // Skip header row
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = match fields[0].trim().parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != TSV_WORD_LEVEL {
            continue;
        }

        // Tesseract 4 prints integer confidences, 5 prints floats.
        let confidence: f64 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let Some(bbox) = parse_bounding_box(fields[6], fields[7], fields[8], fields[9]) else {
            continue;
        };

        results.push(WordDetection {
            text: fields[11].to_string(),
            confidence,
            bbox,
        });
    }

    results
}

/// Parse bounding box coordinates from TSV string fields.
fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<RawBox> {
    Some(RawBox {
        x: left.trim().parse().ok()?,
        y: top.trim().parse().ok()?,
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t1200\t800\t-1\t\n\
4\t1\t1\t1\t1\t0\t40\t60\t500\t30\t-1\t\n\
5\t1\t1\t1\t1\t1\t40\t60\t120\t30\t96.5\tAorta\n\
5\t1\t1\t1\t1\t2\t170\t60\t80\t30\t71\t32mm\n\
5\t1\t1\t1\t1\t3\t260\t60\t10\t30\t-1\t \n";

    #[test]
    fn parses_word_rows_only() {
        let words = parse_tsv_words(SAMPLE_TSV);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Aorta");
        assert!((words[0].confidence - 96.5).abs() < 1e-9);
        assert_eq!(words[1].bbox.x, 170.0);
        assert_eq!(words[1].bbox.height, 30.0);
    }

    #[test]
    fn keeps_no_confidence_rows_for_normalizer() {
        let words = parse_tsv_words(SAMPLE_TSV);
        assert_eq!(words[2].confidence, -1.0);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let tsv = "header\n5\t1\t1\t1\t1\t1\tx\t0\t1\t1\t90\tword\n5\t1\n";
        assert!(parse_tsv_words(tsv).is_empty());
    }

    #[test]
    fn missing_binary_is_reported() {
        let settings = OcrSettings {
            tesseract_cmd: "laudo-missing-tesseract".into(),
            ..OcrSettings::default()
        };
        let backend = TesseractBackend::new(&settings);
        let err = backend.recognize(&RgbImage::new(8, 8)).unwrap_err();
        assert!(matches!(err, ExtractionError::BackendNotAvailable(_)));
    }

    #[test]
    fn recognizes_when_installed() {
        let backend = TesseractBackend::new(&OcrSettings {
            language: "eng".into(),
            ..OcrSettings::default()
        });
        let probe = run_command("tesseract", ["--version"], Duration::from_secs(10));
        if probe.is_err() {
            eprintln!("tesseract not installed, skipping");
            return;
        }
        let recognition = backend
            .recognize(&RgbImage::from_pixel(40, 20, image::Rgb([255, 255, 255])))
            .unwrap();
        assert!((recognition.scale_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(recognition.enhanced.unwrap().dimensions(), (80, 40));
    }
}
