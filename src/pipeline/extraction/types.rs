use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Confidence value engines use for "no word recognized here".
pub const NO_CONFIDENCE: f64 = -1.0;

/// Bounding box in original-image pixel space (for highlighting in review).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Box as measured by an engine, in whatever pixel space it ran on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Raw per-word engine output, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct WordDetection {
    pub text: String,
    /// Engine-native scale. `NO_CONFIDENCE` (or any negative) means no detection.
    pub confidence: f64,
    pub bbox: RawBox,
}

/// Review color for a recognized word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordColor {
    Green,
    Red,
}

impl WordColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Red => "red",
        }
    }

    /// Stroke color used by the annotated image (PIL named colors).
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Self::Green => [0, 128, 0],
            Self::Red => [255, 0, 0],
        }
    }
}

/// A normalized recognized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordObject {
    pub text: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub color: WordColor,
}

/// OCR outcome for a single page.
///
/// Serializes to the persisted OCR JSON document
/// `{text, word_objects, mean_confidence}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub word_objects: Vec<WordObject>,
    pub mean_confidence: f64,
    /// Degradation notes from the backend (converter failure, cloud failure).
    #[serde(skip)]
    pub warnings: Vec<String>,
}

/// What a backend hands back for one image.
#[derive(Debug, Default)]
pub struct Recognition {
    /// `None` asks the caller to derive the text from the normalized words.
    pub full_text: Option<String>,
    pub detections: Vec<WordDetection>,
    /// Ratio between the space `detections` were measured in and the original image.
    pub scale_factor: f64,
    /// The enhanced raster the engine read, when the backend enhanced.
    pub enhanced: Option<GrayImage>,
    pub warnings: Vec<String>,
}

/// A decoded page belonging to a document. Page index is 1-based.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page: usize,
    /// Filename used for every artifact derived from this page.
    pub filename: String,
    pub image: RgbImage,
}
