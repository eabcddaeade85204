//! AWS Textract backend (`DetectDocumentText`).
//!
//! Reads the original page, not the enhanced raster. LINE blocks form the
//! page text, WORD blocks the detections. Geometry comes back as fractions
//! of the page and is converted to pixels here, so the scale factor is 1.
//!
//! The SDK is async; calls run on a private current-thread runtime so the
//! backend stays synchronous like the local engines.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_textract::config::{Credentials, Region};
use aws_sdk_textract::error::{DisplayErrorContext, SdkError};
use aws_sdk_textract::operation::detect_document_text::DetectDocumentTextError;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{Block, BlockType, Document};
use aws_sdk_textract::Client;
use image::{DynamicImage, RgbImage};
use tracing::{debug, warn};

use super::image_io::write_temp_png;
use super::ocr::{OcrBackend, OcrBackendKind};
use super::types::{RawBox, Recognition, WordDetection, NO_CONFIDENCE};
use super::ExtractionError;
use crate::config::{AwsSettings, RetrySettings};
use crate::pipeline::retry::RetryPolicy;

const CREDENTIALS_PROVIDER: &str = "laudo-config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Line,
    Word,
}

/// The part of a Textract block the pipeline uses. Geometry is fractional.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub kind: BlockKind,
    pub text: String,
    pub confidence: f64,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl TextBlock {
    fn from_sdk(block: &Block) -> Option<Self> {
        let kind = match block.block_type()? {
            BlockType::Line => BlockKind::Line,
            BlockType::Word => BlockKind::Word,
            _ => return None,
        };
        let text = block.text()?.to_string();
        let bbox = block.geometry().and_then(|g| g.bounding_box());
        Some(Self {
            kind,
            text,
            confidence: block.confidence().map(f64::from).unwrap_or(NO_CONFIDENCE),
            left: bbox.map(|b| b.left() as f64).unwrap_or_default(),
            top: bbox.map(|b| b.top() as f64).unwrap_or_default(),
            width: bbox.map(|b| b.width() as f64).unwrap_or_default(),
            height: bbox.map(|b| b.height() as f64).unwrap_or_default(),
        })
    }
}

/// Page text and pixel-space detections from Textract blocks.
pub fn blocks_to_recognition(blocks: &[TextBlock], width: u32, height: u32) -> Recognition {
    let text = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Line)
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let (w, h) = (width as f64, height as f64);
    let detections = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Word)
        .map(|b| WordDetection {
            text: b.text.clone(),
            confidence: b.confidence,
            bbox: RawBox {
                x: (b.left * w).trunc(),
                y: (b.top * h).trunc(),
                width: (b.width * w).trunc(),
                height: (b.height * h).trunc(),
            },
        })
        .collect();

    Recognition {
        full_text: Some(text),
        detections,
        scale_factor: 1.0,
        enhanced: None,
        warnings: vec![],
    }
}

/// Call failure, split by whether another attempt could help.
#[derive(Debug)]
enum CallError {
    Transient(String),
    Permanent(String),
}

impl CallError {
    fn is_transient(&self) -> bool {
        matches!(self, CallError::Transient(_))
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Transient(m) | CallError::Permanent(m) => f.write_str(m),
        }
    }
}

fn classify<R: std::fmt::Debug>(err: SdkError<DetectDocumentTextError, R>) -> CallError {
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(ctx) => {
            let e = ctx.err();
            e.is_throttling_exception()
                || e.is_provisioned_throughput_exceeded_exception()
                || e.is_internal_server_error()
        }
        _ => false,
    };
    let message = DisplayErrorContext(&err).to_string();
    if transient {
        CallError::Transient(message)
    } else {
        CallError::Permanent(message)
    }
}

pub struct TextractBackend {
    client: Client,
    runtime: tokio::runtime::Runtime,
    timeout: Duration,
    retry: RetryPolicy,
}

impl TextractBackend {
    /// Fails fast when either credential is missing or blank.
    pub fn new(aws: &AwsSettings, retry: &RetrySettings) -> Result<Self, ExtractionError> {
        let access_key = non_blank(aws.access_key.as_deref()).ok_or_else(|| {
            ExtractionError::BackendConfig("AWS access key is not configured".into())
        })?;
        let secret_key = non_blank(aws.secret_key.as_deref()).ok_or_else(|| {
            ExtractionError::BackendConfig("AWS secret key is not configured".into())
        })?;

        let credentials =
            Credentials::new(access_key, secret_key, None, None, CREDENTIALS_PROVIDER);
        // Retries are owned by RetryPolicy so the budget is the same for every boundary.
        let mut builder = aws_sdk_textract::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(aws.region.clone()))
            .credentials_provider(credentials)
            .retry_config(aws_sdk_textract::config::retry::RetryConfig::disabled());
        if let Some(url) = non_blank(aws.endpoint_url.as_deref()) {
            debug!(endpoint = %url, "Textract endpoint overridden");
            builder = builder.endpoint_url(url);
        }
        let config = builder.build();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            client: Client::from_conf(config),
            runtime,
            timeout: Duration::from_secs(aws.timeout_secs),
            retry: RetryPolicy::from_settings(retry),
        })
    }

    fn detect_once(&self, bytes: &[u8]) -> Result<Vec<TextBlock>, CallError> {
        let request = self
            .client
            .detect_document_text()
            .document(Document::builder().bytes(Blob::new(bytes.to_vec())).build())
            .send();
        let timeout = self.timeout;

        let output = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, request).await })
            .map_err(|_| {
                CallError::Transient(format!("no response within {}s", timeout.as_secs()))
            })?
            .map_err(classify)?;

        Ok(output.blocks().iter().filter_map(TextBlock::from_sdk).collect())
    }

    fn detect(&self, bytes: &[u8]) -> Result<Vec<TextBlock>, CallError> {
        self.retry.run(
            "textract.detect_document_text",
            || self.detect_once(bytes),
            CallError::is_transient,
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

impl OcrBackend for TextractBackend {
    fn kind(&self) -> OcrBackendKind {
        OcrBackendKind::Textract
    }

    fn recognize(&self, image: &RgbImage) -> Result<Recognition, ExtractionError> {
        let temp = write_temp_png(&DynamicImage::ImageRgb8(image.clone()))?;
        let bytes = std::fs::read(temp.path())?;

        match self.detect(&bytes) {
            Ok(blocks) => {
                debug!(blocks = blocks.len(), "Textract recognized page");
                Ok(blocks_to_recognition(&blocks, image.width(), image.height()))
            }
            Err(e) => {
                warn!(error = %e, "Textract call failed, page left empty");
                Ok(Recognition {
                    full_text: Some(String::new()),
                    detections: vec![],
                    scale_factor: 1.0,
                    enhanced: None,
                    warnings: vec![format!("textract call failed: {e}")],
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(kind: BlockKind, text: &str, confidence: f64, left: f64, top: f64) -> TextBlock {
        TextBlock {
            kind,
            text: text.into(),
            confidence,
            left,
            top,
            width: 0.125,
            height: 0.0625,
        }
    }

    #[test]
    fn lines_form_text_and_words_form_detections() {
        let blocks = vec![
            block(BlockKind::Line, "Aorta: 32 mm", 99.0, 0.1, 0.1),
            block(BlockKind::Word, "Aorta:", 99.1, 0.1, 0.1),
            block(BlockKind::Word, "32", 87.0, 0.3, 0.1),
            block(BlockKind::Line, "VE Diastólico: 48 mm", 98.0, 0.1, 0.2),
        ];
        let rec = blocks_to_recognition(&blocks, 1000, 600);
        assert_eq!(rec.full_text.as_deref(), Some("Aorta: 32 mm\nVE Diastólico: 48 mm"));
        assert_eq!(rec.detections.len(), 2);
        assert_eq!(rec.scale_factor, 1.0);
        assert!(rec.enhanced.is_none());
    }

    #[test]
    fn fractional_geometry_becomes_truncated_pixels() {
        let rec = blocks_to_recognition(&[block(BlockKind::Word, "32", 87.0, 0.3337, 0.1)], 1000, 600);
        let b = rec.detections[0].bbox;
        assert_eq!(b.x, 333.0);
        assert_eq!(b.y, 60.0);
        assert_eq!(b.width, 125.0);
        assert_eq!(b.height, 37.0);
    }

    #[test]
    fn missing_credentials_fail_fast() {
        let aws = AwsSettings {
            access_key: Some("AKIA".into()),
            secret_key: Some("   ".into()),
            ..AwsSettings::default()
        };
        let err = TextractBackend::new(&aws, &RetrySettings::default()).err().unwrap();
        match err {
            ExtractionError::BackendConfig(msg) => assert!(msg.contains("secret")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn configured_credentials_build_a_client() {
        let aws = AwsSettings {
            access_key: Some("AKIA".into()),
            secret_key: Some("secret".into()),
            ..AwsSettings::default()
        };
        let backend = TextractBackend::new(&aws, &RetrySettings::default()).unwrap();
        assert_eq!(backend.kind(), OcrBackendKind::Textract);
    }

    #[test]
    fn call_errors_classify() {
        assert!(CallError::Transient("x".into()).is_transient());
        assert!(!CallError::Permanent("x".into()).is_transient());
    }

    #[test]
    fn sdk_timeouts_are_retried_and_bad_requests_are_not() {
        let timeout: SdkError<DetectDocumentTextError, ()> = SdkError::timeout_error("slow");
        assert!(classify(timeout).is_transient());

        let construction: SdkError<DetectDocumentTextError, ()> =
            SdkError::construction_failure("bad input");
        assert!(!classify(construction).is_transient());
    }

    fn unreachable_endpoint() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    #[test]
    fn unreachable_service_leaves_the_page_empty_with_a_warning() {
        let aws = AwsSettings {
            access_key: Some("AKIA".into()),
            secret_key: Some("secret".into()),
            endpoint_url: Some(unreachable_endpoint()),
            timeout_secs: 5,
            ..AwsSettings::default()
        };
        let retry = RetrySettings {
            max_attempts: 1,
            ..RetrySettings::default()
        };
        let backend = TextractBackend::new(&aws, &retry).unwrap();

        let rec = backend
            .recognize(&RgbImage::from_pixel(20, 10, image::Rgb([255, 255, 255])))
            .unwrap();
        assert_eq!(rec.full_text.as_deref(), Some(""));
        assert!(rec.detections.is_empty());
        assert_eq!(rec.warnings.len(), 1);
        assert!(rec.warnings[0].starts_with("textract call failed"));
    }
}
