//! PDF rasterization via Google PDFium.
//!
//! Scanned reports embed each page as an image, so pages are rendered at
//! native resolution (one pixel per PDF point) and OCR'd like any photo.
//!
//! `Pdfium` is `!Send`, so every call binds the library afresh and the
//! document handle never outlives the call.

use std::path::PathBuf;

use image::RgbImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::ExtractionError;

/// Longest side, in pixels, a rendered page may have.
const MAX_DIMENSION_PX: u32 = 4096;

/// Native resolution: one output pixel per PDF point.
pub const NATIVE_RENDER_DPI: u32 = 72;

const POINTS_PER_INCH: f32 = 72.0;

const LIBRARY_PATH_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Rasterizes PDF pages. Page indices are 0-based.
pub trait PdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    fn render_page(&self, pdf_bytes: &[u8], page_index: usize) -> Result<RgbImage, ExtractionError>;
}

pub struct PdfiumRenderer {
    dpi: u32,
}

impl PdfiumRenderer {
    /// Renderer whose library lookup is deferred to the first PDF.
    pub fn deferred() -> Self {
        Self {
            dpi: NATIVE_RENDER_DPI,
        }
    }

    fn with_document<T>(
        &self,
        pdf_bytes: &[u8],
        f: impl FnOnce(&PdfDocument<'_>) -> Result<T, ExtractionError>,
    ) -> Result<T, ExtractionError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(load_error)?;
        f(&document)
    }
}

/// Directories searched for a bundled PDFium after `PDFIUM_DYNAMIC_LIB_PATH`:
/// next to the executable, then `<exe_dir>/lib`.
fn bundled_library_dirs() -> Vec<PathBuf> {
    match std::env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| vec![dir.to_path_buf(), dir.join("lib")])
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    let unavailable = |reason: String| ExtractionError::PdfRendering { page: 0, reason };

    if let Ok(path) = std::env::var(LIBRARY_PATH_ENV) {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| unavailable(format!("cannot load PDFium from {path}: {e}")))?;
        debug!(path = %path, "PDFium bound from {LIBRARY_PATH_ENV}");
        return Ok(Pdfium::new(bindings));
    }

    for dir in bundled_library_dirs() {
        let library = Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&library) {
            debug!(dir = %dir.display(), "PDFium bound from bundled library");
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            unavailable(format!(
                "PDFium library not found (set {LIBRARY_PATH_ENV} or install it system-wide): {e}"
            ))
        })
}

fn load_error(e: PdfiumError) -> ExtractionError {
    let message = e.to_string().to_lowercase();
    if message.contains("password") || message.contains("encrypt") {
        return ExtractionError::PdfEncrypted;
    }
    ExtractionError::PdfRendering {
        page: 0,
        reason: format!("cannot open PDF: {e}"),
    }
}

/// Output raster size for a page, with the longest side held to the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderSize {
    width: u32,
    height: u32,
    capped: bool,
}

impl RenderSize {
    fn for_page(width_points: f32, height_points: f32, dpi: u32) -> Self {
        let mut scale = dpi as f32 / POINTS_PER_INCH;
        let longest = width_points.max(height_points) * scale;
        let capped = longest > MAX_DIMENSION_PX as f32;
        if capped {
            scale *= MAX_DIMENSION_PX as f32 / longest;
        }
        let px = |points: f32| ((points * scale) as u32).clamp(1, MAX_DIMENSION_PX);
        Self {
            width: px(width_points),
            height: px(height_points),
            capped,
        }
    }
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        self.with_document(pdf_bytes, |document| Ok(document.pages().len() as usize))
    }

    fn render_page(&self, pdf_bytes: &[u8], page_index: usize) -> Result<RgbImage, ExtractionError> {
        let page_number = page_index + 1;
        let render_error = |reason: String| ExtractionError::PdfRendering {
            page: page_number,
            reason,
        };

        self.with_document(pdf_bytes, |document| {
            let pages = document.pages();
            let page = u16::try_from(page_index)
                .ok()
                .and_then(|index| pages.get(index).ok())
                .ok_or_else(|| {
                    render_error(format!("document has only {} pages", pages.len()))
                })?;

            let size = RenderSize::for_page(page.width().value, page.height().value, self.dpi);
            if size.capped {
                warn!(
                    page = page_number,
                    width = size.width,
                    height = size.height,
                    "Oversized PDF page scaled down to {MAX_DIMENSION_PX}px"
                );
            }

            let config = PdfRenderConfig::new()
                .set_target_width(size.width as i32)
                .set_maximum_height(size.height as i32);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| render_error(format!("rendering failed: {e}")))?;
            let rgb = bitmap.as_image().to_rgb8();

            debug!(
                page = page_number,
                width = rgb.width(),
                height = rgb.height(),
                "Rendered PDF page"
            );
            Ok(rgb)
        })
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock renderer producing blank 40×30 pages.
pub struct MockPdfPageRenderer {
    pages: usize,
    /// 0-based page index that fails to render, if any.
    broken_page: Option<usize>,
}

impl MockPdfPageRenderer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            broken_page: None,
        }
    }

    pub fn failing_on(mut self, page_index: usize) -> Self {
        self.broken_page = Some(page_index);
        self
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.pages)
    }

    fn render_page(&self, _pdf_bytes: &[u8], page_index: usize) -> Result<RgbImage, ExtractionError> {
        if page_index >= self.pages || self.broken_page == Some(page_index) {
            return Err(ExtractionError::PdfRendering {
                page: page_index + 1,
                reason: "mock page unavailable".into(),
            });
        }
        Ok(RgbImage::from_pixel(40, 30, image::Rgb([255, 255, 255])))
    }
}
