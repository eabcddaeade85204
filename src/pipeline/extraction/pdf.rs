use std::path::Path;

use super::pdfium::PdfPageRenderer;
use super::types::PageImage;
use super::ExtractionError;

/// Name of the raster derived from page `page` (1-based) of a PDF.
pub fn page_filename(stem: &str, page: usize) -> String {
    format!("{stem}_page_{page}.jpg")
}

/// File stem used to name derived artifacts.
pub fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// Splits a PDF into page images, one at a time and in document order.
pub struct PdfPages<'a> {
    renderer: &'a dyn PdfPageRenderer,
    pdf_bytes: &'a [u8],
    stem: String,
    count: usize,
}

impl<'a> PdfPages<'a> {
    pub fn open(
        renderer: &'a dyn PdfPageRenderer,
        pdf_bytes: &'a [u8],
        filename: &str,
    ) -> Result<Self, ExtractionError> {
        let count = renderer.page_count(pdf_bytes)?;
        Ok(Self {
            renderer,
            pdf_bytes,
            stem: file_stem(filename),
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Render page `page` (1-based).
    pub fn render(&self, page: usize) -> Result<PageImage, ExtractionError> {
        if page == 0 || page > self.count {
            return Err(ExtractionError::PdfRendering {
                page,
                reason: format!("Page {page} out of range (document has {} pages)", self.count),
            });
        }
        let image = self.renderer.render_page(self.pdf_bytes, page - 1)?;
        Ok(PageImage {
            page,
            filename: page_filename(&self.stem, page),
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::pdfium::MockPdfPageRenderer;

    #[test]
    fn pages_are_named_after_stem() {
        assert_eq!(page_filename("laudo", 2), "laudo_page_2.jpg");
        assert_eq!(file_stem("eco.2024.pdf"), "eco.2024");
    }

    #[test]
    fn renders_pages_in_order_with_one_based_index() {
        let mock = MockPdfPageRenderer::new(3);
        let pages = PdfPages::open(&mock, b"%PDF", "exam.pdf").unwrap();
        assert_eq!(pages.len(), 3);

        let rendered: Vec<PageImage> = (1..=pages.len()).map(|n| pages.render(n).unwrap()).collect();
        let names: Vec<&str> = rendered.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["exam_page_1.jpg", "exam_page_2.jpg", "exam_page_3.jpg"]);
        assert_eq!(rendered[2].page, 3);
    }

    #[test]
    fn page_zero_is_out_of_range() {
        let mock = MockPdfPageRenderer::new(1);
        let pages = PdfPages::open(&mock, b"%PDF", "a.pdf").unwrap();
        assert!(matches!(
            pages.render(0),
            Err(ExtractionError::PdfRendering { page: 0, .. })
        ));
    }

    #[test]
    fn empty_document() {
        let mock = MockPdfPageRenderer::new(0);
        let pages = PdfPages::open(&mock, b"%PDF", "a.pdf").unwrap();
        assert!(pages.is_empty());
    }
}
