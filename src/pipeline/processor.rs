//! Document processing orchestrator.
//!
//! Drives one uploaded file through the stages:
//! classify → (PDF fan-out) → OCR backend → normalize → persist.
//!
//! The OCR backend and PDF renderer are injected so the orchestrator is
//! fully testable with mock implementations.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, FileSettings};
use crate::pipeline::extraction::annotate::save_annotated_image;
use crate::pipeline::extraction::image_io::{load_rgb, save_gray, save_rgb};
use crate::pipeline::extraction::{
    build_backend, file_stem, run_ocr, ExtractionError, OcrBackend, PageImage, PdfPageRenderer,
    PdfPages, PdfiumRenderer, WordObject,
};
use crate::pipeline::import::{classify_file, stage_file, FileKind, ImportError, UploadedDocument};
use crate::pipeline::workflow::{StageLayout, WorkflowStage};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("File {filename} exceeds maximum size limit of {limit_mb:.1}MB")]
    FileTooLarge { filename: String, limit_mb: f64 },

    #[error("Processing {filename} failed: {source}")]
    Failed {
        filename: String,
        #[source]
        source: ExtractionError,
    },

    #[error("OCR backend setup failed: {0}")]
    Backend(#[source] ExtractionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No file could be processed ({failures} failed, first: {first})")]
    NothingProcessed { failures: usize, first: String },
}

impl From<ImportError> for ProcessingError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::UnsupportedFile(name) => ProcessingError::UnsupportedFile(name),
            ImportError::FileTooLarge { filename, limit_mb } => {
                ProcessingError::FileTooLarge { filename, limit_mb }
            }
            ImportError::Io(e) => ProcessingError::Io(e),
        }
    }
}

impl ProcessingError {
    /// Attach `filename` to an import failure that does not already name it.
    fn for_file(filename: &str, e: ImportError) -> Self {
        match e {
            ImportError::Io(source) => ProcessingError::Failed {
                filename: filename.to_string(),
                source: ExtractionError::Io(source),
            },
            other => other.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Persisted outcome of one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub page: usize,
    pub text: String,
    pub word_objects: Vec<WordObject>,
    pub mean_confidence: f64,
    pub preprocessed_path: PathBuf,
    pub processed_path: PathBuf,
    pub json_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub filename: String,
    pub kind: FileKind,
    pub pages: Vec<PageResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of a multi-file upload. Partial success is still success.
#[derive(Debug, Clone, Serialize, Default)]
pub struct UploadReport {
    pub results: Vec<FileResult>,
    pub failures: Vec<FileFailure>,
    pub skipped: Vec<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct DocumentProcessor {
    layout: StageLayout,
    files: FileSettings,
    confidence_threshold: f64,
    backend: Box<dyn OcrBackend>,
    renderer: Box<dyn PdfPageRenderer>,
}

impl DocumentProcessor {
    pub fn new(
        layout: StageLayout,
        files: FileSettings,
        confidence_threshold: f64,
        backend: Box<dyn OcrBackend>,
        renderer: Box<dyn PdfPageRenderer>,
    ) -> Self {
        Self {
            layout,
            files,
            confidence_threshold,
            backend,
            renderer,
        }
    }

    /// Production wiring: configured backend, PDFium renderer.
    pub fn from_config(config: &AppConfig, layout: StageLayout) -> Result<Self, ProcessingError> {
        let backend = build_backend(config).map_err(ProcessingError::Backend)?;
        Ok(Self::new(
            layout,
            config.files.clone(),
            config.ocr.confidence_threshold,
            backend,
            Box::new(PdfiumRenderer::deferred()),
        ))
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    /// Copy `source` into the uploaded stage, then process the copy.
    pub fn ingest(&self, source: &Path) -> Result<FileResult, ProcessingError> {
        let name = display_name(source);
        let doc = UploadedDocument::inspect(source, &self.files)
            .map_err(|e| ProcessingError::for_file(&name, e))?;
        self.layout
            .ensure()
            .map_err(|e| ProcessingError::for_file(&doc.filename, e.into()))?;
        let staged = stage_file(source, self.layout.dir(WorkflowStage::Uploaded))
            .map_err(|e| ProcessingError::for_file(&doc.filename, e))?;
        self.process_file(&staged)
    }

    /// Process every file of an upload batch against a freshly cleaned layout.
    ///
    /// Unknown file types are skipped without error; other per-file failures
    /// are recorded and the batch continues. Fails only when nothing
    /// succeeded and at least one file failed.
    pub fn process_batch(&self, paths: &[PathBuf]) -> Result<UploadReport, ProcessingError> {
        self.layout.cleanup();
        self.layout.ensure()?;

        let mut report = UploadReport::default();
        for path in paths {
            let name = display_name(path);
            if classify_file(&name, &self.files) == FileKind::Unknown {
                debug!(filename = %name, "Skipping unsupported file");
                report.skipped.push(name);
                continue;
            }

            match self.ingest(path) {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    warn!(filename = %name, error = %e, "File processing failed");
                    report.failures.push(FileFailure {
                        filename: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.results.is_empty() && !report.failures.is_empty() {
            return Err(ProcessingError::NothingProcessed {
                failures: report.failures.len(),
                first: report.failures[0].error.clone(),
            });
        }

        info!(
            processed = report.results.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "Upload batch finished"
        );
        Ok(report)
    }

    /// OCR a single file already on disk and persist every page.
    pub fn process_file(&self, path: &Path) -> Result<FileResult, ProcessingError> {
        let name = display_name(path);
        let doc = UploadedDocument::inspect(path, &self.files)
            .map_err(|e| ProcessingError::for_file(&name, e))?;

        let failed = |source: ExtractionError| ProcessingError::Failed {
            filename: doc.filename.clone(),
            source,
        };
        self.layout.ensure().map_err(|e| failed(e.into()))?;

        let mut pages = Vec::new();
        match doc.kind {
            FileKind::Image => {
                let image = load_rgb(path).map_err(failed)?;
                let page = PageImage {
                    page: 1,
                    filename: doc.filename.clone(),
                    image,
                };
                pages.push(self.process_page(&page, &doc.filename)?);
            }
            FileKind::Pdf => {
                let bytes = std::fs::read(path).map_err(|e| failed(e.into()))?;
                let document = PdfPages::open(self.renderer.as_ref(), &bytes, &doc.filename)
                    .map_err(failed)?;
                if document.is_empty() {
                    warn!(filename = %doc.filename, "PDF has no pages");
                }
                for n in 1..=document.len() {
                    let page = document.render(n).map_err(failed)?;
                    pages.push(self.process_page(&page, &doc.filename)?);
                }
            }
            FileKind::Unknown => return Err(ProcessingError::UnsupportedFile(doc.filename)),
        }

        info!(
            filename = %doc.filename,
            kind = doc.kind.as_str(),
            pages = pages.len(),
            "File processed"
        );

        Ok(FileResult {
            filename: doc.filename,
            kind: doc.kind,
            pages,
        })
    }

    fn process_page(&self, page: &PageImage, source: &str) -> Result<PageResult, ProcessingError> {
        let ocr = run_ocr(self.backend.as_ref(), &page.image, self.confidence_threshold).map_err(
            |e| ProcessingError::Failed {
                filename: source.to_string(),
                source: e,
            },
        )?;

        let persist_failed = |e: ExtractionError| ProcessingError::Failed {
            filename: source.to_string(),
            source: e,
        };

        let preprocessed_path = self
            .layout
            .dir(WorkflowStage::Preprocessed)
            .join(format!("preprocessed_{}", page.filename));
        let saved = match &ocr.enhanced {
            Some(enhanced) => save_gray(enhanced, &preprocessed_path),
            None => save_rgb(&page.image, &preprocessed_path),
        };
        saved.map_err(persist_failed)?;

        let base = file_stem(&page.filename);
        let processed_dir = self.layout.dir(WorkflowStage::OcrProcessed);
        let processed_path = processed_dir.join(format!("{base}_ocr.txt"));
        let json_path = processed_dir.join(format!("{base}_ocr.json"));
        std::fs::write(&processed_path, &ocr.result.text)
            .map_err(|e| persist_failed(e.into()))?;
        let json = serde_json::to_string_pretty(&ocr.result)
            .map_err(|e| persist_failed(std::io::Error::from(e).into()))?;
        std::fs::write(&json_path, json).map_err(|e| persist_failed(e.into()))?;

        let annotated_path = save_annotated_image(
            &page.image,
            &ocr.result.word_objects,
            self.layout.annotated_dir(),
            &page.filename,
        );

        debug!(
            filename = %source,
            page = page.page,
            words = ocr.result.word_objects.len(),
            mean_confidence = ocr.result.mean_confidence,
            "Page persisted"
        );

        Ok(PageResult {
            page: page.page,
            text: ocr.result.text,
            word_objects: ocr.result.word_objects,
            mean_confidence: ocr.result.mean_confidence,
            preprocessed_path,
            processed_path,
            json_path,
            annotated_path,
            warnings: ocr.result.warnings,
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
