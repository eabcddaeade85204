//! Batch structuring of every human-confirmed OCR document.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use super::orchestrator::{extraction_timestamp, ExtractionService};
use super::types::{BatchDocument, BatchResult};
use super::StructuringError;
use crate::pipeline::workflow::WorkflowStage;

/// The parts of a confirmed OCR document the batch needs.
#[derive(Deserialize)]
struct ConfirmedDocument {
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default)]
    word_objects: Vec<ConfirmedWord>,
}

#[derive(Deserialize)]
struct ConfirmedWord {
    text: String,
}

fn first_page() -> u32 {
    1
}

/// Output of a successful batch run.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub result: BatchResult,
    /// Where `structured_data_{timestamp}.json` was written.
    pub output_path: PathBuf,
}

pub struct BatchAggregator<'a> {
    service: &'a ExtractionService,
}

impl<'a> BatchAggregator<'a> {
    pub fn new(service: &'a ExtractionService) -> Self {
        Self { service }
    }

    /// Structure every `*.json` in the ocr-confirmed stage, in name order.
    ///
    /// A document that cannot be read, has no words, or whose extraction
    /// failed outright is left out. Errors when the stage directory is
    /// missing, holds no documents, or nothing could be structured.
    pub fn run(&self) -> Result<BatchRun, StructuringError> {
        let layout = self.service.layout();
        let confirmed_dir = layout.dir(WorkflowStage::OcrConfirmed);
        let files = confirmed_documents(confirmed_dir)?;

        let mut result = BatchResult::default();
        for path in &files {
            if let Some(document) = self.structure_document(path) {
                result.documents.push(document);
            }
        }

        if result.documents.is_empty() {
            return Err(StructuringError::NothingStructured);
        }

        let structured_dir = layout.dir(WorkflowStage::Structured);
        std::fs::create_dir_all(structured_dir)?;
        let output_path =
            structured_dir.join(format!("structured_data_{}.json", extraction_timestamp()));
        std::fs::write(&output_path, serde_json::to_string_pretty(&result)?)?;

        info!(
            documents = result.documents.len(),
            candidates = files.len(),
            path = %output_path.display(),
            "Batch extraction saved"
        );

        Ok(BatchRun {
            result,
            output_path,
        })
    }

    fn structure_document(&self, path: &Path) -> Option<BatchDocument> {
        let filename = path.file_name()?.to_string_lossy().into_owned();

        let document: ConfirmedDocument = match std::fs::read_to_string(path)
            .map_err(StructuringError::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(StructuringError::from))
        {
            Ok(doc) => doc,
            Err(e) => {
                warn!(filename = %filename, error = %e, "Skipping unreadable confirmed document");
                return None;
            }
        };

        let text = document
            .word_objects
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if text.trim().is_empty() {
            info!(filename = %filename, "Skipping confirmed document without text");
            return None;
        }

        let outcome = self.service.structure(&text);
        if outcome.is_failure() {
            warn!(filename = %filename, "Skipping document whose extraction failed");
            return None;
        }

        let fields = outcome
            .into_fields()
            .into_iter()
            .map(|mut field| {
                field.source = Some(filename.clone());
                field
            })
            .collect();

        Some(BatchDocument {
            filename,
            page: document.page,
            fields,
        })
    }
}

/// `*.json` files directly inside `dir`, sorted by name.
fn confirmed_documents(dir: &Path) -> Result<Vec<PathBuf>, StructuringError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StructuringError::ConfirmedDirMissing(dir.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(StructuringError::NoConfirmedDocuments(dir.to_path_buf()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::MockLlmClient;
    use crate::pipeline::workflow::StageLayout;

    const AORTA: &str = r#"{"fields":[{"name":"Aorta","value":"32 mm"}]}"#;

    fn service(root: &Path, llm: MockLlmClient) -> ExtractionService {
        let layout = StageLayout::new(root);
        layout.ensure().unwrap();
        ExtractionService::new(Box::new(llm), vec!["Aorta".into()], layout)
    }

    fn confirm(svc: &ExtractionService, name: &str, body: &str) {
        let dir = svc.layout().dir(WorkflowStage::OcrConfirmed);
        std::fs::write(dir.join(name), body).unwrap();
    }

    const WORDS: &str = r#"{"text":"Aorta 32","word_objects":[{"text":"Aorta"},{"text":"32"}],"mean_confidence":91.0}"#;

    #[test]
    fn documents_are_structured_in_name_order_with_source() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path(), MockLlmClient::new(AORTA));
        confirm(&svc, "b_ocr_corrected.json", WORDS);
        confirm(
            &svc,
            "a_page_2_ocr_corrected.json",
            r#"{"page":2,"word_objects":[{"text":"Aorta"}]}"#,
        );

        let run = BatchAggregator::new(&svc).run().unwrap();
        let docs = &run.result.documents;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "a_page_2_ocr_corrected.json");
        assert_eq!(docs[0].page, 2);
        assert_eq!(docs[1].page, 1);
        assert_eq!(docs[1].fields[0].source.as_deref(), Some("b_ocr_corrected.json"));
        assert!(run.output_path.exists());

        let saved: BatchResult =
            serde_json::from_str(&std::fs::read_to_string(&run.output_path).unwrap()).unwrap();
        assert_eq!(&saved, &run.result);
    }

    #[test]
    fn word_texts_are_joined_with_spaces() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StageLayout::new(tmp.path());
        layout.ensure().unwrap();
        let mock = std::sync::Arc::new(MockLlmClient::new(AORTA));
        let svc = ExtractionService::new(
            Box::new(std::sync::Arc::clone(&mock)),
            vec!["Aorta".into()],
            layout,
        );
        confirm(&svc, "x.json", WORDS);
        BatchAggregator::new(&svc).run().unwrap();
        assert!(mock.prompts()[0].ends_with("Aorta 32\n"));
    }

    #[test]
    fn broken_and_empty_documents_are_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path(), MockLlmClient::new(AORTA));
        confirm(&svc, "good.json", WORDS);
        confirm(&svc, "broken.json", "{not json");
        confirm(&svc, "empty.json", r#"{"word_objects":[]}"#);
        confirm(&svc, "notes.txt", "ignored");

        let run = BatchAggregator::new(&svc).run().unwrap();
        let names: Vec<&str> = run.result.documents.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["good.json"]);
    }

    #[test]
    fn failed_extractions_are_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path(), MockLlmClient::failing(500));
        confirm(&svc, "good.json", WORDS);
        assert!(matches!(
            BatchAggregator::new(&svc).run().unwrap_err(),
            StructuringError::NothingStructured
        ));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = ExtractionService::new(
            Box::new(MockLlmClient::new(AORTA)),
            vec![],
            StageLayout::new(tmp.path().join("absent")),
        );
        assert!(matches!(
            BatchAggregator::new(&svc).run().unwrap_err(),
            StructuringError::ConfirmedDirMissing(_)
        ));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path(), MockLlmClient::new(AORTA));
        assert!(matches!(
            BatchAggregator::new(&svc).run().unwrap_err(),
            StructuringError::NoConfirmedDocuments(_)
        ));
    }
}
