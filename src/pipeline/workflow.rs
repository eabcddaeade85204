//! On-disk workflow stages.
//!
//! Every document moves through a fixed sequence of directories under one
//! workflow root. Human review happens between `OcrProcessed` and
//! `OcrConfirmed`; the annotated overlays live beside the stages.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Uploaded,
    Preprocessed,
    OcrProcessed,
    OcrConfirmed,
    Structured,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 5] = [
        WorkflowStage::Uploaded,
        WorkflowStage::Preprocessed,
        WorkflowStage::OcrProcessed,
        WorkflowStage::OcrConfirmed,
        WorkflowStage::Structured,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Preprocessed => "preprocessed",
            Self::OcrProcessed => "ocr-processed",
            Self::OcrConfirmed => "ocr-confirmed",
            Self::Structured => "structured",
        }
    }
}

const ANNOTATED_DIR: &str = "annotated";
const REQUESTS_DIR: &str = "requests";

/// Resolved directory of every stage under one workflow root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLayout {
    root: PathBuf,
    uploaded: PathBuf,
    preprocessed: PathBuf,
    ocr_processed: PathBuf,
    ocr_confirmed: PathBuf,
    structured: PathBuf,
    annotated: PathBuf,
}

impl StageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            uploaded: root.join(WorkflowStage::Uploaded.dir_name()),
            preprocessed: root.join(WorkflowStage::Preprocessed.dir_name()),
            ocr_processed: root.join(WorkflowStage::OcrProcessed.dir_name()),
            ocr_confirmed: root.join(WorkflowStage::OcrConfirmed.dir_name()),
            structured: root.join(WorkflowStage::Structured.dir_name()),
            annotated: root.join(ANNOTATED_DIR),
            root,
        }
    }

    /// A layout private to one request, so concurrent requests never see
    /// each other's files (or each other's cleanup).
    pub fn for_request(base: &Path, request_id: &Uuid) -> Self {
        Self::new(base.join(REQUESTS_DIR).join(request_id.to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, stage: WorkflowStage) -> &Path {
        match stage {
            WorkflowStage::Uploaded => &self.uploaded,
            WorkflowStage::Preprocessed => &self.preprocessed,
            WorkflowStage::OcrProcessed => &self.ocr_processed,
            WorkflowStage::OcrConfirmed => &self.ocr_confirmed,
            WorkflowStage::Structured => &self.structured,
        }
    }

    pub fn annotated_dir(&self) -> &Path {
        &self.annotated
    }

    fn all_dirs(&self) -> impl Iterator<Item = &Path> {
        WorkflowStage::ALL
            .iter()
            .map(move |stage| self.dir(*stage))
            .chain(std::iter::once(self.annotated.as_path()))
    }

    /// Create every stage directory.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in self.all_dirs() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Delete the regular files directly inside each stage directory.
    ///
    /// Subdirectories are left alone, missing directories are skipped and a
    /// file that cannot be removed is logged without stopping the sweep.
    /// Returns the number of files removed.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        for dir in self.all_dirs() {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Cannot list stage directory");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                if !is_file {
                    continue;
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        removed += 1;
                        debug!(path = %path.display(), "Removed stage file");
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to remove stage file");
                    }
                }
            }
        }
        info!(root = %self.root.display(), removed, "Workflow stages cleaned");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_directories_have_fixed_names() {
        let layout = StageLayout::new("/wf");
        assert_eq!(layout.dir(WorkflowStage::Uploaded), Path::new("/wf/uploaded"));
        assert_eq!(layout.dir(WorkflowStage::OcrProcessed), Path::new("/wf/ocr-processed"));
        assert_eq!(layout.dir(WorkflowStage::OcrConfirmed), Path::new("/wf/ocr-confirmed"));
        assert_eq!(layout.annotated_dir(), Path::new("/wf/annotated"));
    }

    #[test]
    fn every_stage_maps_to_a_distinct_directory() {
        let layout = StageLayout::new("/wf");
        let mut dirs: Vec<&Path> = layout.all_dirs().collect();
        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), WorkflowStage::ALL.len() + 1);
    }

    #[test]
    fn request_layouts_are_isolated() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let la = StageLayout::for_request(Path::new("/wf"), &a);
        let lb = StageLayout::for_request(Path::new("/wf"), &b);
        assert_ne!(la.dir(WorkflowStage::Uploaded), lb.dir(WorkflowStage::Uploaded));
        assert!(la.root().starts_with("/wf/requests"));
    }

    #[test]
    fn ensure_creates_all_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StageLayout::new(tmp.path().join("wf"));
        layout.ensure().unwrap();
        for stage in WorkflowStage::ALL {
            assert!(layout.dir(stage).is_dir());
        }
        assert!(layout.annotated_dir().is_dir());
    }

    #[test]
    fn cleanup_removes_files_only_and_counts_them() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StageLayout::new(tmp.path());
        layout.ensure().unwrap();
        std::fs::write(layout.dir(WorkflowStage::Uploaded).join("a.png"), b"1").unwrap();
        std::fs::write(layout.dir(WorkflowStage::Structured).join("b.csv"), b"2").unwrap();
        std::fs::write(layout.annotated_dir().join("c.jpg"), b"3").unwrap();
        let nested = layout.dir(WorkflowStage::Preprocessed).join("keep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("inner.txt"), b"4").unwrap();

        assert_eq!(layout.cleanup(), 3);
        assert!(nested.join("inner.txt").exists());
        assert_eq!(layout.cleanup(), 0);
    }

    #[test]
    fn cleanup_tolerates_missing_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StageLayout::new(tmp.path().join("never-created"));
        assert_eq!(layout.cleanup(), 0);
    }
}
