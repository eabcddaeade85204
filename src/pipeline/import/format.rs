use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ImportError;
use crate::config::FileSettings;

/// Broad file categories we handle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Pdf,
    Unknown,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A file presented for processing, before any decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub filename: String,
    pub size_bytes: u64,
    pub kind: FileKind,
}

impl UploadedDocument {
    /// Classify and size-check a file on disk.
    pub fn inspect(path: &Path, settings: &FileSettings) -> Result<Self, ImportError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ImportError::UnsupportedFile(path.display().to_string()))?;

        let kind = classify_file(&filename, settings);
        if !kind.is_supported() {
            return Err(ImportError::UnsupportedFile(filename));
        }

        let size_bytes = std::fs::metadata(path)?.len();
        check_file_size(&filename, size_bytes, settings.max_file_size)?;

        Ok(Self {
            filename,
            size_bytes,
            kind,
        })
    }
}

/// Case-insensitive suffix match against the configured allow-lists.
/// Content is not inspected.
pub fn classify_file(filename: &str, settings: &FileSettings) -> FileKind {
    let lower = filename.to_lowercase();
    let matches = |exts: &[String]| exts.iter().any(|e| lower.ends_with(&e.to_lowercase()));

    if matches(&settings.allowed_image_extensions) {
        FileKind::Image
    } else if matches(&settings.allowed_document_extensions) {
        FileKind::Pdf
    } else {
        FileKind::Unknown
    }
}

/// Reject files above `max_bytes`. A file exactly at the limit passes.
pub fn check_file_size(filename: &str, size_bytes: u64, max_bytes: u64) -> Result<(), ImportError> {
    if size_bytes > max_bytes {
        return Err(ImportError::FileTooLarge {
            filename: filename.to_string(),
            limit_mb: max_bytes as f64 / (1024.0 * 1024.0),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_suffix_case_insensitively() {
        let settings = FileSettings::default();
        assert_eq!(classify_file("eco.PNG", &settings), FileKind::Image);
        assert_eq!(classify_file("eco.Jpeg", &settings), FileKind::Image);
        assert_eq!(classify_file("laudo.pdf", &settings), FileKind::Pdf);
        assert_eq!(classify_file("laudo.PDF", &settings), FileKind::Pdf);
        assert_eq!(classify_file("notes.txt", &settings), FileKind::Unknown);
        assert_eq!(classify_file("pdf", &settings), FileKind::Unknown);
    }

    #[test]
    fn content_is_not_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("really_a_pdf.png");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let doc = UploadedDocument::inspect(&path, &FileSettings::default()).unwrap();
        assert_eq!(doc.kind, FileKind::Image);
        assert_eq!(doc.size_bytes, 8);
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(check_file_size("a.png", 1024, 1024).is_ok());
        let err = check_file_size("a.png", 1025, 1024).unwrap_err();
        assert!(matches!(err, ImportError::FileTooLarge { .. }));
    }

    #[test]
    fn oversize_message_names_file_and_limit() {
        let err = check_file_size("scan.jpg", 11 * 1024 * 1024, 10 * 1024 * 1024).unwrap_err();
        assert_eq!(
            err.to_string(),
            "File scan.jpg exceeds maximum size limit of 10.0MB"
        );
    }

    #[test]
    fn inspect_rejects_unknown_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        std::fs::write(&path, b"x").unwrap();
        let err = UploadedDocument::inspect(&path, &FileSettings::default()).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFile(ref f) if f == "notes.docx"));
    }

    #[test]
    fn custom_allow_list() {
        let settings = FileSettings {
            allowed_image_extensions: vec![".tiff".into()],
            ..FileSettings::default()
        };
        assert_eq!(classify_file("s.tiff", &settings), FileKind::Image);
        assert_eq!(classify_file("s.png", &settings), FileKind::Unknown);
    }
}
