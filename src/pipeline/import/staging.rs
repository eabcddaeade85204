use std::path::{Path, PathBuf};

use super::ImportError;

/// Copy a source file into `target_dir` under its own filename.
/// Returns the staged path. An existing file of the same name is replaced.
pub fn stage_file(source_path: &Path, target_dir: &Path) -> Result<PathBuf, ImportError> {
    let filename = source_path
        .file_name()
        .ok_or_else(|| ImportError::UnsupportedFile(source_path.display().to_string()))?;

    std::fs::create_dir_all(target_dir)?;
    let target_path = target_dir.join(filename);

    if same_file(source_path, &target_path) {
        return Ok(target_path);
    }

    let size = std::fs::copy(source_path, &target_path)?;

    tracing::debug!(
        source = %source_path.display(),
        target = %target_path.display(),
        size,
        "File staged"
    );

    Ok(target_path)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_under_same_name() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("eco.png");
        std::fs::write(&source, b"img").unwrap();

        let staged = stage_file(&source, &dst_dir.path().join("uploaded")).unwrap();
        assert_eq!(staged.file_name().unwrap(), "eco.png");
        assert_eq!(std::fs::read(&staged).unwrap(), b"img");
        assert!(source.exists());
    }

    #[test]
    fn staging_in_place_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("eco.png");
        std::fs::write(&source, b"img").unwrap();
        let staged = stage_file(&source, dir.path()).unwrap();
        assert_eq!(std::fs::read(staged).unwrap(), b"img");
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = stage_file(&dir.path().join("gone.png"), dir.path()).unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }
}
