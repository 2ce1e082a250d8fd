//! Input resolution: check a user-supplied path points at a readable PDF.
//!
//! Validation happens before pdfium sees the file so callers get
//! [`DocQaError::DocumentNotFound`] or [`DocQaError::NotAPdf`] rather than an
//! opaque pdfium load failure.

use crate::error::DocQaError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve `path` to an existing, readable PDF file.
pub fn resolve_document(path: impl AsRef<Path>) -> Result<PathBuf, DocQaError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(DocQaError::DocumentNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(DocQaError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocQaError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(DocQaError::DocumentNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_document_not_found() {
        let err = resolve_document("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, DocQaError::DocumentNotFound { .. }));
    }

    #[test]
    fn directory_is_document_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_document(dir.path()).unwrap_err();
        assert!(matches!(err, DocQaError::DocumentNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_not_a_pdf() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04 not a pdf").unwrap();
        let err = resolve_document(f.path()).unwrap_err();
        match err {
            DocQaError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn pdf_magic_resolves() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        let path = resolve_document(f.path()).expect("should resolve");
        assert_eq!(path, f.path());
    }
}
