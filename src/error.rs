//! Error types for the edgequake-docqa library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocQaError`] is **fatal**: the request cannot produce an answer at all
//!   (missing document, wrong password, a model capability that keeps
//!   failing). Returned as `Err(DocQaError)` from the fallible entry points
//!   in [`crate::qa`], and flattened to an `"Error: …"` string by
//!   [`crate::qa::DocumentQa::answer_with_highlight`].
//!
//! * [`CapabilityError`] is raised by a single model call. The pipeline
//!   decides what to do with it: the recoverable class is retried once with
//!   a safe windowing parameter, everything else becomes
//!   [`DocQaError::ModelInvocation`].
//!
//! A candidate whose text cannot be found on its page is *not* an error; it
//! is disqualified and scanning continues (see [`crate::pipeline::select`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docqa library.
#[derive(Debug, Error)]
pub enum DocQaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Document was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    DocumentNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// pdfium-render could not read the text layer of a page.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// The two renders of one document disagree on the page count.
    #[error("Rendered {rendered} page images but the document has {expected} pages")]
    PageCountMismatch { rendered: usize, expected: usize },

    // ── Model errors ──────────────────────────────────────────────────────
    /// A QA, summarization or simplification capability failed.
    #[error("{capability} failed: {detail}")]
    ModelInvocation {
        capability: &'static str,
        detail: String,
    },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a highlighted page image.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or place the library next to the\n\
executable or in the current directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocQaError {
    /// Wrap a capability failure that exhausted its retry policy.
    pub fn model(capability: &'static str, err: CapabilityError) -> Self {
        DocQaError::ModelInvocation {
            capability,
            detail: err.to_string(),
        }
    }
}

/// A failure reported by one invocation of a model capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// The capability rejected its windowing parameter (token windows of
    /// unequal length). Retrying with the fallback stride usually succeeds.
    #[error("ragged window: {0}")]
    RaggedWindow(String),

    /// The provider answered but the payload could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl CapabilityError {
    /// Only ragged-window faults qualify for the parameter-adjusted retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CapabilityError::RaggedWindow(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_not_found_display() {
        let e = DocQaError::DocumentNotFound {
            path: PathBuf::from("/nope/report.pdf"),
        };
        let msg = e.to_string();
        assert!(msg.contains("not found"), "got: {msg}");
        assert!(msg.contains("/nope/report.pdf"));
    }

    #[test]
    fn model_invocation_names_capability() {
        let e = DocQaError::model("image QA", CapabilityError::Failed("boom".into()));
        let msg = e.to_string();
        assert!(msg.starts_with("image QA failed"), "got: {msg}");
        assert!(msg.contains("boom"));
    }

    #[test]
    fn only_ragged_window_is_recoverable() {
        assert!(CapabilityError::RaggedWindow("mask".into()).is_recoverable());
        assert!(!CapabilityError::Failed("x".into()).is_recoverable());
        assert!(!CapabilityError::MalformedResponse("x".into()).is_recoverable());
    }

    #[test]
    fn page_count_mismatch_display() {
        let e = DocQaError::PageCountMismatch {
            rendered: 2,
            expected: 3,
        };
        assert!(e.to_string().contains("2 page images"));
    }
}
