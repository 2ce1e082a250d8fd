//! # edgequake-docqa
//!
//! Ask a question about a PDF and get back the answer together with the page
//! images, the answer's location outlined on the page it came from.
//!
//! ## Why this crate?
//!
//! Free-form chat over a PDF gives answers nobody can check. This crate is
//! **extractive**: an answer is only accepted if its exact text can be found
//! in the page's text layer, and that location is what gets highlighted. A
//! model that invents a plausible answer is simply outscored by one that
//! quotes the page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF + question
//!  │
//!  ├─ 1. Input        check the file exists and is a PDF
//!  ├─ 2. Load         per-page text layer with glyph bounds (pdfium)
//!  ├─ 3. Standardize  render, letterbox every page onto an 800×600 canvas
//!  ├─ 4. Image QA     bounded worker pool, best locatable answer wins
//!  ├─ 5. Text QA      450-token windows, only if image QA found nothing
//!  ├─ 6. Refine       code summary / plain-language rewrite / unchanged
//!  └─ 7. Highlight    2 px box on the winning page, others untouched
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docqa::{DocumentQa, QaConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let qa = DocumentQa::from_config(QaConfig::default())?;
//!     let (answer, pages) = qa
//!         .answer_with_highlight("report.pdf", "What is the title?", false, false)
//!         .await;
//!     println!("{answer} ({} pages)", pages.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Bring your own models
//!
//! The pipeline only sees the traits in [`capability`]. Implement
//! [`ImageQa`], [`TextQa`] and [`TextGenerator`] over any backend, bundle them
//! in [`QaServices`] and pass that to [`DocumentQa::new`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docqa` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docqa = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capability;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod qa;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capability::{ImageQa, QaAnswer, QaServices, TextGenerator, TextQa, WindowParams};
pub use config::{QaConfig, QaConfigBuilder};
pub use document::{BBox, Candidate, Document, Page, PageSize, PageText, Strategy, TextChar};
pub use error::{CapabilityError, DocQaError};
pub use output::{AnswerResult, ExtractionStats, SpanResult, ERROR_PREFIX, NO_ANSWER};
pub use pipeline::budget::CancelHandle;
pub use pipeline::render::{DocumentBackend, PdfiumBackend};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use qa::{AnswerOptions, DocumentQa};
