//! Question-answering entry points.
//!
//! [`DocumentQa`] owns the injected capabilities, the configuration and the
//! document backend. It is built once and then serves any number of
//! requests; each request owns its own [`Document`], images and candidates.
//!
//! ## Which entry point?
//!
//! | Method | Errors | Returns |
//! |--------|--------|---------|
//! | [`DocumentQa::extract_best_span`] | `Err(DocQaError)` | raw span + location |
//! | [`DocumentQa::answer`] | `Err(DocQaError)` | `None` when nothing was found |
//! | [`DocumentQa::answer_with_highlight`] | never | `("Error: …", [])` on failure |
//! | [`DocumentQa::answer_to_dir`] | `Err(DocQaError)` | also writes `page-NNN.png` files |

use crate::capability::QaServices;
use crate::config::QaConfig;
use crate::document::{Candidate, Document};
use crate::error::DocQaError;
use crate::output::{AnswerResult, ExtractionStats, SpanResult, ERROR_PREFIX, NO_ANSWER};
use crate::pipeline::budget::{Budget, CancelHandle};
use crate::pipeline::render::{DocumentBackend, PdfiumBackend};
use crate::pipeline::select::SpanSelector;
use crate::pipeline::{encode, highlight, input, llm, refine, standardize};
use image::DynamicImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Per-request switches.
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    /// Always summarize the span as code, whatever it looks like.
    pub force_code: bool,
    /// Rewrite a non-code span in plain language.
    pub simplify_layman: bool,
    /// Stop early and keep the best candidate found so far.
    pub cancel: Option<CancelHandle>,
}

impl AnswerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_code(mut self, yes: bool) -> Self {
        self.force_code = yes;
        self
    }

    pub fn simplify_layman(mut self, yes: bool) -> Self {
        self.simplify_layman = yes;
        self
    }

    pub fn cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }
}

/// What locating a span produced, before refinement.
struct Located {
    document: Document,
    path: PathBuf,
    best: Option<Candidate>,
    stats: ExtractionStats,
}

/// Answers questions about PDF documents.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docqa::{AnswerOptions, DocumentQa, QaConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let qa = DocumentQa::from_config(QaConfig::default())?;
/// match qa.answer("report.pdf", "What is the title?", AnswerOptions::new()).await? {
///     Some(result) => println!("{} (page {})", result.answer, result.page_index + 1),
///     None => println!("No answer found."),
/// }
/// # Ok(())
/// # }
/// ```
pub struct DocumentQa {
    services: QaServices,
    config: QaConfig,
    backend: Arc<dyn DocumentBackend>,
}

impl fmt::Debug for DocumentQa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentQa")
            .field("services", &self.services)
            .field("config", &self.config)
            .field("backend", &"<dyn DocumentBackend>")
            .finish()
    }
}

impl DocumentQa {
    /// Use `services` with the pdfium backend.
    pub fn new(services: QaServices, config: QaConfig) -> Self {
        Self::with_backend(services, config, Arc::new(PdfiumBackend))
    }

    pub fn with_backend(
        services: QaServices,
        config: QaConfig,
        backend: Arc<dyn DocumentBackend>,
    ) -> Self {
        Self {
            services,
            config,
            backend,
        }
    }

    /// Bundled VLM capabilities on the provider resolved from `config`.
    pub fn from_config(config: QaConfig) -> Result<Self, DocQaError> {
        let services = llm::default_services(&config)?;
        Ok(Self::new(services, config))
    }

    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    /// Find the best locatable span for `question` without refining it.
    ///
    /// Returns [`SpanResult::empty`] when no strategy located anything.
    pub async fn extract_best_span(
        &self,
        path: impl AsRef<Path>,
        question: &str,
    ) -> Result<SpanResult, DocQaError> {
        let budget = self.budget(None);
        let located = self.locate(path.as_ref(), question, &budget).await?;

        Ok(match located.best {
            Some(best) => {
                let dims = located
                    .document
                    .page(best.page_index)
                    .map(|p| p.size.as_tuple())
                    .unwrap_or_default();
                SpanResult {
                    span: best.text,
                    bbox: best.bbox,
                    page_index: best.page_index,
                    page_dims: dims,
                }
            }
            None => SpanResult::empty(),
        })
    }

    /// Answer `question` and highlight the answer on its page.
    ///
    /// `Ok(None)` means neither strategy located a span.
    pub async fn answer(
        &self,
        path: impl AsRef<Path>,
        question: &str,
        options: AnswerOptions,
    ) -> Result<Option<AnswerResult>, DocQaError> {
        let start = Instant::now();
        let budget = self.budget(options.cancel.clone());
        let located = self.locate(path.as_ref(), question, &budget).await?;

        let Some((best, bbox)) = located
            .best
            .and_then(|c| c.bbox.map(|bbox| (c, bbox)))
        else {
            info!("No answer found for '{}'", question);
            return Ok(None);
        };

        // A partial result is refined like any other: only the call timeout
        // bounds refinement, not the request deadline or cancellation.
        let refine_budget = Budget::new(self.config.call_timeout(), None);
        let answer = refine::AnswerRefiner::new(&self.services, &self.config, &refine_budget)
            .refine(&best.text, options.force_code, options.simplify_layman)
            .await?;

        let display = self
            .backend
            .render_pages(&located.path, self.config.display_dpi, self.config.password.as_deref())
            .await?;
        if display.len() != located.document.page_count() {
            return Err(DocQaError::PageCountMismatch {
                rendered: display.len(),
                expected: located.document.page_count(),
            });
        }
        let pages = highlight::highlight_pages(&display, best.page_index, &bbox, self.config.display_dpi)?;

        let mut stats = located.stats;
        stats.strategy = Some(best.strategy);
        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Answered from page {} via {} in {}ms",
            best.page_index + 1,
            best.strategy,
            stats.duration_ms
        );

        Ok(Some(AnswerResult {
            answer,
            span: best.text,
            page_index: best.page_index,
            bbox,
            pages,
            stats,
        }))
    }

    /// Infallible form of [`DocumentQa::answer`].
    ///
    /// * found: `(answer, pages)` with exactly one highlighted page
    /// * nothing found: `("No answer found.", [])`
    /// * any failure: `("Error: <message>", [])`
    pub async fn answer_with_highlight(
        &self,
        path: impl AsRef<Path>,
        question: &str,
        force_code: bool,
        simplify_layman: bool,
    ) -> (String, Vec<DynamicImage>) {
        let options = AnswerOptions::new()
            .force_code(force_code)
            .simplify_layman(simplify_layman);
        match self.answer(path, question, options).await {
            Ok(Some(result)) => (result.answer, result.pages),
            Ok(None) => (NO_ANSWER.to_string(), Vec::new()),
            Err(e) => {
                error!("Question failed: {}", e);
                (format!("{}{}", ERROR_PREFIX, e), Vec::new())
            }
        }
    }

    /// Answer and write every output page to `out_dir` as `page-NNN.png`.
    ///
    /// Each file is written to a temporary name and renamed into place, so a
    /// reader never sees a partial image. Nothing is written when no answer
    /// was found.
    pub async fn answer_to_dir(
        &self,
        path: impl AsRef<Path>,
        question: &str,
        options: AnswerOptions,
        out_dir: impl AsRef<Path>,
    ) -> Result<Option<AnswerResult>, DocQaError> {
        let result = self.answer(path, question, options).await?;
        let Some(result) = result else {
            return Ok(None);
        };

        let out_dir = out_dir.as_ref();
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| DocQaError::OutputWriteFailed {
                path: out_dir.to_path_buf(),
                source: e,
            })?;

        for (idx, page) in result.pages.iter().enumerate() {
            let target = out_dir.join(page_file_name(idx));
            write_png_atomic(page, &target).await?;
        }
        info!("Wrote {} pages to {}", result.pages.len(), out_dir.display());

        Ok(Some(result))
    }

    /// Synchronous wrapper around [`DocumentQa::answer`].
    ///
    /// Creates a temporary tokio runtime internally; do not call it from
    /// inside an async context.
    pub fn answer_sync(
        &self,
        path: impl AsRef<Path>,
        question: &str,
        options: AnswerOptions,
    ) -> Result<Option<AnswerResult>, DocQaError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| DocQaError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.answer(path, question, options))
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn budget(&self, cancel: Option<CancelHandle>) -> Budget {
        Budget::new(self.config.call_timeout(), self.config.request_timeout()).with_cancel(cancel)
    }

    /// Resolve, load, render at QA resolution, standardize and select.
    async fn locate(&self, path: &Path, question: &str, budget: &Budget) -> Result<Located, DocQaError> {
        if question.trim().is_empty() {
            return Err(DocQaError::InvalidConfig("Question must not be empty".into()));
        }

        // ── Step 1: Resolve input ────────────────────────────────────────
        let path = input::resolve_document(path)?;
        let password = self.config.password.as_deref();

        // ── Step 2: Text layer ───────────────────────────────────────────
        let document = self.backend.load_document(&path, password).await?;
        info!("Document has {} pages", document.page_count());
        if let Some(cb) = &self.config.progress_callback {
            cb.on_extraction_start(document.page_count());
        }

        // ── Step 3: Render + standardize for image QA ────────────────────
        let rendered = self
            .backend
            .render_pages(&path, self.config.qa_dpi, password)
            .await?;
        let standardized = standardize::standardize_all(
            &rendered,
            self.config.canvas_width,
            self.config.canvas_height,
        );
        drop(rendered);
        debug!(
            "Standardized {} pages to {}x{}",
            standardized.len(),
            self.config.canvas_width,
            self.config.canvas_height
        );

        // ── Step 4: Select ───────────────────────────────────────────────
        let selection = SpanSelector::new(&self.services, &self.config, budget)
            .select(&document, &standardized, question)
            .await?;

        if let Some(cb) = &self.config.progress_callback {
            cb.on_extraction_complete(selection.best.is_some());
        }

        let mut stats = selection.stats;
        stats.page_count = document.page_count();
        stats.strategy = selection.best.as_ref().map(|c| c.strategy);

        Ok(Located {
            document,
            path,
            best: selection.best,
            stats,
        })
    }
}

fn page_file_name(idx: usize) -> String {
    format!("page-{:03}.png", idx + 1)
}

async fn write_png_atomic(page: &DynamicImage, target: &Path) -> Result<(), DocQaError> {
    let bytes = encode::png_bytes(page)
        .map_err(|e| DocQaError::Internal(format!("PNG encoding failed: {}", e)))?;

    let tmp_path = target.with_extension("png.tmp");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| DocQaError::OutputWriteFailed {
            path: target.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, target)
        .await
        .map_err(|e| DocQaError::OutputWriteFailed {
            path: target.to_path_buf(),
            source: e,
        })
}
