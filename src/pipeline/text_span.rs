//! Text-window span extraction, the fallback when image QA finds nothing.
//!
//! Each page's text layer is split on whitespace and cut into overlapping
//! windows of `window_tokens` tokens whose starts are `window_stride` tokens
//! apart (`0, s, 2s, …` while the start is still inside the page). Windows
//! near the end are shorter. Every window is asked the question once; the
//! answer must then be found on the page like any image-QA answer.

use crate::capability::TextQa;
use crate::config::QaConfig;
use crate::document::{Document, Page, Strategy};
use crate::error::DocQaError;
use crate::output::ExtractionStats;
use crate::pipeline::budget::{Budget, CallOutcome};
use crate::pipeline::select::{Acceptance, PageScan, RunningBest, Selection};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

const CAPABILITY: &str = "text QA";

/// Cut `text` into whitespace-token windows.
///
/// Returns no windows for blank text. `width` and `stride` must be ≥ 1
/// (enforced by [`crate::config::QaConfigBuilder::build`]).
pub fn token_windows(text: &str, width: usize, stride: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    (0..tokens.len())
        .step_by(stride.max(1))
        .map(|start| {
            let end = (start + width).min(tokens.len());
            tokens[start..end].join(" ")
        })
        .collect()
}

pub struct TextSpanExtractor<'a> {
    qa: &'a dyn TextQa,
    config: &'a QaConfig,
    budget: &'a Budget,
}

impl<'a> TextSpanExtractor<'a> {
    pub fn new(qa: &'a dyn TextQa, config: &'a QaConfig, budget: &'a Budget) -> Self {
        Self { qa, config, budget }
    }

    pub async fn extract(&self, document: &Document, question: &str) -> Result<Selection, DocQaError> {
        let total = document.page_count();
        if total == 0 {
            return Ok(Selection::default());
        }
        let workers = self.config.concurrency.min(total).max(1);

        let scans: Vec<Result<PageScan, DocQaError>> = stream::iter(
            document
                .pages
                .iter()
                .map(|page| self.scan_page(page, question, total)),
        )
        .buffer_unordered(workers)
        .collect()
        .await;

        let scans = scans.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(Selection::from_scans(scans))
    }

    async fn scan_page(&self, page: &Page, question: &str, total: usize) -> Result<PageScan, DocQaError> {
        let windows = token_windows(
            page.text.text(),
            self.config.window_tokens,
            self.config.window_stride,
        );
        debug!("Page {}: {} text windows", page.index + 1, windows.len());

        let mut stats = ExtractionStats::default();
        let mut running = RunningBest::new();
        let mut proposed = 0;

        for window in &windows {
            stats.text_calls += 1;
            let answer = match self.budget.call(self.qa.answer(question, window)).await {
                CallOutcome::Done(Ok(a)) => a,
                CallOutcome::Done(Err(e)) => return Err(DocQaError::model(CAPABILITY, e)),
                CallOutcome::TimedOut => {
                    stats.timed_out += 1;
                    warn!("Page {}: text QA timed out; remaining windows skipped", page.index + 1);
                    break;
                }
                CallOutcome::Cancelled => {
                    stats.timed_out += 1;
                    break;
                }
            };

            match running.consider(&answer, page, Strategy::TextWindow) {
                Acceptance::Empty => continue,
                Acceptance::Unlocatable => {
                    stats.disqualified += 1;
                    debug!(
                        "Page {}: '{}' not found in text layer; disqualified",
                        page.index + 1,
                        answer.answer
                    );
                }
                Acceptance::Accepted | Acceptance::Outscored => {}
            }
            proposed += 1;
        }

        if let Some(cb) = &self.config.progress_callback {
            cb.on_page_scanned(Strategy::TextWindow, page.index + 1, total, proposed);
        }

        Ok(PageScan {
            page_index: page.index,
            best: running.into_best(),
            stats,
        })
    }
}
