//! Span selection: the running-best accumulator and the two-strategy
//! fallback chain.
//!
//! ## Acceptance rule
//!
//! A candidate replaces the running best only when it scores **strictly**
//! higher *and* its text can be located on its page. Ties keep the
//! earlier candidate, so on equal scores the lower page index wins. An
//! unlocatable candidate is dropped and scanning continues: a lower-scoring
//! answer that can be highlighted beats a higher-scoring one that cannot.
//!
//! ## Fallback chain
//!
//! Image QA runs first because it sees layout (tables, forms). The text
//! windows run only when image QA located nothing, and never alongside it.

use crate::capability::{clamp_score, QaAnswer, QaServices};
use crate::config::QaConfig;
use crate::document::{Candidate, Document, Page, Strategy};
use crate::error::DocQaError;
use crate::output::ExtractionStats;
use crate::pipeline::budget::Budget;
use crate::pipeline::image_span::ImageSpanExtractor;
use crate::pipeline::text_span::TextSpanExtractor;
use image::DynamicImage;
use tracing::{debug, info};

/// Verdict on one proposed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Became the new running best.
    Accepted,
    /// Did not beat the running best; its location was never looked up.
    Outscored,
    /// Beat the running best but is not on the page; disqualified.
    Unlocatable,
    /// Blank answer text.
    Empty,
}

/// The best located candidate seen so far.
#[derive(Debug, Clone, Default)]
pub struct RunningBest {
    best: Option<Candidate>,
}

impl RunningBest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<Candidate> {
        self.best
    }

    fn beats_best(&self, score: f64) -> bool {
        self.best.as_ref().is_none_or(|b| score > b.score)
    }

    /// Offer an answer read from `page`.
    ///
    /// The score is clamped again here since capabilities may build
    /// [`QaAnswer`] literally.
    pub fn consider(&mut self, answer: &QaAnswer, page: &Page, strategy: Strategy) -> Acceptance {
        let text = answer.answer.trim();
        if text.is_empty() {
            return Acceptance::Empty;
        }
        let score = clamp_score(answer.score);
        if !self.beats_best(score) {
            return Acceptance::Outscored;
        }
        match page.locate(text) {
            Some(bbox) => {
                self.best = Some(Candidate {
                    text: text.to_string(),
                    score,
                    strategy,
                    page_index: page.index,
                    bbox: Some(bbox),
                });
                Acceptance::Accepted
            }
            None => Acceptance::Unlocatable,
        }
    }

    /// Fold per-page winners in page order with the same strict rule.
    ///
    /// Pages may finish in any order under the worker pool; sorting before
    /// the fold keeps the lower-page tie-break identical to a sequential scan.
    pub fn merge_ordered(mut page_bests: Vec<(usize, Option<Candidate>)>) -> Option<Candidate> {
        page_bests.sort_by_key(|(idx, _)| *idx);
        let mut running = RunningBest::new();
        for candidate in page_bests.into_iter().filter_map(|(_, c)| c) {
            if candidate.bbox.is_some() && running.beats_best(candidate.score) {
                running.best = Some(candidate);
            }
        }
        running.into_best()
    }
}

/// Outcome of one page scanned by one strategy.
#[derive(Debug, Clone, Default)]
pub(crate) struct PageScan {
    pub page_index: usize,
    pub best: Option<Candidate>,
    pub stats: ExtractionStats,
}

/// Winner of a strategy (or of the whole chain) plus its counters.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub best: Option<Candidate>,
    pub stats: ExtractionStats,
}

impl Selection {
    pub(crate) fn from_scans(scans: Vec<PageScan>) -> Self {
        let mut stats = ExtractionStats::default();
        let mut bests = Vec::with_capacity(scans.len());
        for scan in scans {
            stats.absorb(&scan.stats);
            bests.push((scan.page_index, scan.best));
        }
        Self {
            best: RunningBest::merge_ordered(bests),
            stats,
        }
    }
}

/// Image QA first; text windows only if image QA located nothing.
pub struct SpanSelector<'a> {
    services: &'a QaServices,
    config: &'a QaConfig,
    budget: &'a Budget,
}

impl<'a> SpanSelector<'a> {
    pub fn new(services: &'a QaServices, config: &'a QaConfig, budget: &'a Budget) -> Self {
        Self {
            services,
            config,
            budget,
        }
    }

    /// Pick the single best locatable span of `document`.
    ///
    /// `standardized` holds one canvas-sized image per page, in page order.
    pub async fn select(
        &self,
        document: &Document,
        standardized: &[DynamicImage],
        question: &str,
    ) -> Result<Selection, DocQaError> {
        if standardized.len() != document.page_count() {
            return Err(DocQaError::PageCountMismatch {
                rendered: standardized.len(),
                expected: document.page_count(),
            });
        }

        let progress = self.config.progress_callback.as_ref();

        if let Some(cb) = progress {
            cb.on_strategy_start(Strategy::Image);
        }
        let image = ImageSpanExtractor::new(self.services.image_qa.as_ref(), self.config, self.budget)
            .extract(document, standardized, question)
            .await?;
        if let Some(best) = &image.best {
            info!(
                "Image QA located '{}' on page {} (score {:.3})",
                best.text,
                best.page_index + 1,
                best.score
            );
            return Ok(image);
        }

        if self.budget.is_exhausted() {
            info!("Budget exhausted after image QA; skipping text-window fallback");
            return Ok(image);
        }

        debug!("Image QA located nothing; falling back to text windows");
        if let Some(cb) = progress {
            cb.on_strategy_start(Strategy::TextWindow);
        }
        let mut text = TextSpanExtractor::new(self.services.text_qa.as_ref(), self.config, self.budget)
            .extract(document, question)
            .await?;
        text.stats.absorb(&image.stats);
        if let Some(best) = &text.best {
            info!(
                "Text QA located '{}' on page {} (score {:.3})",
                best.text,
                best.page_index + 1,
                best.score
            );
        }
        Ok(text)
    }
}
