//! Image-based span extraction: ask the image-QA capability about every
//! standardized page and keep the best answer that can be found in the
//! page's text layer.
//!
//! ## Ragged windows
//!
//! Token-window QA backends occasionally fail on a page whose token count
//! does not divide evenly into windows of the requested overlap. That fault
//! ([`CapabilityError::RaggedWindow`]) is retried exactly once with the
//! fallback stride from [`QaConfig::fallback_window_params`]. A second
//! failure, or any other capability error, aborts the request.
//!
//! ## Concurrency
//!
//! Pages are scanned by a pool of `min(page_count, concurrency)` workers.
//! Each page keeps its own running best; the per-page winners are merged in
//! page order afterwards so the lower-page tie-break holds no matter which
//! worker finishes first.

use crate::capability::{ImageQa, QaAnswer};
use crate::config::QaConfig;
use crate::document::{Document, Page, Strategy};
use crate::error::{CapabilityError, DocQaError};
use crate::output::ExtractionStats;
use crate::pipeline::budget::{Budget, CallOutcome};
use crate::pipeline::select::{Acceptance, PageScan, RunningBest, Selection};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use tracing::{debug, warn};

const CAPABILITY: &str = "image QA";

pub struct ImageSpanExtractor<'a> {
    qa: &'a dyn ImageQa,
    config: &'a QaConfig,
    budget: &'a Budget,
}

impl<'a> ImageSpanExtractor<'a> {
    pub fn new(qa: &'a dyn ImageQa, config: &'a QaConfig, budget: &'a Budget) -> Self {
        Self { qa, config, budget }
    }

    /// Scan every page; `images[i]` is the standardized render of page `i`.
    pub async fn extract(
        &self,
        document: &Document,
        images: &[DynamicImage],
        question: &str,
    ) -> Result<Selection, DocQaError> {
        let total = document.page_count();
        if total == 0 {
            return Ok(Selection::default());
        }
        let workers = self.config.concurrency.min(total).max(1);
        debug!("Image QA over {} pages with {} workers", total, workers);

        let scans: Vec<Result<PageScan, DocQaError>> = stream::iter(
            document
                .pages
                .iter()
                .zip(images.iter())
                .map(|(page, image)| self.scan_page(page, image, question, total)),
        )
        .buffer_unordered(workers)
        .collect()
        .await;

        let scans = scans.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(Selection::from_scans(scans))
    }

    async fn scan_page(
        &self,
        page: &Page,
        image: &DynamicImage,
        question: &str,
        total: usize,
    ) -> Result<PageScan, DocQaError> {
        let mut stats = ExtractionStats::default();
        let answers = self.ask(image, question, page.index, &mut stats).await?;

        let mut running = RunningBest::new();
        let mut proposed = 0;
        for answer in answers.iter().flatten() {
            match running.consider(answer, page, Strategy::Image) {
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
            cb.on_page_scanned(Strategy::Image, page.index + 1, total, proposed);
        }

        Ok(PageScan {
            page_index: page.index,
            best: running.into_best(),
            stats,
        })
    }

    /// One bounded call, plus the single ragged-window retry.
    ///
    /// `Ok(None)` means the budget ran out; the page contributes nothing.
    async fn ask(
        &self,
        image: &DynamicImage,
        question: &str,
        page_index: usize,
        stats: &mut ExtractionStats,
    ) -> Result<Option<Vec<QaAnswer>>, DocQaError> {
        let params = self.config.window_params();
        stats.image_calls += 1;
        let first = match self.budget.call(self.qa.answer(image, question, &params)).await {
            CallOutcome::Done(r) => r,
            outcome => return Ok(abandoned(outcome, page_index, stats)),
        };

        let err = match first {
            Ok(answers) => return Ok(Some(answers)),
            Err(e) if e.is_recoverable() => e,
            Err(e) => return Err(DocQaError::model(CAPABILITY, e)),
        };

        warn!(
            "Page {}: {}; retrying once with doc_stride={}",
            page_index + 1,
            err,
            self.config.fallback_doc_stride
        );
        let fallback = self.config.fallback_window_params();
        stats.image_calls += 1;
        match self.budget.call(self.qa.answer(image, question, &fallback)).await {
            CallOutcome::Done(Ok(answers)) => Ok(Some(answers)),
            CallOutcome::Done(Err(e)) => Err(DocQaError::model(CAPABILITY, retry_failed(err, e))),
            outcome => Ok(abandoned(outcome, page_index, stats)),
        }
    }
}

fn abandoned<T>(
    outcome: CallOutcome<T>,
    page_index: usize,
    stats: &mut ExtractionStats,
) -> Option<Vec<QaAnswer>> {
    stats.timed_out += 1;
    match outcome {
        CallOutcome::Cancelled => debug!("Page {}: cancelled", page_index + 1),
        _ => warn!("Page {}: image QA timed out; page skipped", page_index + 1),
    }
    None
}

fn retry_failed(first: CapabilityError, second: CapabilityError) -> CapabilityError {
    CapabilityError::Failed(format!("{} (retry after '{}')", second, first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::WindowParams;
    use crate::document::{PageSize, PageText};
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers per call, popped front to back; records the params it saw.
    struct Scripted {
        replies: Mutex<Vec<Result<Vec<QaAnswer>, CapabilityError>>>,
        seen: Mutex<Vec<WindowParams>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Vec<QaAnswer>, CapabilityError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageQa for Scripted {
        async fn answer(
            &self,
            _image: &DynamicImage,
            _question: &str,
            params: &WindowParams,
        ) -> Result<Vec<QaAnswer>, CapabilityError> {
            self.seen.lock().unwrap().push(*params);
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn one_page(text: &str) -> (Document, Vec<DynamicImage>) {
        let page = Page::new(0, PageSize::letter(), PageText::monospaced(text, 72.0, 72.0, 6.0, 12.0));
        (
            Document::new(vec![page]),
            vec![DynamicImage::ImageRgb8(RgbImage::new(800, 600))],
        )
    }

    fn budget() -> Budget {
        Budget::new(Duration::from_secs(5), None)
    }

    #[tokio::test]
    async fn ragged_window_is_retried_once_with_fallback_stride() {
        let qa = Scripted::new(vec![
            Err(CapabilityError::RaggedWindow("uneven windows".into())),
            Ok(vec![QaAnswer::new("Quarterly Report", 0.9)]),
        ]);
        let config = QaConfig::builder().doc_stride(128).build().unwrap();
        let (doc, images) = one_page("Title: Quarterly Report");
        let budget = budget();

        let sel = ImageSpanExtractor::new(&qa, &config, &budget)
            .extract(&doc, &images, "What is the title?")
            .await
            .unwrap();

        assert_eq!(sel.best.unwrap().text, "Quarterly Report");
        assert_eq!(sel.stats.image_calls, 2);
        let seen = qa.seen.lock().unwrap();
        assert_eq!(seen[0].doc_stride, Some(128));
        assert_eq!(seen[1].doc_stride, Some(0));
    }

    #[tokio::test]
    async fn second_ragged_window_is_a_model_error() {
        let qa = Scripted::new(vec![
            Err(CapabilityError::RaggedWindow("a".into())),
            Err(CapabilityError::RaggedWindow("b".into())),
        ]);
        let config = QaConfig::default();
        let (doc, images) = one_page("anything");
        let budget = budget();

        let err = ImageSpanExtractor::new(&qa, &config, &budget)
            .extract(&doc, &images, "q")
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::ModelInvocation { capability: "image QA", .. }));
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let qa = Scripted::new(vec![Err(CapabilityError::Failed("503".into()))]);
        let config = QaConfig::default();
        let (doc, images) = one_page("anything");
        let budget = budget();

        let err = ImageSpanExtractor::new(&qa, &config, &budget)
            .extract(&doc, &images, "q")
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::ModelInvocation { .. }));
        assert_eq!(qa.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unlocatable_top_answer_falls_through_to_next() {
        let qa = Scripted::new(vec![Ok(vec![
            QaAnswer::new("Annual Summary", 0.95),
            QaAnswer::new("", 0.9),
            QaAnswer::new("Quarterly Report", 0.6),
        ])]);
        let config = QaConfig::default();
        let (doc, images) = one_page("Title: Quarterly Report");
        let budget = budget();

        let sel = ImageSpanExtractor::new(&qa, &config, &budget)
            .extract(&doc, &images, "q")
            .await
            .unwrap();
        let best = sel.best.unwrap();
        assert_eq!(best.text, "Quarterly Report");
        assert_eq!(best.score, 0.6);
        assert_eq!(sel.stats.disqualified, 1);
    }

    #[tokio::test]
    async fn empty_document_yields_nothing() {
        let qa = Scripted::new(vec![]);
        let config = QaConfig::default();
        let budget = budget();
        let sel = ImageSpanExtractor::new(&qa, &config, &budget)
            .extract(&Document::default(), &[], "q")
            .await
            .unwrap();
        assert!(sel.best.is_none());
    }
}
