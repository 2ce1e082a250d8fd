//! Result types returned by the [`crate::qa`] entry points.

use crate::document::{BBox, Strategy};
use image::DynamicImage;
use serde::Serialize;

/// Canonical answer when no strategy located a span on any page.
pub const NO_ANSWER: &str = "No answer found.";

/// Prefix of every boundary error string.
pub const ERROR_PREFIX: &str = "Error: ";

/// The best located span of a document, before refinement.
///
/// An empty result has `span == ""`, no bbox, page 0 and zero dimensions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanResult {
    pub span: String,
    pub bbox: Option<BBox>,
    pub page_index: usize,
    /// Point-space size of the winning page.
    pub page_dims: (f64, f64),
}

impl SpanResult {
    pub fn empty() -> Self {
        Self {
            span: String::new(),
            bbox: None,
            page_index: 0,
            page_dims: (0.0, 0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }
}

/// Counters collected while answering one question.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionStats {
    pub page_count: usize,
    /// Strategy of the winning candidate, if any.
    pub strategy: Option<Strategy>,
    /// Image-QA calls issued, retries included.
    pub image_calls: usize,
    /// Text-QA calls issued (one per window).
    pub text_calls: usize,
    /// Candidates that outscored the running best but could not be located.
    pub disqualified: usize,
    /// Calls abandoned because of the call timeout, the deadline or cancellation.
    pub timed_out: usize,
    pub duration_ms: u64,
}

impl ExtractionStats {
    pub(crate) fn absorb(&mut self, other: &ExtractionStats) {
        self.image_calls += other.image_calls;
        self.text_calls += other.text_calls;
        self.disqualified += other.disqualified;
        self.timed_out += other.timed_out;
    }
}

/// A refined, highlighted answer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    /// The span as extracted, before refinement.
    pub span: String,
    pub page_index: usize,
    pub bbox: BBox,
    /// One image per document page; only `pages[page_index]` carries the overlay.
    #[serde(skip)]
    pub pages: Vec<DynamicImage>,
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_span_result() {
        let r = SpanResult::empty();
        assert!(r.is_empty());
        assert!(r.bbox.is_none());
    }

    #[test]
    fn stats_absorb_sums_counters() {
        let mut a = ExtractionStats {
            image_calls: 2,
            disqualified: 1,
            ..Default::default()
        };
        let b = ExtractionStats {
            image_calls: 3,
            text_calls: 4,
            timed_out: 1,
            ..Default::default()
        };
        a.absorb(&b);
        assert_eq!((a.image_calls, a.text_calls, a.disqualified, a.timed_out), (5, 4, 1, 1));
    }

    #[test]
    fn answer_result_serialises_without_pages() {
        let r = AnswerResult {
            answer: "42".into(),
            span: "42".into(),
            page_index: 0,
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            pages: vec![DynamicImage::new_rgb8(2, 2)],
            stats: ExtractionStats::default(),
        };
        let json = serde_json::to_string(&r).expect("serialise");
        assert!(json.contains("\"answer\":\"42\""));
        assert!(!json.contains("pages\":["));
    }
}
