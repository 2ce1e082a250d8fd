//! Model capabilities consumed by the pipeline.
//!
//! The pipeline never owns a model. It receives a [`QaServices`] bundle of
//! trait objects at construction time and calls them through these traits,
//! so tests swap in deterministic stand-ins and the library ships VLM-backed
//! implementations in [`crate::pipeline::llm`].
//!
//! All methods are async; the orchestrator bounds every call with the
//! configured timeout (see [`crate::pipeline::budget`]).

use crate::error::CapabilityError;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One answer proposed by a QA capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub answer: String,
    /// Confidence in `[0, 1]`.
    pub score: f64,
}

impl QaAnswer {
    /// Build an answer, clamping the score into `[0, 1]` (NaN becomes 0).
    pub fn new(answer: impl Into<String>, score: f64) -> Self {
        Self {
            answer: answer.into(),
            score: clamp_score(score),
        }
    }
}

/// Clamp a confidence into `[0, 1]`; NaN becomes 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Windowing parameters passed to the image-QA capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    /// Overlap between token windows. `None` lets the capability choose.
    pub doc_stride: Option<usize>,
    /// Maximum number of answers to return for one page.
    pub top_k: usize,
}

/// `(image, question) → answers`, in any order.
#[async_trait]
pub trait ImageQa: Send + Sync {
    async fn answer(
        &self,
        image: &DynamicImage,
        question: &str,
        params: &WindowParams,
    ) -> Result<Vec<QaAnswer>, CapabilityError>;
}

/// `(question, context) → single best answer`.
#[async_trait]
pub trait TextQa: Send + Sync {
    async fn answer(&self, question: &str, context: &str) -> Result<QaAnswer, CapabilityError>;
}

/// `(prompt, max new tokens) → single best generated sequence`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_new_tokens: usize)
        -> Result<String, CapabilityError>;
}

/// The capabilities one [`crate::qa::DocumentQa`] works with.
///
/// Constructed once at startup and shared by every request; cloning only
/// bumps reference counts.
#[derive(Clone)]
pub struct QaServices {
    pub image_qa: Arc<dyn ImageQa>,
    pub text_qa: Arc<dyn TextQa>,
    pub code_summarizer: Arc<dyn TextGenerator>,
    pub simplifier: Arc<dyn TextGenerator>,
}

impl QaServices {
    pub fn new(
        image_qa: Arc<dyn ImageQa>,
        text_qa: Arc<dyn TextQa>,
        code_summarizer: Arc<dyn TextGenerator>,
        simplifier: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            image_qa,
            text_qa,
            code_summarizer,
            simplifier,
        }
    }
}

impl fmt::Debug for QaServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaServices")
            .field("image_qa", &"<dyn ImageQa>")
            .field("text_qa", &"<dyn TextQa>")
            .field("code_summarizer", &"<dyn TextGenerator>")
            .field("simplifier", &"<dyn TextGenerator>")
            .finish()
    }
}
