//! Answer refinement: turn the winning span into the text shown to the user.
//!
//! Exactly one path runs per answer:
//!
//! | Condition | Path |
//! |-----------|------|
//! | `force_code` or the span looks like code | code summarizer, `"summarize: " + span` |
//! | otherwise, `simplify_layman` | simplifier, `"Explain in simple terms: " + span` |
//! | otherwise | span unchanged |
//!
//! Both generators are capped at `max_refine_tokens` new tokens.

use crate::capability::QaServices;
use crate::config::QaConfig;
use crate::error::DocQaError;
use crate::pipeline::budget::{Budget, CallOutcome};
use crate::prompts::{code_summary_prompt, simplify_prompt};
use tracing::{debug, warn};

/// Substrings that mark a span as source code.
pub const CODE_MARKERS: [&str; 9] = [";", "{", "}", "def ", "class ", "->", "<", ">", "="];

/// Cheap code heuristic: any of [`CODE_MARKERS`] occurs in `span`.
pub fn is_code(span: &str) -> bool {
    CODE_MARKERS.iter().any(|m| span.contains(m))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementRoute {
    CodeSummary,
    Simplify,
    PassThrough,
}

/// Pick the refinement path; `force_code` always wins.
pub fn route(span: &str, force_code: bool, simplify_layman: bool) -> RefinementRoute {
    if force_code || is_code(span) {
        RefinementRoute::CodeSummary
    } else if simplify_layman {
        RefinementRoute::Simplify
    } else {
        RefinementRoute::PassThrough
    }
}

pub struct AnswerRefiner<'a> {
    services: &'a QaServices,
    config: &'a QaConfig,
    budget: &'a Budget,
}

impl<'a> AnswerRefiner<'a> {
    pub fn new(services: &'a QaServices, config: &'a QaConfig, budget: &'a Budget) -> Self {
        Self {
            services,
            config,
            budget,
        }
    }

    /// Refine `span`.
    ///
    /// A generator that runs out of budget leaves the span unrefined; a
    /// generator that fails is a [`DocQaError::ModelInvocation`].
    pub async fn refine(
        &self,
        span: &str,
        force_code: bool,
        simplify_layman: bool,
    ) -> Result<String, DocQaError> {
        let (capability, generator, prompt) = match route(span, force_code, simplify_layman) {
            RefinementRoute::PassThrough => return Ok(span.to_string()),
            RefinementRoute::CodeSummary => (
                "code summarization",
                &self.services.code_summarizer,
                code_summary_prompt(span),
            ),
            RefinementRoute::Simplify => (
                "simplification",
                &self.services.simplifier,
                simplify_prompt(span),
            ),
        };
        debug!("Refining answer via {}", capability);

        let max_tokens = self.config.max_refine_tokens;
        match self.budget.call(generator.generate(&prompt, max_tokens)).await {
            CallOutcome::Done(Ok(text)) => Ok(text.trim().to_string()),
            CallOutcome::Done(Err(e)) => Err(DocQaError::model(capability, e)),
            CallOutcome::TimedOut | CallOutcome::Cancelled => {
                warn!("{} did not finish in time; returning the extracted span", capability);
                Ok(span.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ImageQa, QaAnswer, TextGenerator, TextQa, WindowParams};
    use crate::error::CapabilityError;
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn code_markers_are_detected() {
        for span in ["x = 1", "fn f() -> u8", "def main():", "class Foo:", "a < b", "{ }", "stmt;"] {
            assert!(is_code(span), "{span}");
        }
        assert!(!is_code("Quarterly Report"));
        assert!(!is_code("define the classroom"));
    }

    #[test]
    fn routing_table() {
        assert_eq!(route("plain", false, false), RefinementRoute::PassThrough);
        assert_eq!(route("plain", false, true), RefinementRoute::Simplify);
        assert_eq!(route("plain", true, true), RefinementRoute::CodeSummary);
        assert_eq!(route("x = 1", false, true), RefinementRoute::CodeSummary);
    }

    struct Unused;

    #[async_trait]
    impl ImageQa for Unused {
        async fn answer(&self, _: &DynamicImage, _: &str, _: &WindowParams) -> Result<Vec<QaAnswer>, CapabilityError> {
            unreachable!()
        }
    }

    #[async_trait]
    impl TextQa for Unused {
        async fn answer(&self, _: &str, _: &str) -> Result<QaAnswer, CapabilityError> {
            unreachable!()
        }
    }

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl TextGenerator for Recorder {
        async fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, CapabilityError> {
            self.prompts.lock().unwrap().push((prompt.to_string(), max_new_tokens));
            Ok(format!(" refined({prompt}) "))
        }
    }

    fn services(summarizer: Arc<Recorder>, simplifier: Arc<Recorder>) -> QaServices {
        QaServices::new(Arc::new(Unused), Arc::new(Unused), summarizer, simplifier)
    }

    #[tokio::test]
    async fn force_code_goes_to_summarizer_with_cap() {
        let sum = Arc::new(Recorder::default());
        let simp = Arc::new(Recorder::default());
        let svc = services(sum.clone(), simp.clone());
        let config = QaConfig::default();
        let budget = Budget::new(Duration::from_secs(5), None);

        let out = AnswerRefiner::new(&svc, &config, &budget)
            .refine("Quarterly Report", true, true)
            .await
            .unwrap();

        assert_eq!(out, "refined(summarize: Quarterly Report)");
        assert_eq!(
            *sum.prompts.lock().unwrap(),
            vec![("summarize: Quarterly Report".to_string(), 128)]
        );
        assert!(simp.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pass_through_calls_nothing() {
        let sum = Arc::new(Recorder::default());
        let simp = Arc::new(Recorder::default());
        let svc = services(sum.clone(), simp.clone());
        let config = QaConfig::default();
        let budget = Budget::new(Duration::from_secs(5), None);

        let out = AnswerRefiner::new(&svc, &config, &budget)
            .refine("Quarterly Report", false, false)
            .await
            .unwrap();
        assert_eq!(out, "Quarterly Report");
        assert!(sum.prompts.lock().unwrap().is_empty());
        assert!(simp.prompts.lock().unwrap().is_empty());
    }
}
