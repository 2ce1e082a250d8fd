//! VLM-backed capabilities: image QA, text QA and the two generators, all
//! served by one [`LLMProvider`].
//!
//! Prompt wording lives in [`crate::prompts`]; this module owns provider
//! resolution, the retry loop and reply parsing.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 2 retries the wait sequence
//! is 500 ms → 1 s. The whole loop still runs inside the per-call timeout
//! enforced by the pipeline.
//!
//! ## Scores
//!
//! The model reports its own confidence in the JSON reply. Scores are
//! clamped into `[0, 1]`; a reply without a score counts as 0.

use crate::capability::{ImageQa, QaAnswer, QaServices, TextGenerator, TextQa, WindowParams};
use crate::config::QaConfig;
use crate::error::{CapabilityError, DocQaError};
use crate::pipeline::encode::encode_page;
use crate::prompts::{
    image_qa_user_message, text_qa_user_message, GENERATOR_SYSTEM_PROMPT, IMAGE_QA_SYSTEM_PROMPT,
    TEXT_QA_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Reply budget for the JSON answer lists.
const QA_MAX_TOKENS: usize = 512;

/// Shared provider handle plus sampling and retry settings.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &QaConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn options(&self, max_tokens: usize) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        }
    }

    /// Send `messages`, retrying transient failures with exponential backoff.
    async fn complete(
        &self,
        what: &str,
        messages: &[ChatMessage],
        max_tokens: usize,
    ) -> Result<String, CapabilityError> {
        let start = Instant::now();
        let options = self.options(max_tokens);
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    what, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        what,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("{}: attempt {} failed: {}", what, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(CapabilityError::Failed(format!(
            "{} retries exhausted: {}",
            self.max_retries,
            last_err.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

/// Image QA by a vision model reading the standardized page.
///
/// The model sees the whole page at once, so `doc_stride` has no effect
/// here and ragged-window faults never occur.
#[derive(Clone)]
pub struct VisionDocumentQa {
    client: LlmClient,
}

impl VisionDocumentQa {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageQa for VisionDocumentQa {
    async fn answer(
        &self,
        image: &DynamicImage,
        question: &str,
        params: &WindowParams,
    ) -> Result<Vec<QaAnswer>, CapabilityError> {
        let image_data = encode_page(image)
            .map_err(|e| CapabilityError::Failed(format!("PNG encoding failed: {}", e)))?;
        let messages = vec![
            ChatMessage::system(IMAGE_QA_SYSTEM_PROMPT),
            ChatMessage::user_with_images(
                &image_qa_user_message(question, params.top_k),
                vec![image_data],
            ),
        ];
        let raw = self.client.complete("image QA", &messages, QA_MAX_TOKENS).await?;
        let mut answers = parse_answers(&raw)?;
        answers.truncate(params.top_k.max(1));
        Ok(answers)
    }
}

/// Extractive QA over a text window.
#[derive(Clone)]
pub struct LlmTextQa {
    client: LlmClient,
}

impl LlmTextQa {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextQa for LlmTextQa {
    async fn answer(&self, question: &str, context: &str) -> Result<QaAnswer, CapabilityError> {
        let messages = vec![
            ChatMessage::system(TEXT_QA_SYSTEM_PROMPT),
            ChatMessage::user(&text_qa_user_message(question, context)),
        ];
        let raw = self.client.complete("text QA", &messages, QA_MAX_TOKENS).await?;
        parse_answer(&raw)
    }
}

/// Instruction-following generator used for both summarization and
/// simplification; the instruction travels as the prompt prefix.
#[derive(Clone)]
pub struct LlmGenerator {
    client: LlmClient,
}

impl LlmGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, CapabilityError> {
        let messages = vec![
            ChatMessage::system(GENERATOR_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let raw = self.client.complete("generator", &messages, max_new_tokens).await?;
        Ok(strip_fences(&raw).trim().to_string())
    }
}

/// All four capabilities backed by one provider.
pub fn services_from_provider(provider: Arc<dyn LLMProvider>, config: &QaConfig) -> QaServices {
    let client = LlmClient::new(provider, config);
    let generator = Arc::new(LlmGenerator::new(client.clone()));
    QaServices::new(
        Arc::new(VisionDocumentQa::new(client.clone())),
        Arc::new(LlmTextQa::new(client)),
        generator.clone(),
        generator,
    )
}

/// Resolve the provider from `config` and build the bundled capabilities.
pub fn default_services(config: &QaConfig) -> Result<QaServices, DocQaError> {
    let provider = resolve_provider(config)?;
    Ok(services_from_provider(provider, config))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocQaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocQaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are set.
/// 4. **`OPENAI_API_KEY`** present: OpenAI with the configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &QaConfig) -> Result<Arc<dyn LLMProvider>, DocQaError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocQaError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Reply parsing ────────────────────────────────────────────────────────

static RE_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

#[derive(Debug, Deserialize)]
struct AnswersReply {
    #[serde(default)]
    answers: Vec<AnswerReply>,
}

#[derive(Debug, Deserialize)]
struct AnswerReply {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    score: f64,
}

impl From<AnswerReply> for QaAnswer {
    fn from(r: AnswerReply) -> Self {
        QaAnswer::new(r.answer, r.score)
    }
}

/// Remove one pair of outer code fences, if present.
fn strip_fences(raw: &str) -> &str {
    RE_FENCES
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

/// The outermost `{ … }` of a reply that wrapped its JSON in prose.
fn json_object(raw: &str) -> Result<&str, CapabilityError> {
    let body = strip_fences(raw);
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&body[start..=end]),
        _ => Err(CapabilityError::MalformedResponse(format!(
            "no JSON object in reply: {}",
            preview(raw)
        ))),
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(120).collect()
}

/// Parse an image-QA reply: `{"answers": [{"answer": …, "score": …}]}`.
pub fn parse_answers(raw: &str) -> Result<Vec<QaAnswer>, CapabilityError> {
    let json = json_object(raw)?;
    let reply: AnswersReply = serde_json::from_str(json)
        .map_err(|e| CapabilityError::MalformedResponse(format!("{}: {}", e, preview(raw))))?;
    Ok(reply.answers.into_iter().map(QaAnswer::from).collect())
}

/// Parse a text-QA reply: `{"answer": …, "score": …}`.
pub fn parse_answer(raw: &str) -> Result<QaAnswer, CapabilityError> {
    let json = json_object(raw)?;
    let reply: AnswerReply = serde_json::from_str(json)
        .map_err(|e| CapabilityError::MalformedResponse(format!("{}: {}", e, preview(raw))))?;
    Ok(reply.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_answer_list() {
        let a = parse_answers(r#"{"answers":[{"answer":"Quarterly Report","score":0.92},{"answer":"Q3","score":0.4}]}"#)
            .unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0], QaAnswer::new("Quarterly Report", 0.92));
    }

    #[test]
    fn parses_fenced_reply() {
        let raw = "```json\n{\"answers\": [{\"answer\": \"42\", \"score\": 1.4}]}\n```";
        let a = parse_answers(raw).unwrap();
        assert_eq!(a, vec![QaAnswer::new("42", 1.0)]);
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let raw = "Sure! Here it is: {\"answer\": \"Alice\", \"score\": 0.7} Hope that helps.";
        assert_eq!(parse_answer(raw).unwrap(), QaAnswer::new("Alice", 0.7));
    }

    #[test]
    fn missing_fields_default() {
        assert!(parse_answers("{}").unwrap().is_empty());
        assert_eq!(parse_answer(r#"{"answer":"x"}"#).unwrap().score, 0.0);
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_answer("I could not find it").unwrap_err();
        assert!(matches!(err, CapabilityError::MalformedResponse(_)));
        let err = parse_answers(r#"{"answers": "nope"}"#).unwrap_err();
        assert!(matches!(err, CapabilityError::MalformedResponse(_)));
    }

    #[test]
    fn strip_fences_leaves_plain_text() {
        assert_eq!(strip_fences("plain"), "plain");
        assert_eq!(strip_fences("```\nfenced\n```"), "fenced");
    }
}
