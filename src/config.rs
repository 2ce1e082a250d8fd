//! Configuration for question answering over PDF documents.
//!
//! All request behaviour is controlled through [`QaConfig`], built via its
//! [`QaConfigBuilder`]. One config is shared by every request a
//! [`crate::qa::DocumentQa`] serves; per-request switches (code summary,
//! plain-language rewrite, cancellation) live in
//! [`crate::qa::AnswerOptions`] instead.

use crate::capability::WindowParams;
use crate::error::DocQaError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for answering questions about a document.
///
/// # Example
/// ```rust
/// use edgequake_docqa::QaConfig;
///
/// let config = QaConfig::builder()
///     .display_dpi(200)
///     .concurrency(2)
///     .request_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.display_dpi, 200);
/// ```
#[derive(Clone)]
pub struct QaConfig {
    /// DPI of the page images returned to the caller (and highlighted). Range: 72–400. Default: 150.
    pub display_dpi: u32,

    /// DPI used to render pages before standardization for image QA. Range: 72–400. Default: 100.
    ///
    /// Standardization only ever shrinks, so rendering far above what fits
    /// the canvas wastes memory without changing the model input.
    pub qa_dpi: u32,

    /// Standardized canvas width in pixels. Default: 800.
    pub canvas_width: u32,

    /// Standardized canvas height in pixels. Default: 600.
    pub canvas_height: u32,

    /// Tokens per text window for the fallback strategy. Default: 450.
    pub window_tokens: usize,

    /// Tokens between successive window starts. Default: 50.
    pub window_stride: usize,

    /// Image-QA window overlap on the first attempt. Default: `None` (capability default).
    pub doc_stride: Option<usize>,

    /// Window overlap forced on the single retry after a ragged-window fault. Default: 0.
    pub fallback_doc_stride: usize,

    /// Answers requested per page from image QA. Default: 3.
    pub top_k: usize,

    /// Cap on generated tokens for summarization/simplification. Default: 128.
    pub max_refine_tokens: usize,

    /// Maximum concurrent model calls; the pool never exceeds the page count. Default: 4.
    ///
    /// Each in-flight page holds its rendered image, so this also bounds the
    /// pixel memory held by the QA stage.
    pub concurrency: usize,

    /// Timeout for a single capability call in seconds. Default: 60.
    pub call_timeout_secs: u64,

    /// Overall deadline for locating an answer. Default: none.
    ///
    /// When it passes, the best candidate found so far is used; pages not yet
    /// scanned are skipped rather than failing the request.
    pub request_timeout_secs: Option<u64>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// LLM model identifier for the bundled capabilities. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the bundled capabilities. Default: 0.0.
    pub temperature: f32,

    /// Retries on a transient provider failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            display_dpi: 150,
            qa_dpi: 100,
            canvas_width: 800,
            canvas_height: 600,
            window_tokens: 450,
            window_stride: 50,
            doc_stride: None,
            fallback_doc_stride: 0,
            top_k: 3,
            max_refine_tokens: 128,
            concurrency: 4,
            call_timeout_secs: 60,
            request_timeout_secs: None,
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_retries: 2,
            retry_backoff_ms: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for QaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaConfig")
            .field("display_dpi", &self.display_dpi)
            .field("qa_dpi", &self.qa_dpi)
            .field("canvas", &(self.canvas_width, self.canvas_height))
            .field("window_tokens", &self.window_tokens)
            .field("window_stride", &self.window_stride)
            .field("doc_stride", &self.doc_stride)
            .field("fallback_doc_stride", &self.fallback_doc_stride)
            .field("top_k", &self.top_k)
            .field("max_refine_tokens", &self.max_refine_tokens)
            .field("concurrency", &self.concurrency)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl QaConfig {
    /// Create a new builder for `QaConfig`.
    pub fn builder() -> QaConfigBuilder {
        QaConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parameters for the first image-QA attempt on a page.
    pub fn window_params(&self) -> WindowParams {
        WindowParams {
            doc_stride: self.doc_stride,
            top_k: self.top_k,
        }
    }

    /// Parameters for the retry after a ragged-window fault.
    pub fn fallback_window_params(&self) -> WindowParams {
        WindowParams {
            doc_stride: Some(self.fallback_doc_stride),
            top_k: self.top_k,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`QaConfig`].
pub struct QaConfigBuilder {
    config: QaConfig,
}

impl fmt::Debug for QaConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl QaConfigBuilder {
    pub fn display_dpi(mut self, dpi: u32) -> Self {
        self.config.display_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn qa_dpi(mut self, dpi: u32) -> Self {
        self.config.qa_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn canvas(mut self, width: u32, height: u32) -> Self {
        self.config.canvas_width = width;
        self.config.canvas_height = height;
        self
    }

    pub fn window(mut self, tokens: usize, stride: usize) -> Self {
        self.config.window_tokens = tokens;
        self.config.window_stride = stride;
        self
    }

    pub fn doc_stride(mut self, stride: usize) -> Self {
        self.config.doc_stride = Some(stride);
        self
    }

    pub fn fallback_doc_stride(mut self, stride: usize) -> Self {
        self.config.fallback_doc_stride = stride;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k.max(1);
        self
    }

    pub fn max_refine_tokens(mut self, n: usize) -> Self {
        self.config.max_refine_tokens = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn call_timeout_secs(mut self, secs: u64) -> Self {
        self.config.call_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<QaConfig, DocQaError> {
        let c = &self.config;
        if c.canvas_width == 0 || c.canvas_height == 0 {
            return Err(DocQaError::InvalidConfig(format!(
                "Canvas must be non-empty, got {}x{}",
                c.canvas_width, c.canvas_height
            )));
        }
        if c.window_tokens == 0 || c.window_stride == 0 {
            return Err(DocQaError::InvalidConfig(format!(
                "Text window and stride must be ≥ 1, got {}/{}",
                c.window_tokens, c.window_stride
            )));
        }
        if c.call_timeout_secs == 0 {
            return Err(DocQaError::InvalidConfig(
                "Call timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_refine_tokens == 0 {
            return Err(DocQaError::InvalidConfig(
                "max_refine_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
