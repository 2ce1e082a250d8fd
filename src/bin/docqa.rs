//! CLI binary for edgequake-docqa.
//!
//! A thin shim over the library crate that maps CLI flags to `QaConfig`,
//! asks one question and prints the answer.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docqa::{
    AnswerOptions, AnswerResult, BBox, DocumentQa, ExtractionProgressCallback, ExtractionStats,
    ProgressCallback, QaConfig, Strategy, NO_ANSWER,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per scanned page. Pages finish out of order
/// under the worker pool, so the bar counts rather than tracks positions.
struct CliProgressCallback {
    bar: ProgressBar,
    scanned: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            scanned: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Searching {total_pages} pages…"))
        ));
    }

    fn on_strategy_start(&self, strategy: Strategy) {
        self.scanned.store(0, Ordering::SeqCst);
        let prefix = match strategy {
            Strategy::Image => "Image QA",
            Strategy::TextWindow => "Text QA",
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message("scanning");
    }

    fn on_page_scanned(&self, strategy: Strategy, page_num: usize, total_pages: usize, candidates: usize) {
        let done = self.scanned.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{candidates} candidates ({strategy})")),
        ));
        self.bar.set_message(format!("{done}/{total_pages} pages"));
    }

    fn on_extraction_complete(&self, _found: bool) {
        self.bar.finish_and_clear();
    }
}

/// Clears the spinner on every exit path, including errors that never
/// reach `on_extraction_complete`.
impl Drop for CliProgressCallback {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ask a question
  docqa report.pdf "What is the title?"

  # Save the pages with the answer outlined
  docqa report.pdf "Who signed the contract?" -o highlighted/

  # Summarize a code answer / explain an answer in plain words
  docqa manual.pdf "How is the client configured?" --force-code
  docqa paper.pdf "What is the main result?" --simplify

  # Give up after 30 seconds and keep the best answer so far
  docqa big.pdf "What is the total?" --timeout 30

  # Machine-readable output
  docqa report.pdf "What is the title?" --json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise next to the binary, ./, or system)
"#;

/// Answer questions about PDF documents and highlight where the answer is.
#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Answer a question about a PDF and highlight the answer on its page",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    pdf: PathBuf,

    /// The question to answer.
    question: String,

    /// Always summarize the answer as code.
    #[arg(long, env = "DOCQA_FORCE_CODE")]
    force_code: bool,

    /// Explain a non-code answer in simple terms.
    #[arg(long, env = "DOCQA_SIMPLIFY")]
    simplify: bool,

    /// Write every page as page-NNN.png into this directory.
    #[arg(short, long, env = "DOCQA_OUTPUT")]
    output: Option<PathBuf>,

    /// DPI of the returned page images (72–400).
    #[arg(long, env = "DOCQA_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// DPI used to render pages for image QA (72–400).
    #[arg(long, env = "DOCQA_QA_DPI", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    qa_dpi: u32,

    /// Number of concurrent model calls.
    #[arg(short, long, env = "DOCQA_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Overall deadline in seconds; the best answer so far is used when it passes.
    #[arg(long, env = "DOCQA_TIMEOUT")]
    timeout: Option<u64>,

    /// Timeout for a single model call in seconds.
    #[arg(long, env = "DOCQA_CALL_TIMEOUT", default_value_t = 60)]
    call_timeout: u64,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCQA_PASSWORD")]
    password: Option<String>,

    /// Output a JSON report instead of plain text.
    #[arg(long, env = "DOCQA_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOCQA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCQA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the answer and errors.
    #[arg(short, long, env = "DOCQA_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    question: &'a str,
    answer: &'a str,
    span: Option<&'a str>,
    /// 1-based.
    page: Option<usize>,
    bbox: Option<BBox>,
    output_dir: Option<String>,
    stats: Option<&'a ExtractionStats>,
}

impl<'a> JsonReport<'a> {
    fn new(cli: &'a Cli, result: Option<&'a AnswerResult>) -> Self {
        Self {
            question: &cli.question,
            answer: result.map(|r| r.answer.as_str()).unwrap_or(NO_ANSWER),
            span: result.map(|r| r.span.as_str()),
            page: result.map(|r| r.page_index + 1),
            bbox: result.map(|r| r.bbox),
            output_dir: result
                .and(cli.output.as_ref())
                .map(|p| p.display().to_string()),
            stats: result.map(|r| &r.stats),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides all the feedback that matters; keep library logs
    // at ERROR while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let qa = DocumentQa::from_config(config).context("Failed to set up model provider")?;

    let options = AnswerOptions::new()
        .force_code(cli.force_code)
        .simplify_layman(cli.simplify);

    // ── Answer ───────────────────────────────────────────────────────────
    let result = match cli.output {
        Some(ref dir) => qa.answer_to_dir(&cli.pdf, &cli.question, options, dir).await,
        None => qa.answer(&cli.pdf, &cli.question, options).await,
    }
    .context("Question answering failed")?;

    if cli.json {
        let report = JsonReport::new(&cli, result.as_ref());
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }

    match result {
        Some(ref r) => {
            println!("{}", r.answer);
            if !cli.quiet {
                eprintln!(
                    "{} page {}  {}  {}",
                    green("✔"),
                    bold(&(r.page_index + 1).to_string()),
                    dim(&format!("via {}", r.stats.strategy.map(|s| s.to_string()).unwrap_or_default())),
                    dim(&format!("{}ms", r.stats.duration_ms)),
                );
                if let Some(ref dir) = cli.output {
                    eprintln!("   {} pages  →  {}", r.pages.len(), bold(&dir.display().to_string()));
                }
            }
        }
        None => println!("{NO_ANSWER}"),
    }

    Ok(())
}

/// Map CLI args to `QaConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<QaConfig> {
    let mut builder = QaConfig::builder()
        .display_dpi(cli.dpi)
        .qa_dpi(cli.qa_dpi)
        .concurrency(cli.concurrency)
        .call_timeout_secs(cli.call_timeout);

    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_the_callback_clears_the_spinner() {
        let cb = CliProgressCallback::new();
        let bar = cb.bar.clone();
        assert!(!bar.is_finished());
        drop(cb);
        assert!(bar.is_finished());
    }

    #[test]
    fn cli_flags_map_to_config() {
        let cli = Cli::parse_from(["docqa", "a.pdf", "What?", "--qa-dpi", "120", "-c", "2", "--timeout", "30"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.qa_dpi, 120);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    }
}
