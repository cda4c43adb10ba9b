//! CLI binary for invoice2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, drives a batch, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoice2json::{
    collect_inputs, extract_batch, inspect, BatchProgressCallback, ExtractionConfig,
    ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

/// Terminal progress callback: renders a live progress bar and per-document
/// log lines using [indicatif]. Documents complete out-of-order when the
/// batch runs concurrently; each log line carries its own elapsed time.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, name: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(name)
            .map(|t| t.elapsed().as_millis() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} invoices  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_documents as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }

    fn on_document_start(&self, name: &str, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(name.to_string(), Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, name: &str, _total: usize) {
        let elapsed = self.elapsed_secs(name);
        self.bar.println(format!(
            "  {} {:<40} {}",
            green("✓"),
            name,
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, name: &str, _total: usize, error: &str) {
        let elapsed = self.elapsed_secs(name);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        let msg = msg.replace('\n', " ");

        self.bar.println(format!(
            "  {} {:<40} {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let failed = total_documents.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} invoices extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} invoices extracted  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one invoice → invoice1.json next to it
  invoice2json invoice1.pdf

  # Batch over a folder of scans, outputs to ./extracted/
  invoice2json ./inbox -o ./extracted

  # Use a specific provider and model
  invoice2json --provider anthropic --model claude-sonnet-4-20250514 invoice1.pdf

  # Skip the VAT registry lookup
  invoice2json --no-vat-check invoice1.pdf

  # Machine-readable batch summary on stdout
  invoice2json --json ./inbox > summary.json

  # Page count and kind only, no API key needed
  invoice2json --inspect-only invoice1.pdf

SUPPORTED PROVIDERS & DEFAULT MODELS:
  Provider     Default model                                 Key env var
  ─────────    ────────────────────────────────────────────  ─────────────────
  anthropic    claude-3-5-haiku-20241022                     ANTHROPIC_API_KEY
  groq         meta-llama/llama-4-maverick-17b-128e-instruct GROQ_API_KEY
  openai       gpt-4o-mini                                   OPENAI_API_KEY

OUTPUT:
  One <stem>.json per input document with the extracted fields (issuer,
  vat_id, invoice_number, issue_date, due_date, tax_date, per-rate VAT
  summary, total, currency, line_items) plus vat_status when the registry
  lookup ran. Fields the model could not read are omitted, not invented.

VAT REGISTRY:
  Czech VAT identifiers (CZ + 8-10 digits) are checked against the Ministry
  of Finance unreliable-payer register. The lookup is best-effort: if the
  service is unreachable the output carries "vat_status": "unavailable" and
  extraction still succeeds.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key
  GROQ_API_KEY            Groq API key
  OPENAI_API_KEY          OpenAI API key
  INVOICE2JSON_PROVIDER   Override provider (anthropic, groq, openai)
  INVOICE2JSON_MODEL      Override model ID

SETUP:
  1. Set an API key:  export ANTHROPIC_API_KEY=sk-ant-...
  2. Extract:         invoice2json invoice1.pdf

  PDF rendering uses the pdfium shared library; install it via your package
  manager or point PDFIUM_DYNAMIC_LIB_PATH at an existing copy.
"#;

/// Extract structured data from invoice PDFs and images using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2json",
    version,
    about = "Extract structured data from invoice PDFs and images using Vision LLMs",
    long_about = "Extract structured invoice data (issuer, amounts, dates, VAT identifier, line \
items) from PDFs and scanned images using Vision Language Models, with an optional check of \
Czech VAT identifiers against the public unreliable-payer register.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Invoice files and/or directories to scan for them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for output JSON files (default: next to each source file).
    #[arg(short, long, env = "INVOICE2JSON_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Model ID (e.g. claude-3-5-haiku-20241022, gpt-4o-mini).
    #[arg(long, env = "INVOICE2JSON_MODEL")]
    model: Option<String>,

    /// Provider: anthropic, groq, openai.
    #[arg(
        long,
        env = "INVOICE2JSON_PROVIDER",
        long_help = "Vision provider. Auto-detected from API key env vars if not set.\n\
          Supported: anthropic, groq, openai."
    )]
    provider: Option<String>,

    /// Longest edge of the rendered page in pixels.
    #[arg(long, env = "INVOICE2JSON_MAX_PIXELS", default_value_t = 2048,
          value_parser = clap::value_parser!(u32).range(256..=8192))]
    max_pixels: u32,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "INVOICE2JSON_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "INVOICE2JSON_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max model output tokens per document.
    #[arg(long, env = "INVOICE2JSON_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Retries per document on a transient inference failure.
    #[arg(long, env = "INVOICE2JSON_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Skip the VAT registry lookup.
    #[arg(long, env = "INVOICE2JSON_NO_VAT_CHECK")]
    no_vat_check: bool,

    /// Override the VAT registry endpoint URL.
    #[arg(long, env = "INVOICE2JSON_REGISTRY_URL")]
    registry_url: Option<String>,

    /// VAT registry request timeout in seconds.
    #[arg(long, env = "INVOICE2JSON_REGISTRY_TIMEOUT", default_value_t = 10)]
    registry_timeout: u64,

    /// Per-document inference call timeout in seconds.
    #[arg(long, env = "INVOICE2JSON_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "INVOICE2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the structured batch summary as JSON on stdout.
    #[arg(long, env = "INVOICE2JSON_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "INVOICE2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Print document kind and page count only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    // ── Expand inputs ────────────────────────────────────────────────────
    let files = collect_inputs(&cli.inputs).context("Failed to scan inputs")?;
    if files.is_empty() {
        anyhow::bail!(
            "No supported invoice files found.\n\
             Supported formats: PDF, PNG, JPG, JPEG, GIF, WEBP"
        );
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for file in &files {
            let info = inspect(file)
                .await
                .with_context(|| format!("Failed to inspect {}", file.display()))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!(
                    "{}  kind={}  pages={}",
                    info.path.display(),
                    info.kind,
                    info.page_count
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress).await?;

    // ── Run the batch ────────────────────────────────────────────────────
    let output = extract_batch(&files, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !cli.quiet {
        if !show_progress {
            // The progress callback already printed the per-document log.
            for doc in &output.documents {
                match &doc.error {
                    None => eprintln!("{} → {}", doc.input.display(), describe_output(doc)),
                    Some(e) => eprintln!("{}: {}", doc.input.display(), e),
                }
            }
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total",
            dim(&output.stats.total_input_tokens.to_string()),
            dim(&output.stats.total_output_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }

    if output.stats.succeeded == 0 {
        anyhow::bail!("All {} documents failed", output.stats.total_documents);
    }

    Ok(())
}

fn describe_output(doc: &invoice2json::DocumentResult) -> String {
    match (&doc.output, &doc.record) {
        (Some(path), Some(record)) => format!(
            "{}  ({} {})",
            path.display(),
            record.total,
            record.currency.as_deref().unwrap_or("")
        ),
        _ => "ok".to_string(),
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {path:?}"))?,
        )
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .max_rendered_pixels(cli.max_pixels)
        .concurrency(cli.concurrency)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .validate_vat(!cli.no_vat_check)
        .registry_timeout_secs(cli.registry_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref url) = cli.registry_url {
        builder = builder.registry_url(url.as_str());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
