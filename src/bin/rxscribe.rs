//! CLI binary for rxscribe.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig` and either runs the HTTP service or performs one
//! analysis / report locally.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rxscribe::pipeline::ingest;
use rxscribe::{
    analyze, compile_report, resolve_backend, serve, AnalysisEnvelope, ServiceConfig,
};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on the default address (0.0.0.0:3000)
  rxscribe serve

  # Transcribe one prescription photo
  rxscribe analyze prescription.jpg

  # Same, as the JSON envelope the service returns
  rxscribe analyze prescription.jpg --json > analysis.json

  # Turn a saved envelope into a PDF report
  rxscribe report analysis.json -o report.pdf

  # Analyze an image from a URL with a different provider
  rxscribe --provider openai --model gpt-4.1-mini analyze https://example.com/rx.png

HTTP API (rxscribe serve):
  POST /api/analyze    multipart/form-data, file field "image"  → {"result", "image"}
  POST /api/download   application/json {"result", "image"}     → application/pdf
  GET  /               upload page
  GET  /health         liveness probe

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY       Google Gemini API key (default provider)
  OPENAI_API_KEY       OpenAI API key
  ANTHROPIC_API_KEY    Anthropic API key
  RXSCRIBE_PROVIDER    Override provider (gemini, openai, anthropic, ollama)
  RXSCRIBE_MODEL       Override model ID (default: per provider, gemini-2.5-flash)
  RUST_LOG             Override the log filter (e.g. rxscribe=debug)
"#;

/// Transcribe handwritten prescriptions with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "rxscribe",
    version,
    about = "Transcribe handwritten prescriptions with Vision LLMs and build PDF reports",
    long_about = "Read photos of handwritten prescriptions with a Vision Language Model, \
listing each medicine with its dosage and purpose, and compile the result into a PDF report. \
Runs as an HTTP service or as a one-shot command.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    model: ModelArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RXSCRIBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RXSCRIBE_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(
        long,
        global = true,
        env = "RXSCRIBE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: gemini (default), openai, anthropic, azure, ollama."
    )]
    provider: Option<String>,

    /// Vision model ID (default depends on the provider; gemini-2.5-flash for gemini).
    #[arg(long, global = true, env = "RXSCRIBE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "RXSCRIBE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max tokens the model may generate.
    #[arg(long, global = true, env = "RXSCRIBE_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Inference timeout in seconds.
    #[arg(long, global = true, env = "RXSCRIBE_INFERENCE_TIMEOUT", default_value_t = 60)]
    inference_timeout: u64,

    /// Path to a text file replacing the built-in prescription prompt.
    #[arg(long, global = true, env = "RXSCRIBE_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "RXSCRIBE_BIND", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,

        /// Maximum Analyze upload size in bytes.
        #[arg(long, env = "RXSCRIBE_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
        max_upload_bytes: usize,

        /// Maximum Download request body in bytes.
        #[arg(long, env = "RXSCRIBE_MAX_REPORT_BODY_BYTES", default_value_t = 25 * 1024 * 1024)]
        max_report_body_bytes: usize,
    },

    /// Transcribe one prescription image (local path or HTTP/HTTPS URL).
    Analyze {
        /// Image file path or URL.
        input: String,

        /// Print the JSON envelope instead of the plain transcription.
        #[arg(long)]
        json: bool,

        /// URL download timeout in seconds.
        #[arg(long, env = "RXSCRIBE_DOWNLOAD_TIMEOUT", default_value_t = 60)]
        download_timeout: u64,
    },

    /// Compile a PDF report from a saved JSON envelope.
    Report {
        /// JSON file with `result` and/or `image` (as printed by `analyze --json`).
        envelope: PathBuf,

        /// Where to write the PDF.
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers one-shot analysis; the server logs at INFO.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        match cli.command {
            Command::Serve { .. } => "info",
            _ => "warn",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve {
            bind,
            max_upload_bytes,
            max_report_body_bytes,
        } => {
            let config = build_config(&cli.model)
                .await?
                .bind_addr(bind)
                .max_upload_bytes(max_upload_bytes)
                .max_report_body_bytes(max_report_body_bytes)
                .build()
                .context("Invalid configuration")?;
            let backend = resolve_backend(&config).context("Failed to set up the LLM provider")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} on {}",
                    cyan("◆"),
                    bold("rxscribe listening"),
                    bold(&format!("http://{bind}"))
                );
            }
            serve(config, backend).await.context("Server failed")?;
        }

        Command::Analyze {
            input,
            json,
            download_timeout,
        } => {
            let config = build_config(&cli.model)
                .await?
                .download_timeout_secs(download_timeout)
                .build()
                .context("Invalid configuration")?;
            let backend = resolve_backend(&config).context("Failed to set up the LLM provider")?;

            let spinner = (!cli.quiet).then(|| spinner("Reading prescription…"));
            let start = Instant::now();

            let image = ingest::load_image(&input, config.download_timeout_secs)
                .await
                .with_context(|| format!("Failed to load {input}"))?;
            let envelope = analyze(backend.as_ref(), image, &config)
                .await
                .context("Analysis failed")?;

            if let Some(bar) = spinner {
                bar.finish_and_clear();
                eprintln!(
                    "{} Analyzed with {}  {}",
                    green("✔"),
                    backend.name(),
                    dim(&format!("{:.1}s", start.elapsed().as_secs_f64()))
                );
            }

            let stdout = io::stdout();
            let mut handle = stdout.lock();
            if json {
                let out =
                    serde_json::to_string_pretty(&envelope).context("Failed to serialise output")?;
                writeln!(handle, "{out}").context("Failed to write to stdout")?;
            } else {
                handle
                    .write_all(envelope.text().unwrap_or_default().as_bytes())
                    .context("Failed to write to stdout")?;
            }
        }

        Command::Report { envelope, output } => {
            let raw = tokio::fs::read_to_string(&envelope)
                .await
                .with_context(|| format!("Failed to read {}", envelope.display()))?;
            let parsed: AnalysisEnvelope = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a valid envelope", envelope.display()))?;

            let report = compile_report(parsed, Local::now().date_naive())
                .await
                .context("Report generation failed")?;
            tokio::fs::write(&output, report.bytes())
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;

            if !cli.quiet {
                for warning in report.warnings() {
                    eprintln!("{} image page skipped: {}", cyan("⚠"), warning);
                }
                eprintln!(
                    "{}  {} page(s)  →  {}",
                    green("✔"),
                    report.page_count(),
                    bold(&output.display().to_string())
                );
            }
        }
    }

    Ok(())
}

/// Map shared model flags onto a `ServiceConfig` builder.
async fn build_config(args: &ModelArgs) -> Result<rxscribe::ServiceConfigBuilder> {
    let mut builder = ServiceConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .inference_timeout_secs(args.inference_timeout);

    if let Some(ref name) = args.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref path) = args.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    Ok(builder)
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Analyzing");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
