//! # rxscribe
//!
//! Read handwritten prescriptions with Vision Language Models (VLMs) and turn
//! the result into a printable PDF report.
//!
//! ## Why this crate?
//!
//! Classic OCR engines are trained on print and give up on a doctor's
//! handwriting. A VLM reads the photo the way a pharmacist would, correcting
//! obvious misspellings of drug names and saying so when something is not
//! legible. This crate wraps that call in a two-stage service:
//!
//! 1. **Analyze**: an uploaded image becomes an [`AnalysisEnvelope`] holding
//!    the plain-text transcription and the image itself as a data URI.
//! 2. **Download**: the envelope, handed back unchanged, becomes a one- or
//!    two-page PDF. The service keeps no state between the two.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image upload
//!  │
//!  ├─ 1. Ingest   multipart field `image`, local path or URL; media type sniffed
//!  ├─ 2. Encode   bytes → base64 ImageData (and the data URI for the envelope)
//!  ├─ 3. Infer    one VLM call with the fixed prescription prompt, time-bounded
//!  ├─ 4. Polish   strip fences and Markdown, normalise whitespace
//!  └─ 5. Report   envelope → PDF (summary page + optional image page)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Local;
//! use rxscribe::{analyze, compile_report, resolve_backend, ServiceConfig, UploadedImage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY (or RXSCRIBE_PROVIDER / RXSCRIBE_MODEL)
//!     let config = ServiceConfig::default();
//!     let backend = resolve_backend(&config)?;
//!
//!     let image = UploadedImage::new(std::fs::read("prescription.jpg")?, "image/jpeg")?;
//!     let envelope = analyze(backend.as_ref(), image, &config).await?;
//!     println!("{}", envelope.text().unwrap_or_default());
//!
//!     let report = compile_report(envelope, Local::now().date_naive()).await?;
//!     std::fs::write("report.pdf", report.bytes())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rxscribe` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding only the library or the [`router`]:
//! ```toml
//! rxscribe = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod backend;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::analyze;
pub use backend::{resolve_backend, InferenceBackend, LlmBackend};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use envelope::{AnalysisEnvelope, UploadedImage};
pub use error::{AttachmentError, RxScribeError};
pub use report::{compile_report, compile_report_blocking, report_filename, CompiledReport};
pub use server::{router, serve, AppState};
