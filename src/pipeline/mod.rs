//! Pipeline stages for prescription analysis and reporting.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without a model or a network.
//!
//! ## Data Flow
//!
//! ```text
//! ingest ──▶ encode ──▶ infer ──▶ postprocess        (Analyze)
//! (upload)   (base64)   (VLM)     (cleanup)
//!
//! envelope ──▶ encode::decode_data_uri ──▶ report    (Download)
//!              (data URI → bytes)          (printpdf)
//! ```
//!
//! 1. [`ingest`]: read the multipart `image` field, a local file or a URL,
//!    and settle the media type
//! 2. [`encode`]: base64-wrap the upload for the multimodal request and for
//!    the envelope's data URI; also the reverse, for reports
//! 3. [`infer`]: one time-bounded VLM call; the only stage with network I/O
//! 4. [`postprocess`]: deterministic cleanup so the transcription reads as
//!    plain text
//! 5. [`report`]: lay out the summary and image pages; CPU-bound, so callers
//!    run it under `spawn_blocking`

pub mod encode;
pub mod infer;
pub mod ingest;
pub mod postprocess;
pub mod report;
