//! Error types for the rxscribe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RxScribeError`]: **Fatal**: the request cannot be answered
//!   (no image uploaded, inference failed, nothing to render). Returned as
//!   `Err(RxScribeError)` from [`crate::analyze`] and [`crate::compile_report`],
//!   and mapped to an HTTP status by [`RxScribeError::status_code`].
//!
//! * [`AttachmentError`]: **Non-fatal**: the prescription image attached to a
//!   report could not be decoded. Stored in
//!   [`crate::report::CompiledReport::warnings`]; the report still completes
//!   with its text page so the transcription is never lost to a bad image.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the rxscribe library.
///
/// Image problems discovered while compiling a report use [`AttachmentError`]
/// and are recorded on the report rather than propagated here.
#[derive(Debug, Error)]
pub enum RxScribeError {
    // ── Request-shape errors ──────────────────────────────────────────────
    /// The operation was invoked with a method other than POST.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The multipart body carried no `image` file field.
    #[error("No prescription image uploaded")]
    NoImageProvided,

    /// The `image` field was present but empty.
    #[error("No prescription image uploaded (file is empty)")]
    EmptyImage,

    /// The upload is not an image.
    #[error("Unsupported media type '{media_type}': upload a JPEG, PNG, GIF, WebP, BMP or TIFF image")]
    UnsupportedMediaType { media_type: String },

    /// Multipart decoding failed at the transport layer. The message is
    /// passed through unmodified.
    #[error("{0}")]
    Transport(String),

    /// The request body exceeded the configured size limit.
    #[error("Request body too large")]
    PayloadTooLarge,

    /// A report request carried neither `result` nor `image`.
    #[error("Nothing to render: provide 'result', 'image', or both")]
    NothingToRender,

    /// The report request body was not valid JSON for an envelope.
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    // ── Inference errors ──────────────────────────────────────────────────
    /// The inference backend failed or returned nothing usable.
    #[error("Inference failed: {message}")]
    InferenceFailed { message: String },

    /// The inference call did not resolve within the configured bound.
    #[error("Inference timed out after {secs}s")]
    InferenceTimeout { secs: u64 },

    /// The configured provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── CLI input errors ──────────────────────────────────────────────────
    /// A local prescription image could not be read.
    #[error("Failed to read image '{path}': {source}")]
    ImageLoadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Report errors ─────────────────────────────────────────────────────
    /// The PDF could not be assembled or serialised.
    #[error("PDF generation failed: {0}")]
    ReportFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RxScribeError {
    /// HTTP status the service answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RxScribeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RxScribeError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RxScribeError::NoImageProvided
            | RxScribeError::EmptyImage
            | RxScribeError::UnsupportedMediaType { .. }
            | RxScribeError::NothingToRender
            | RxScribeError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A non-fatal problem with the image embedded in a report envelope.
///
/// The report drops its image page and keeps the text page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum AttachmentError {
    /// The string does not start with `data:image/<subtype>;base64,`.
    #[error("image is not a base64 image data URI (starts with {prefix:?})")]
    MissingPrefix { prefix: String },

    /// The payload after the prefix is not valid base64.
    #[error("image payload is not valid base64: {detail}")]
    InvalidBase64 { detail: String },

    /// The bytes decoded but are not a readable image.
    #[error("image payload could not be decoded as {media_type}: {detail}")]
    UndecodableImage { media_type: String, detail: String },
}
