//! Inference stage: prompt + image → normalised transcription.
//!
//! Prompt text lives in [`crate::prompts`] and provider wiring in
//! [`crate::backend`]. This stage owns the call policy.
//!
//! ## Call Policy
//!
//! One attempt, bounded by `inference_timeout_secs`. A failed or timed-out
//! call is terminal for the request; resubmitting is the caller's decision.

use crate::backend::InferenceBackend;
use crate::config::ServiceConfig;
use crate::envelope::UploadedImage;
use crate::error::RxScribeError;
use crate::pipeline::postprocess;
use crate::prompts::effective_prompt;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Transcribe one prescription image.
///
/// # Errors
/// - [`RxScribeError::InferenceTimeout`]: no answer within the bound.
/// - [`RxScribeError::InferenceFailed`]: the backend failed, or its answer
///   was empty after normalisation.
pub async fn transcribe(
    backend: &dyn InferenceBackend,
    image: &UploadedImage,
    config: &ServiceConfig,
) -> Result<String, RxScribeError> {
    let start = Instant::now();
    let prompt = effective_prompt(config.system_prompt.as_deref());
    let limit = Duration::from_secs(config.inference_timeout_secs);

    let raw = match timeout(limit, backend.infer(prompt, image)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!("{}: inference failed after {:?}: {}", backend.name(), start.elapsed(), e);
            return Err(e);
        }
        Err(_) => {
            warn!(
                "{}: inference timed out after {}s",
                backend.name(),
                config.inference_timeout_secs
            );
            return Err(RxScribeError::InferenceTimeout {
                secs: config.inference_timeout_secs,
            });
        }
    };

    let text = postprocess::normalise_transcription(&raw);
    if text.is_empty() {
        return Err(RxScribeError::InferenceFailed {
            message: "model returned an empty response".into(),
        });
    }

    debug!(
        "{}: {} chars raw → {} chars normalised in {:?}",
        backend.name(),
        raw.len(),
        text.len(),
        start.elapsed()
    );
    Ok(text)
}
