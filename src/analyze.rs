//! Analysis entry point: uploaded image → [`AnalysisEnvelope`].
//!
//! This is the first of the two stages. It runs one inference call and pairs
//! the normalised transcription with the original image as a data URI, so the
//! second stage ([`crate::compile_report`]) never needs the upload again.

use crate::backend::InferenceBackend;
use crate::config::ServiceConfig;
use crate::envelope::{AnalysisEnvelope, UploadedImage};
use crate::error::RxScribeError;
use crate::pipeline::infer;
use std::time::Instant;
use tracing::info;

/// Transcribe a prescription image.
///
/// # Example
/// ```rust,no_run
/// use rxscribe::{analyze, resolve_backend, ServiceConfig, UploadedImage};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServiceConfig::default();
/// let backend = resolve_backend(&config)?;
/// let image = UploadedImage::new(std::fs::read("rx.jpg")?, "image/jpeg")?;
/// let envelope = analyze(backend.as_ref(), image, &config).await?;
/// println!("{}", envelope.text().unwrap_or_default());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns inference errors unchanged: [`RxScribeError::InferenceFailed`] or
/// [`RxScribeError::InferenceTimeout`]. There is no retry.
pub async fn analyze(
    backend: &dyn InferenceBackend,
    image: UploadedImage,
    config: &ServiceConfig,
) -> Result<AnalysisEnvelope, RxScribeError> {
    let start = Instant::now();
    info!(
        "Analyzing {} image ({} bytes) with {}",
        image.media_type(),
        image.len(),
        backend.name()
    );

    let text = infer::transcribe(backend, &image, config).await?;
    let envelope = AnalysisEnvelope::from_analysis(text, &image);

    info!("Analysis complete in {}ms", start.elapsed().as_millis());
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::decode_data_uri;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl InferenceBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn infer(&self, _prompt: &str, _image: &UploadedImage) -> Result<String, RxScribeError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn envelope_round_trips_original_bytes() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4099).collect();
        let image = UploadedImage::new(bytes.clone(), "image/webp").unwrap();

        let env = analyze(&Fixed("Medicine Name: Paracetamol"), image, &ServiceConfig::default())
            .await
            .unwrap();

        assert_eq!(env.text(), Some("Medicine Name: Paracetamol\n"));
        let uri = env.image_data_uri().unwrap();
        assert!(uri.starts_with("data:image/webp;base64,"));
        assert_eq!(decode_data_uri(uri).unwrap().bytes, bytes);
    }
}
