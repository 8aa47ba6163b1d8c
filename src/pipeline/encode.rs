//! Image encoding: raw upload bytes ⇄ base64.
//!
//! The same base64 payload travels two ways. Towards the VLM it is wrapped in
//! an [`ImageData`] attachment; towards the client it becomes a
//! `data:<media_type>;base64,...` URI that the Download request hands back.
//! Both use the padded STANDARD alphabet, so decoding the URI payload yields
//! the uploaded bytes unchanged.

use crate::envelope::UploadedImage;
use crate::error::AttachmentError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Wrap an upload as a VLM image attachment.
///
/// `detail: "high"` keeps fine handwriting legible on providers that tile
/// images (OpenAI); others ignore it.
pub fn to_image_data(image: &UploadedImage) -> ImageData {
    let b64 = STANDARD.encode(image.bytes());
    debug!("Encoded {} → {} bytes base64", image.media_type(), b64.len());
    ImageData::new(b64, image.media_type()).with_detail("high")
}

/// `data:<media_type>;base64,<payload>`.
pub fn to_data_uri(image: &UploadedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.media_type(),
        STANDARD.encode(image.bytes())
    )
}

static RE_IMAGE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,").unwrap());

/// An image recovered from a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Strip `data:image/<subtype>;base64,` and decode the remainder.
pub fn decode_data_uri(uri: &str) -> Result<DecodedAttachment, AttachmentError> {
    let caps = RE_IMAGE_DATA_URI
        .captures(uri)
        .ok_or_else(|| AttachmentError::MissingPrefix {
            prefix: uri.chars().take(32).collect(),
        })?;
    let prefix_len = caps[0].len();
    let media_type = caps[1].to_string();

    let payload = uri[prefix_len..].trim();
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| AttachmentError::InvalidBase64 {
            detail: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(AttachmentError::InvalidBase64 {
            detail: "empty payload".into(),
        });
    }

    Ok(DecodedAttachment { media_type, bytes })
}
