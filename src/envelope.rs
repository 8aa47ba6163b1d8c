//! Data carried between the two pipeline stages.
//!
//! [`UploadedImage`] lives for one Analyze request. [`AnalysisEnvelope`] is
//! what Analyze returns and what Download later accepts; the service keeps no
//! copy, so the client carries it from one request to the next.

use crate::error::RxScribeError;
use crate::pipeline::encode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A prescription image as received from the transport layer.
///
/// Construction fails on an empty payload, so every value of this type holds
/// at least one byte.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    media_type: String,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Result<Self, RxScribeError> {
        if bytes.is_empty() {
            return Err(RxScribeError::EmptyImage);
        }
        Ok(Self {
            bytes,
            media_type: media_type.into(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Declared MIME type, e.g. `image/jpeg`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<media_type>;base64,<payload>` for re-embedding in a report.
    pub fn to_data_uri(&self) -> String {
        encode::to_data_uri(self)
    }
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Transcription plus the original image, as exchanged over HTTP.
///
/// Serialises as `{ "result": ..., "image": ... }`. On the Download side both
/// fields are optional and an empty string counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEnvelope {
    /// Free-form transcription. Never validated against a schema.
    #[serde(rename = "result", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// `data:image/<subtype>;base64,<payload>`.
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub image_data_uri: Option<String>,
}

impl AnalysisEnvelope {
    /// Envelope produced by a successful analysis.
    pub fn from_analysis(text: String, image: &UploadedImage) -> Self {
        Self {
            text: Some(text),
            image_data_uri: Some(image.to_data_uri()),
        }
    }

    /// Transcription, if present and non-blank.
    pub fn text(&self) -> Option<&str> {
        non_blank(self.text.as_deref())
    }

    /// Data URI, if present and non-blank.
    pub fn image_data_uri(&self) -> Option<&str> {
        non_blank(self.image_data_uri.as_deref())
    }

    /// True when there is nothing a report could show.
    pub fn is_empty(&self) -> bool {
        self.text().is_none() && self.image_data_uri().is_none()
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_upload_is_rejected() {
        let err = UploadedImage::new(Vec::new(), "image/png").unwrap_err();
        assert!(matches!(err, RxScribeError::EmptyImage));
    }

    #[test]
    fn envelope_uses_wire_field_names() {
        let img = UploadedImage::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg").unwrap();
        let env = AnalysisEnvelope::from_analysis("Medicine Name: X\n".into(), &img);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["result"], "Medicine Name: X\n");
        assert_eq!(json["image"], "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let env: AnalysisEnvelope = serde_json::from_str("{}").unwrap();
        assert!(env.is_empty());

        let env: AnalysisEnvelope = serde_json::from_str(r#"{"result": "Dosage: 5mg"}"#).unwrap();
        assert_eq!(env.text(), Some("Dosage: 5mg"));
        assert!(env.image_data_uri().is_none());
        assert!(!env.is_empty());
    }

    #[test]
    fn blank_strings_count_as_absent() {
        let env = AnalysisEnvelope {
            text: Some("  \n".into()),
            image_data_uri: Some(String::new()),
        };
        assert!(env.is_empty());
    }

    #[test]
    fn debug_does_not_dump_bytes() {
        let img = UploadedImage::new(vec![1, 2, 3], "image/png").unwrap();
        assert_eq!(
            format!("{img:?}"),
            r#"UploadedImage { media_type: "image/png", len: 3 }"#
        );
    }
}
