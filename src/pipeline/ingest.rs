//! Upload ingestion: turn an incoming image into an [`UploadedImage`].
//!
//! Two sources feed the pipeline. The HTTP service reads the single `image`
//! field of a multipart body; the CLI reads a local file or downloads a URL.
//! Both end in [`resolve_media_type`], so an upload is only accepted when it
//! is declared as, or sniffs as, an image.

use crate::envelope::UploadedImage;
use crate::error::RxScribeError;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Name of the multipart field carrying the prescription image.
pub const IMAGE_FIELD: &str = "image";

/// Read the `image` field from a multipart body.
///
/// Other fields are skipped. A second `image` field is ignored.
///
/// # Errors
/// - [`RxScribeError::Transport`]: the body could not be decoded; carries
///   the decoder's own message.
/// - [`RxScribeError::PayloadTooLarge`]: the body exceeded the upload limit.
/// - [`RxScribeError::NoImageProvided`]: no `image` field.
/// - [`RxScribeError::EmptyImage`]: the field had no bytes.
/// - [`RxScribeError::UnsupportedMediaType`]: not an image.
pub async fn from_multipart(mut multipart: Multipart) -> Result<UploadedImage, RxScribeError> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(transport_error)?
    {
        if field.name() != Some(IMAGE_FIELD) || upload.is_some() {
            continue;
        }
        let declared = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(transport_error)?;
        upload = Some((declared, bytes.to_vec()));
    }

    let (declared, bytes) = upload.ok_or(RxScribeError::NoImageProvided)?;
    if bytes.is_empty() {
        return Err(RxScribeError::EmptyImage);
    }
    let media_type = resolve_media_type(declared.as_deref(), &bytes)?;
    debug!("Received {} upload, {} bytes", media_type, bytes.len());
    UploadedImage::new(bytes, media_type)
}

/// Keep the decoder's message; only a blown body limit gets its own status.
fn transport_error(e: MultipartError) -> RxScribeError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RxScribeError::PayloadTooLarge
    } else {
        RxScribeError::Transport(e.body_text())
    }
}

/// Decide the media type of an upload.
///
/// A declared `image/<subtype>` is trusted (it is echoed back in the data
/// URI) once its parameters are stripped. Anything else, including a missing
/// or generic `application/octet-stream` declaration, is replaced by what the
/// bytes sniff as.
pub fn resolve_media_type(declared: Option<&str>, bytes: &[u8]) -> Result<String, RxScribeError> {
    if let Some(essence) = declared.and_then(image_essence) {
        return Ok(essence);
    }

    match image::guess_format(bytes) {
        Ok(format) => {
            let sniffed = format.to_mime_type();
            if declared.is_some() {
                debug!("Declared {:?}, sniffed {}", declared, sniffed);
            }
            Ok(sniffed.to_string())
        }
        Err(_) => {
            let media_type = declared.unwrap_or("unknown").to_string();
            warn!("Rejected upload with media type {}", media_type);
            Err(RxScribeError::UnsupportedMediaType { media_type })
        }
    }
}

/// `image/<subtype>` without parameters, lowercased; `None` unless the
/// subtype is a plain token.
fn image_essence(declared: &str) -> Option<String> {
    let essence = declared.split(';').next()?.trim().to_ascii_lowercase();
    let subtype = essence.strip_prefix("image/")?;
    let is_token = !subtype.is_empty()
        && subtype
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'-'));
    is_token.then_some(essence)
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a prescription image from a local path or an HTTP(S) URL.
pub async fn load_image(input: &str, timeout_secs: u64) -> Result<UploadedImage, RxScribeError> {
    if is_url(input) {
        download_image(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<UploadedImage, RxScribeError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| RxScribeError::ImageLoadFailed {
            path: path.clone(),
            source,
        })?;
    if bytes.is_empty() {
        return Err(RxScribeError::EmptyImage);
    }
    let media_type = resolve_media_type(None, &bytes)?;
    debug!("Loaded {} ({}, {} bytes)", path.display(), media_type, bytes.len());
    UploadedImage::new(bytes, media_type)
}

async fn download_image(url: &str, timeout_secs: u64) -> Result<UploadedImage, RxScribeError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RxScribeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            RxScribeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            RxScribeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(RxScribeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| RxScribeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(RxScribeError::EmptyImage);
    }

    let media_type = resolve_media_type(declared.as_deref(), &bytes)?;
    info!("Downloaded {} bytes ({})", bytes.len(), media_type);
    UploadedImage::new(bytes.to_vec(), media_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/rx.jpg"));
        assert!(is_url("http://example.com/rx.jpg"));
        assert!(!is_url("/tmp/rx.jpg"));
        assert!(!is_url("rx.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn declared_image_type_is_trusted() {
        let mt = resolve_media_type(Some("image/jpeg"), b"not really a jpeg").unwrap();
        assert_eq!(mt, "image/jpeg");
        let mt = resolve_media_type(Some("Image/PNG"), PNG_MAGIC).unwrap();
        assert_eq!(mt, "image/png");
    }

    #[test]
    fn declared_parameters_are_stripped() {
        let mt = resolve_media_type(Some("image/png; name=rx.png"), PNG_MAGIC).unwrap();
        assert_eq!(mt, "image/png");
        let mt = resolve_media_type(Some(" IMAGE/JPEG ;charset=binary"), b"jpeg").unwrap();
        assert_eq!(mt, "image/jpeg");
    }

    #[test]
    fn malformed_image_subtype_is_sniffed() {
        let mt = resolve_media_type(Some("image/"), PNG_MAGIC).unwrap();
        assert_eq!(mt, "image/png");
        let mt = resolve_media_type(Some("image/p ng"), PNG_MAGIC).unwrap();
        assert_eq!(mt, "image/png");
    }

    #[test]
    fn declared_parameters_never_reach_the_data_uri() {
        let mt = resolve_media_type(Some("image/png; name=rx.png"), PNG_MAGIC).unwrap();
        let image = UploadedImage::new(PNG_MAGIC.to_vec(), mt).unwrap();
        let decoded = crate::pipeline::encode::decode_data_uri(&image.to_data_uri()).unwrap();
        assert_eq!(decoded.media_type, "image/png");
        assert_eq!(decoded.bytes, PNG_MAGIC);
    }

    #[test]
    fn octet_stream_is_sniffed() {
        let mt = resolve_media_type(Some("application/octet-stream"), PNG_MAGIC).unwrap();
        assert_eq!(mt, "image/png");
        let mt = resolve_media_type(None, &[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        assert_eq!(mt, "image/jpeg");
    }

    #[test]
    fn non_image_is_rejected() {
        let err = resolve_media_type(Some("application/pdf"), b"%PDF-1.7").unwrap_err();
        match err {
            RxScribeError::UnsupportedMediaType { media_type } => {
                assert_eq!(media_type, "application/pdf")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn load_local_file_sniffs_type() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(PNG_MAGIC).unwrap();
        let img = load_image(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(img.media_type(), "image/png");
        assert_eq!(img.bytes(), PNG_MAGIC);
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let err = load_image("/definitely/not/a/real/rx.jpg", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RxScribeError::ImageLoadFailed { .. }));
    }

    #[tokio::test]
    async fn load_empty_file_fails() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = load_image(tmp.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, RxScribeError::EmptyImage));
    }
}
