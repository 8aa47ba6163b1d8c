//! HTTP surface: Analyze and Download.
//!
//! | Route | Method | Body | Success |
//! |-------|--------|------|---------|
//! | `/api/analyze`, `/analyze` | POST | multipart, field `image` | `200` JSON envelope |
//! | `/api/download`, `/download` | POST | JSON envelope | `200` PDF attachment |
//! | `/` | GET | – | upload page |
//! | `/health` | GET | – | `ok` |
//!
//! Any other method on the two operations answers `405` before the body is
//! read, so it never reaches inference or report compilation. Every failure
//! is a JSON object with an `error` field.

use crate::analyze::analyze;
use crate::backend::InferenceBackend;
use crate::config::ServiceConfig;
use crate::envelope::AnalysisEnvelope;
use crate::error::RxScribeError;
use crate::pipeline::ingest;
use crate::report::{compile_report, report_filename};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use chrono::{Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

const INDEX_HTML: &str = include_str!("index.html");

/// Shared, read-only state handed to every request.
pub struct AppState {
    pub config: ServiceConfig,
    pub backend: Arc<dyn InferenceBackend>,
}

impl AppState {
    pub fn new(config: ServiceConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        Self { config, backend }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// [`RxScribeError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RxScribeError);

impl From<RxScribeError> for ApiError {
    fn from(e: RxScribeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self.0);
        } else {
            warn!(status = status.as_u16(), "{}", self.0);
        }

        let body = match self.0 {
            RxScribeError::ReportFailed(details) => ErrorBody {
                error: "PDF generation failed".into(),
                details: Some(details),
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router. Body limits come from `state.config`.
pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    let report_limit = state.config.max_report_body_bytes;
    let analyze_route = || -> MethodRouter<Arc<AppState>> {
        post(analyze_handler)
            .fallback(method_not_allowed)
            .layer(DefaultBodyLimit::max(upload_limit))
    };
    let download_route = || -> MethodRouter<Arc<AppState>> {
        post(download_handler)
            .fallback(method_not_allowed)
            .layer(DefaultBodyLimit::max(report_limit))
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "ok" }))
        .route("/api/analyze", analyze_route())
        .route("/analyze", analyze_route())
        .route("/api/download", download_route())
        .route("/download", download_route())
        .fallback(not_found)
        .with_state(state)
}

/// Bind `config.bind_addr` and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig, backend: Arc<dyn InferenceBackend>) -> Result<(), RxScribeError> {
    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RxScribeError::Internal(format!("Failed to bind {addr}: {e}")))?;

    info!(addr = %addr, backend = backend.name(), "rxscribe listening");
    let app = router(Arc::new(AppState::new(config, backend)));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(|e| RxScribeError::Internal(format!("Server error: {e}")))
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisEnvelope>, ApiError> {
    let multipart = multipart.map_err(|e| RxScribeError::Transport(e.body_text()))?;
    let image = ingest::from_multipart(multipart).await?;
    let envelope = analyze(state.backend.as_ref(), image, &state.config).await?;
    Ok(Json(envelope))
}

async fn download_handler(body: Result<Json<AnalysisEnvelope>, JsonRejection>) -> Result<Response, ApiError> {
    let Json(envelope) = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RxScribeError::PayloadTooLarge
        } else {
            RxScribeError::InvalidRequestBody(e.body_text())
        }
    })?;

    let report = compile_report(envelope, Local::now().date_naive())
        .await
        .map_err(|e| match e {
            RxScribeError::Internal(details) => RxScribeError::ReportFailed(details),
            other => other,
        })?;

    let filename = report_filename(Utc::now());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        report.into_bytes(),
    )
        .into_response())
}

async fn method_not_allowed() -> impl IntoResponse {
    ([(header::ALLOW, "POST")], ApiError(RxScribeError::MethodNotAllowed))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Not found".into(),
            details: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::UploadedImage;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const BOUNDARY: &str = "rxscribe-test-boundary";
    const ANALYSIS: &str = "Medicine Name: Paracetamol\nDosage: 500mg twice daily\nPurpose: Fever\n";

    struct CountingBackend {
        reply: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn infer(&self, _prompt: &str, _image: &UploadedImage) -> Result<String, RxScribeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .map_err(|m| RxScribeError::InferenceFailed { message: m.into() })
        }
    }

    fn app_with(reply: Result<&'static str, &'static str>) -> (Router, Arc<CountingBackend>) {
        let backend = Arc::new(CountingBackend {
            reply,
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(ServiceConfig::default(), backend.clone());
        (router(Arc::new(state)), backend)
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(40, 20, image::Rgb([10, 120, 200]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn multipart_request(uri: &str, field: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"rx.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn analyze_returns_envelope_with_round_trip_image() {
        let (app, backend) = app_with(Ok(ANALYSIS));
        let bytes = jpeg_bytes();

        let response = app
            .oneshot(multipart_request("/api/analyze", "image", "image/jpeg", &bytes))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["result"], ANALYSIS);
        let image = json["image"].as_str().unwrap();
        let payload = image.strip_prefix("data:image/jpeg;base64,").unwrap();
        assert_eq!(STANDARD.decode(payload).unwrap(), bytes);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn content_type_parameters_stay_out_of_the_envelope() {
        let (app, _) = app_with(Ok(ANALYSIS));
        let response = app
            .clone()
            .oneshot(multipart_request(
                "/api/analyze",
                "image",
                "image/jpeg; name=rx.jpg",
                &jpeg_bytes(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let envelope = body_json(response).await;
        assert!(envelope["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));

        let response = app
            .oneshot(json_request("/api/download", envelope))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn analyze_without_image_field_is_400() {
        let (app, backend) = app_with(Ok(ANALYSIS));
        let response = app
            .oneshot(multipart_request("/api/analyze", "photo", "image/jpeg", &jpeg_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No prescription image uploaded");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analyze_rejects_non_image_upload() {
        let (app, backend) = app_with(Ok(ANALYSIS));
        let response = app
            .oneshot(multipart_request("/analyze", "image", "text/plain", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inference_failure_is_500_with_message() {
        let (app, _) = app_with(Err("RESOURCE_EXHAUSTED: quota exceeded"));
        let response = app
            .oneshot(multipart_request("/api/analyze", "image", "image/jpeg", &jpeg_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn analyze_without_multipart_body_is_transport_error() {
        let (app, backend) = app_with(Ok(ANALYSIS));
        let response = app
            .oneshot(json_request("/api/analyze", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"].is_string());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_post_is_405_without_side_effects() {
        for uri in ["/api/analyze", "/api/download", "/analyze", "/download"] {
            let (app, backend) = app_with(Ok(ANALYSIS));
            let response = app
                .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{uri}");
            assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST");
            assert_eq!(body_json(response).await["error"], "Method not allowed");
            assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn download_returns_pdf_attachment() {
        let (app, _) = app_with(Ok(ANALYSIS));
        let image = format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg_bytes()));
        let response = app
            .oneshot(json_request(
                "/api/download",
                serde_json::json!({ "result": ANALYSIS, "image": image }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/pdf"
        );
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=prescription_report_"));
        assert!(disposition.ends_with(".pdf"));
        assert!(body_bytes(response).await.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn download_with_corrupt_image_still_succeeds() {
        let (app, _) = app_with(Ok(ANALYSIS));
        let response = app
            .oneshot(json_request(
                "/download",
                serde_json::json!({ "result": ANALYSIS, "image": "data:image/png;base64,AAAA" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn download_with_empty_envelope_is_400() {
        let (app, _) = app_with(Ok(ANALYSIS));
        let response = app
            .oneshot(json_request("/api/download", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("Nothing to render"));
    }

    #[tokio::test]
    async fn download_with_malformed_json_is_400() {
        let (app, _) = app_with(Ok(ANALYSIS));
        let request = Request::builder()
            .method("POST")
            .uri("/api/download")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_body_limit_is_enforced() {
        let backend = Arc::new(CountingBackend {
            reply: Ok(ANALYSIS),
            calls: AtomicUsize::new(0),
        });
        let config = ServiceConfig::builder()
            .max_report_body_bytes(64)
            .build()
            .unwrap();
        let app = router(Arc::new(AppState::new(config, backend)));

        let response = app
            .oneshot(json_request(
                "/api/download",
                serde_json::json!({ "result": "x".repeat(1024) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn report_failure_body_carries_details() {
        let response =
            ApiError(RxScribeError::ReportFailed("save error: disk full".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "PDF generation failed");
        assert_eq!(json["details"], "save error: disk full");
    }

    #[tokio::test]
    async fn index_and_health_are_served() {
        let (app, _) = app_with(Ok(ANALYSIS));
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("/api/analyze"));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_bytes(response).await, b"ok");
    }
}
