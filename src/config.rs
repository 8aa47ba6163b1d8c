//! Service configuration.
//!
//! Everything the pipeline needs to know about its environment lives in
//! [`ServiceConfig`]: where to listen, how large bodies may be, which model to
//! call and how long to wait for it. It is built once at startup (by the
//! binary, from CLI flags and `RXSCRIBE_*` variables) and shared read-only by
//! every request. Nothing in the pipeline reads the environment mid-request.
//!
//! The inference credential is not a field: provider factories read
//! it from the environment themselves, so it never passes through this
//! struct, its `Debug` output, or the logs.

use crate::backend::InferenceBackend;
use crate::error::RxScribeError;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Default provider, matching the model the service was designed against.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for the analysis-and-report service.
///
/// Built via [`ServiceConfig::builder()`] or [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use rxscribe::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .bind_addr("127.0.0.1:8080".parse().unwrap())
///     .model("gemini-2.5-flash")
///     .inference_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.inference_timeout_secs, 30);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Socket address the HTTP server binds to. Default: `0.0.0.0:3000`.
    pub bind_addr: SocketAddr,

    /// Maximum Analyze request body in bytes. Default: 20 MiB.
    ///
    /// Phone photos of a prescription are typically 2–8 MB; 20 MiB leaves
    /// room for multipart overhead without accepting arbitrarily large bodies.
    pub max_upload_bytes: usize,

    /// Maximum Download request body in bytes. Default: 25 MiB.
    ///
    /// The Download body carries the image again as base64 (+33 %), so this
    /// bound is what actually limits the embedded image size.
    pub max_report_body_bytes: usize,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    /// If None, resolved from `RXSCRIBE_PROVIDER` or auto-detected.
    pub provider_name: Option<String>,

    /// Model identifier. If None, [`DEFAULT_MODEL`] for the default provider.
    pub model: Option<String>,

    /// Pre-constructed backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn InferenceBackend>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the most literal reading of the image; higher
    /// temperatures invent plausible-looking medicine names.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2048.
    pub max_tokens: usize,

    /// Upper bound on one inference call in seconds. Default: 60.
    pub inference_timeout_secs: u64,

    /// Download timeout for URL inputs (CLI) in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Replacement for [`crate::prompts::PRESCRIPTION_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_upload_bytes: 20 * 1024 * 1024,
            max_report_body_bytes: 25 * 1024 * 1024,
            provider_name: None,
            model: None,
            backend: None,
            temperature: 0.1,
            max_tokens: 2048,
            inference_timeout_secs: 60,
            download_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_report_body_bytes", &self.max_report_body_bytes)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("inference_timeout_secs", &self.inference_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("system_prompt", &self.system_prompt.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn max_report_body_bytes(mut self, n: usize) -> Self {
        self.config.max_report_body_bytes = n;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn inference_timeout_secs(mut self, secs: u64) -> Self {
        self.config.inference_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, RxScribeError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 || c.max_report_body_bytes == 0 {
            return Err(RxScribeError::InvalidConfig(
                "Body size limits must be greater than zero".into(),
            ));
        }
        if c.inference_timeout_secs == 0 {
            return Err(RxScribeError::InvalidConfig(
                "Inference timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(RxScribeError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
