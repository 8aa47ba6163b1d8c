//! The inference capability: `infer(prompt, image) -> text`.
//!
//! The pipeline only ever sees [`InferenceBackend`]. [`LlmBackend`] is the
//! production implementation on top of `edgequake-llm`, which covers Gemini,
//! OpenAI, Anthropic, Ollama and any OpenAI-compatible endpoint; tests and
//! embedders can supply their own implementation through
//! [`crate::config::ServiceConfigBuilder::backend`].

use crate::config::{ServiceConfig, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::envelope::UploadedImage;
use crate::error::RxScribeError;
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, info};

/// A vision model that turns a prompt plus one image into text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short label for logs, e.g. `gemini/gemini-2.5-flash`.
    fn name(&self) -> &str;

    /// Run one inference. Any failure is terminal for the request.
    async fn infer(&self, prompt: &str, image: &UploadedImage) -> Result<String, RxScribeError>;
}

/// [`InferenceBackend`] backed by an `edgequake-llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ServiceConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            options: build_options(config),
        }
    }
}

#[async_trait]
impl InferenceBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.label
    }

    /// One user turn carrying the prompt and the inline image, as a single
    /// multimodal message.
    async fn infer(&self, prompt: &str, image: &UploadedImage) -> Result<String, RxScribeError> {
        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![encode::to_image_data(image)],
        )];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| RxScribeError::InferenceFailed {
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the service config.
fn build_options(config: &ServiceConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the inference backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`): used as-is.
/// 2. **Named provider** (`config.provider_name`): created via
///    [`ProviderFactory::create_llm_provider`] with `config.model` or that
///    provider's [`default_model_for`].
/// 3. **Environment pair** (`RXSCRIBE_PROVIDER` + `RXSCRIBE_MODEL`).
/// 4. **Gemini default** when `GEMINI_API_KEY` is set.
/// 5. **Auto-detection** (`ProviderFactory::from_env`).
///
/// Provider factories read API keys from the environment; this function only
/// checks that the Gemini key exists, never its value.
pub fn resolve_backend(config: &ServiceConfig) -> Result<Arc<dyn InferenceBackend>, RxScribeError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref name) = config.provider_name {
        let model = match config.model.as_deref() {
            Some(model) => model,
            None => default_model_for(name).ok_or_else(|| RxScribeError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("No default vision model is known for '{name}'. Pass --model."),
            })?,
        };
        return create_llm_backend(name, model, config);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("RXSCRIBE_PROVIDER"),
        std::env::var("RXSCRIBE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_llm_backend(&prov, &model, config);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_llm_backend(DEFAULT_PROVIDER, model, config);
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| RxScribeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or OPENAI_API_KEY, ANTHROPIC_API_KEY), or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;
    info!("Auto-detected LLM provider");
    Ok(Arc::new(LlmBackend::new(provider, "auto", config)))
}

/// Vision model used for a named provider when none is configured.
pub fn default_model_for(provider_name: &str) -> Option<&'static str> {
    match provider_name.trim().to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some(DEFAULT_MODEL),
        "openai" | "azure" => Some("gpt-4.1-nano"),
        "anthropic" => Some("claude-sonnet-4-20250514"),
        "ollama" => Some("llama3.2-vision"),
        _ => None,
    }
}

fn create_llm_backend(
    provider_name: &str,
    model: &str,
    config: &ServiceConfig,
) -> Result<Arc<dyn InferenceBackend>, RxScribeError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        RxScribeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    info!("Using LLM provider {}/{}", provider_name, model);
    Ok(Arc::new(LlmBackend::new(
        provider,
        format!("{provider_name}/{model}"),
        config,
    )))
}
