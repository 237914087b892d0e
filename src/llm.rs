//! Text generation provider abstraction
//!
//! The chat server treats the model as a black box with a single
//! `generate` operation.

mod error;
mod gemini;

pub use error::{ProviderError, ProviderErrorKind};
pub use gemini::GeminiProvider;

use crate::config::LlmConfig;
use crate::model::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Input to a generation call
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// The prompt being answered
    pub prompt: String,
    /// Earlier turns, oldest first. Empty unless history forwarding is enabled.
    pub history: Vec<Message>,
}

impl GenerationRequest {
    pub fn single_turn(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
        }
    }
}

/// Common interface for generation providers
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce the completion text for a request
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: GenerationProvider + ?Sized> GenerationProvider for Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        (**self).generate(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Build the provider described by the configuration, wrapped with logging
pub fn provider_from_config(config: &LlmConfig) -> Arc<dyn GenerationProvider> {
    let inner: Arc<dyn GenerationProvider> = match &config.gemini_api_key {
        Some(key) if !key.is_empty() => Arc::new(GeminiProvider::new(
            key.clone(),
            config.model.clone(),
            config.base_url.as_deref(),
        )),
        _ => Arc::new(UnconfiguredProvider {
            model_id: config.model.clone(),
        }),
    };
    Arc::new(LoggingProvider::new(inner))
}

/// Stand-in used when no API key is configured; every call fails with an auth error
struct UnconfiguredProvider {
    model_id: String,
}

#[async_trait]
impl GenerationProvider for UnconfiguredProvider {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
        Err(ProviderError::auth("GEMINI_API_KEY is not set"))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Logging wrapper for generation providers
pub struct LoggingProvider {
    inner: Arc<dyn GenerationProvider>,
    model_id: String,
}

impl LoggingProvider {
    pub fn new(inner: Arc<dyn GenerationProvider>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl GenerationProvider for LoggingProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(text) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    history_turns = request.history.len(),
                    completion_chars = text.chars().count(),
                    "Generation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    transient = e.kind.is_transient(),
                    "Generation failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_yields_auth_error() {
        let provider = provider_from_config(&LlmConfig {
            gemini_api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: None,
        });

        assert_eq!(provider.model_id(), "gemini-1.5-flash");
        let err = provider
            .generate(&GenerationRequest::single_turn("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }
}
