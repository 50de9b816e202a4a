//! LLM integration.
//!
//! Agents that want model assistance (the architect's proposal rationale,
//! report prose) go through the [`LlmProvider`] trait. The production
//! implementation talks to OpenRouter's OpenAI-compatible chat API; tests
//! substitute their own.

pub mod openrouter;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::error::LlmError;

pub use openrouter::OpenRouterProvider;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Settings for technical analysis — moderate temperature.
    pub fn for_analysis(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.3,
            max_tokens: 4096,
        }
    }

    /// Settings for SQL proposal generation — lowest temperature, the
    /// output must be syntactically exact.
    pub fn for_proposals(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: 2048,
        }
    }

    /// Settings for long-form report prose.
    pub fn for_reports(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.5,
            max_tokens: 8192,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Completion response content.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Minimal completion interface the agents depend on.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    fn model_name(&self) -> &str;
}

/// Create an LLM provider from configuration.
///
/// Returns `None` when no API key is set — the service runs fine without
/// model assistance, agents just skip their LLM phases.
pub fn create_provider(config: &LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    if config.api_key.expose_secret().trim().is_empty() {
        tracing::warn!("No LLM API key set, model-assisted analysis disabled");
        return None;
    }
    tracing::info!(model = %config.model, "Using OpenRouter");
    Some(Arc::new(OpenRouterProvider::new(config.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_without_key_is_none() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from(""),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "moonshotai/kimi-k2".to_string(),
        };
        assert!(create_provider(&config).is_none());
    }

    #[test]
    fn create_provider_with_key() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("sk-or-test"),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "moonshotai/kimi-k2".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "moonshotai/kimi-k2");
    }

    #[test]
    fn request_profiles() {
        assert_eq!(CompletionRequest::for_proposals("p").temperature, 0.1);
        assert_eq!(CompletionRequest::for_analysis("p").max_tokens, 4096);
        assert_eq!(CompletionRequest::for_reports("p").max_tokens, 8192);
    }
}
