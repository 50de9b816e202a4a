//! OpenRouter provider — OpenAI-compatible chat completions over reqwest.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::{CompletionRequest, CompletionResponse, LlmConfig, LlmProvider};
use crate::error::LlmError;

/// OpenRouter requires these headers to identify the calling application.
const REFERER: &str = "http://localhost:8000";
const TITLE: &str = "PostgreSQL Index Agents";

/// LLM provider backed by OpenRouter's `/chat/completions` endpoint.
pub struct OpenRouterProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenRouterProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "openrouter".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "openrouter".into(),
                reason: format!("status {status}: {detail}"),
            });
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: "openrouter".into(),
                reason: e.to_string(),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: "openrouter".into(),
                reason: "response contained no choices".into(),
            })?;

        Ok(CompletionResponse { content })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_strips_trailing_slash() {
        let provider = OpenRouterProvider::new(LlmConfig {
            api_key: secrecy::SecretString::from("k"),
            base_url: "https://openrouter.ai/api/v1/".into(),
            model: "m".into(),
        });
        assert_eq!(
            provider.completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn chat_response_parses() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
    }
}
