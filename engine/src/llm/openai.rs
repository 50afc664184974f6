//! OpenAI Provider
//!
//! Chat completions and embeddings against the OpenAI HTTP API (or any
//! compatible endpoint via `base_url`). The API key is resolved per call
//! through [`SecretManager`].

use async_trait::async_trait;
use serde_json::json;

use super::{EmbeddingProvider, LLMError, LLMProvider, Message, Result};
use crate::config::OpenAIConfig;
use crate::secrets::SecretManager;

const API_KEY: &str = "openai_api_key";

pub struct OpenAIProvider {
    config: OpenAIConfig,
    secrets: SecretManager,
    dimension: usize,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, secrets: SecretManager, dimension: usize) -> Self {
        Self {
            config,
            secrets,
            dimension,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let api_key = self
            .secrets
            .get_secret(API_KEY)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let base_url = self.config.base_url.trim_end_matches('/');
        let response = self
            .client
            .post(format!("{}{}", base_url, path))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::from_reqwest(e, base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, self.secrets.scrub(&text)));
        }

        response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let data = self
            .post(
                "/chat/completions",
                json!({
                    "model": self.config.model,
                    "messages": api_messages,
                }),
            )
            .await?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let data = self
            .post(
                "/embeddings",
                json!({
                    "model": self.config.embedding_model,
                    "input": text,
                    "dimensions": self.dimension,
                }),
            )
            .await?;

        let values = data
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| LLMError::ParseError("No embedding in response".to_string()))?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect())
    }
}
