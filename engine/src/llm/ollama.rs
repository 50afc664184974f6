//! Ollama Provider
//!
//! Local model server, typically at http://localhost:11434.
//! - Chat completions via `/api/chat` (non-streaming)
//! - Embeddings via `/api/embed`
//! - No API key

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingProvider, LLMError, LLMProvider, Message, Result};
use crate::config::OllamaConfig;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    embedding_model: String,
    dimension: usize,
    client: Client,
}

impl OllamaProvider {
    /// Create a provider; `dimension` is the expected embedding length.
    pub fn new(config: &OllamaConfig, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LLMError::ProviderUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            dimension,
            client,
        })
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LLMError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, error_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: self.convert_messages(messages),
            stream: false,
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            "Ollama chat request"
        );

        let start = std::time::Instant::now();
        let response: OllamaChatResponse = self
            .post("/api/chat", &request)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(response.message.content)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": [text],
            "truncate": true
        });

        let response: OllamaEmbedResponse = self
            .post("/api/embed", &body)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse embedding: {}", e)))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::ParseError("Empty embedding response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
