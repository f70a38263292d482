//! Chat-completion backends used for answer generation.
//!
//! | Provider | Endpoint | Auth |
//! |----------|----------|------|
//! | `openai` | `POST {url}/chat/completions` | `OPENAI_API_KEY` bearer |
//! | `ollama` | `POST {url}/api/chat` (non-streaming) | none |
//!
//! Both share the retry policy in [`crate::http`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::http;

/// A model that turns a system prompt and a user message into one reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

pub struct OpenAIChatModel {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))
    }
}

pub struct OllamaChatModel {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": {"temperature": self.temperature},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/api/chat", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message content"))
    }
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_model_errors() {
        assert!(DisabledChatModel.complete("sys", "hi").await.is_err());
    }

    #[test]
    fn test_create_rejects_unknown() {
        let config = LlmConfig {
            provider: "anthropic-ish".into(),
            ..LlmConfig::default()
        };
        assert!(create_chat_model(&config).is_err());
    }

    #[test]
    fn test_ollama_model_requires_no_key() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: Some("llama3".into()),
            ..LlmConfig::default()
        };
        let model = create_chat_model(&config).unwrap();
        assert_eq!(model.model_name(), "llama3");
    }
}
