//! Client for a local LLM runtime speaking the Ollama `/api/chat` protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Empty response")]
    Empty,
}

/// Something that can answer a customer message.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn reply(&self, system: &str, messages: &[Message]) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct Client {
    endpoint: String,
    model: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            http,
        })
    }

    pub async fn chat(&self, system: &str, messages: &[Message]) -> Result<String, LlmError> {
        let system_message = Message { role: Role::System, content: system.to_string() };
        let api_messages: Vec<ApiMessage<'_>> = std::iter::once(&system_message)
            .filter(|m| !m.content.is_empty())
            .chain(messages)
            .map(|m| ApiMessage { role: m.role.as_str(), content: &m.content })
            .collect();

        let request = ChatRequest { model: &self.model, messages: api_messages, stream: false };

        let response = self
            .http
            .post(format!("{}/api/chat", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        api_response
            .message
            .map(|m| m.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::Empty)
    }
}

#[async_trait]
impl Assistant for Client {
    async fn reply(&self, system: &str, messages: &[Message]) -> Result<String, LlmError> {
        self.chat(system, messages).await
    }
}
