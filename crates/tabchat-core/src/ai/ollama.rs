use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use anyhow::Result;
use thiserror::Error;

use crate::state::ChatMessage;

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaReplyMessage>,
}

#[derive(Deserialize)]
struct OllamaReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request to Ollama failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Ollama returned status {0}")]
    Status(StatusCode),

    #[error("Ollama response had no message content")]
    NoResponse,
}

impl ChatError {
    /// Text of the error card shown in the conversation
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::NoResponse => "No response from server.",
            ChatError::Transport(_) | ChatError::Status(_) => "Error communicating with server.",
        }
    }
}

/// Extract the reply text from an `/api/chat` response body.
///
/// Anything other than a JSON object with a non-empty `message.content`
/// counts as no response.
pub fn parse_reply(body: &str) -> Result<String, ChatError> {
    let response: OllamaChatResponse =
        serde_json::from_str(body).map_err(|_| ChatError::NoResponse)?;

    response
        .message
        .and_then(|message| message.content)
        .filter(|content| !content.is_empty())
        .ok_or(ChatError::NoResponse)
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send the whole conversation and wait for one non-streamed reply.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let request = OllamaChatRequest {
            model: &self.model,
            stream: false,
            messages,
        };

        tracing::debug!(endpoint = %self.endpoint, messages = messages.len(), "sending chat request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_reply(&body)
    }
}
