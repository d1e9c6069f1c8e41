//! Client for the hosted chat-completion endpoint.
//!
//! Each call sends one POST with a fixed system instruction and the user's
//! prompt. There is no retry, timeout or streaming.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.1-sonar-small-128k-online";
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Be precise and concise.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("endpoint rejected the credential ({status})")]
    Auth { status: u16 },

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no API key stored")]
    MissingCredential,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::Network(err.to_string())
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Where and how to ask for completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub model: String,
    pub system_prompt: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Something that can turn a prompt into an assistant reply.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str, credential: &str) -> Result<String, CompletionError>;
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    settings: CompletionSettings,
}

impl CompletionClient {
    pub fn new(settings: CompletionSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub async fn query(&self, prompt: &str, credential: &str) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.settings.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        debug!(endpoint = %self.settings.endpoint, model = %self.settings.model, "sending completion request");

        let response = self
            .client
            .post(&self.settings.endpoint)
            .header("Authorization", format!("Bearer {}", credential))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "completion request failed to send");
                CompletionError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "completion endpoint returned an error");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Auth {
                    status: status.as_u16(),
                },
                _ => CompletionError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let body = response.text().await?;
        let reply = extract_reply(&body).map_err(|e| {
            warn!(error = %e, "completion response could not be parsed");
            e
        })?;

        debug!(chars = reply.chars().count(), "completion received");
        Ok(reply)
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str, credential: &str) -> Result<String, CompletionError> {
        self.query(prompt, credential).await
    }
}

impl fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("settings", &self.settings)
            .finish()
    }
}

/// Pull `choices[0].message.content` out of a success body.
fn extract_reply(body: &str) -> Result<String, CompletionError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    let choice = parsed
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| CompletionError::MalformedResponse("no choices".to_string()))?;

    choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| CompletionError::MalformedResponse("first choice has no message content".to_string()))
}
