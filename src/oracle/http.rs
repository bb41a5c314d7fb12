//! OpenAI-compatible chat-completions oracle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{render_user_message, OracleError, OracleRequest, SemanticOracle, SYSTEM_PROMPT};
use crate::config::OracleSettings;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Oracle backed by a chat-completions endpoint.
///
/// Each call is a single stateless POST. No retry is attempted here; the
/// validator records a failed call as an unresolved candidate.
pub struct HttpOracle {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpOracle {
    /// Create a client from oracle settings.
    pub fn new(settings: &OracleSettings) -> Result<Self, OracleError> {
        let api_key = settings
            .resolved_api_key()
            .map_err(|e| OracleError::Config(e.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| OracleError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body<'a>(&'a self, user_message: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user",
                    content: user_message.into(),
                },
            ],
        }
    }
}

#[async_trait]
impl SemanticOracle for HttpOracle {
    async fn judge(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let user_message = render_user_message(request)?;
        let body = self.build_body(&user_message);

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Transport(format!("failed to decode response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}
