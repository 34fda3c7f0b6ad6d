//! Hand-rolled Anthropic Messages API client: raw `reqwest` + manual SSE
//! parsing, rather than routing through a higher-level chain abstraction —
//! the paragraph-reformatting pipeline in `LlmGateway` needs the full
//! accumulated fragment stream, not an opaque completion object.

use crate::error::LlmError;
use crate::llm::LlmBackend;
use async_trait::async_trait;
use futures::StreamExt;
use futures_core::stream::BoxStream;
use serde::{Deserialize, Serialize};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    delta_type: Option<String>,
    text: Option<String>,
}

pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String) -> Self {
        AnthropicBackend { client: reqwest::Client::new(), api_key }
    }

    fn classify(status: reqwest::StatusCode, body: &str) -> LlmError {
        if status.is_server_error() || status.as_u16() == 429 || body.to_lowercase().contains("overloaded") {
            LlmError::Transient(format!("{status}: {body}"))
        } else {
            LlmError::Permanent(format!("{status}: {body}"))
        }
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, system: &str, prompt: &str, model: &str) -> Result<String, LlmError> {
        let request = MessageRequest {
            model,
            max_tokens: 4096,
            system,
            messages: vec![Message { role: "user", content: prompt }],
            stream: false,
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(status, &body));
        }

        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        Ok(parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join(""))
    }

    async fn stream(&self, system: &str, prompt: &str, model: &str) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let request = MessageRequest {
            model,
            max_tokens: 4096,
            system,
            messages: vec![Message { role: "user", content: prompt }],
            stream: true,
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(status, &body));
        }

        let byte_stream = response.bytes_stream();
        let fragments = byte_stream.map(|chunk_result| {
            let chunk = chunk_result.map_err(|e| LlmError::Transient(e.to_string()))?;
            let text = String::from_utf8_lossy(&chunk).to_string();
            let mut combined = String::new();
            for line in text.lines() {
                let Some(payload) = line.strip_prefix("data: ") else { continue };
                if payload == "[DONE]" {
                    continue;
                }
                if let Ok(event) = serde_json::from_str::<StreamEvent>(payload) {
                    if event.event_type == "content_block_delta" {
                        if let Some(delta) = event.delta {
                            if let Some(text) = delta.text {
                                combined.push_str(&text);
                            }
                        }
                    }
                }
            }
            Ok(combined)
        });

        Ok(Box::pin(fragments))
    }
}
