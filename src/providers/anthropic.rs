//! Anthropic Messages API streaming.
//!
//! The Messages stream interleaves typed events (`message_start`,
//! `content_block_delta`, `message_delta`, `message_stop`, `ping`, `error`);
//! only `content_block_delta` carries answer text.

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{BranchContext, ChunkStream, ProviderAdapter, ProviderChunk, ProviderId};
use crate::context::{ChatMessage, MessageRole};
use crate::error::{Classification, ErrorKind, StreamError};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// One typed event from the Messages stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageStreamChunk {
    #[serde(rename = "type")]
    pub kind: String,
    pub delta: Option<AnthropicDelta>,
    pub error: Option<AnthropicApiError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicDelta {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicApiError {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
}

impl MessageStreamChunk {
    /// Text delta of a `content_block_delta` event, if non-empty.
    pub fn delta(&self) -> Option<&str> {
        if self.kind != "content_block_delta" {
            return None;
        }
        self.delta
            .as_ref()?
            .text
            .as_deref()
            .filter(|text| !text.is_empty())
    }
}

/// Adapter for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(ANTHROPIC_BASE_URL, http)
    }

    pub fn with_base_url(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    /// Map uniform messages to the Messages request; system messages go to
    /// the top-level `system` field.
    fn request_body(&self, ctx: &BranchContext) -> serde_json::Value {
        let mut system = String::new();
        let mut messages = Vec::new();
        for message in &ctx.messages {
            match message.role {
                MessageRole::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&message.content);
                }
                _ => messages.push(serde_json::json!({
                    "role": anthropic_role(message),
                    "content": message.content,
                })),
            }
        }

        let mut body = serde_json::json!({
            "model": ctx.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": messages,
            "stream": true,
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system);
        }
        body
    }
}

fn anthropic_role(message: &ChatMessage) -> &'static str {
    match message.role {
        MessageRole::Assistant => "assistant",
        _ => "user",
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn open_stream(&self, ctx: &BranchContext) -> Result<ChunkStream, StreamError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", ctx.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(ctx))
            .send()
            .await
            .map_err(|e| StreamError::Http(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StreamError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let mut events = response.bytes_stream().eventsource();
        let chunks = stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<MessageStreamChunk>(data) {
                            Ok(chunk) => {
                                if chunk.kind == "message_stop" {
                                    break;
                                }
                                if chunk.kind == "error" {
                                    let message = chunk
                                        .error
                                        .and_then(|e| e.message)
                                        .unwrap_or_else(|| "provider reported an error".to_string());
                                    yield Err(StreamError::Http(message));
                                    break;
                                }
                                yield Ok(ProviderChunk::Anthropic(chunk));
                            }
                            Err(e) => {
                                yield Err(StreamError::Parse(format!(
                                    "invalid Messages stream event: {e}"
                                )));
                            }
                        }
                    }
                    Err(e) => yield Err(StreamError::Http(format!("SSE stream error: {e}"))),
                }
            }
        };
        Ok(Box::pin(chunks))
    }

    fn reclassify(&self, error: &StreamError) -> Option<Classification> {
        let message = match error {
            StreamError::Api { message, .. } => message,
            StreamError::Http(message) => message,
            _ => return None,
        };
        if message.to_lowercase().contains("overloaded") {
            return Some(Classification::new(
                ErrorKind::RateLimit,
                "Anthropic is temporarily overloaded",
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use tokio_util::sync::CancellationToken;

    fn chunk_from(json: &str) -> MessageStreamChunk {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn content_block_delta_carries_text() {
        let chunk = chunk_from(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        );
        assert_eq!(chunk.delta(), Some("Hi"));
    }

    #[test]
    fn non_content_events_have_no_delta() {
        assert_eq!(chunk_from(r#"{"type":"ping"}"#).delta(), None);
        assert_eq!(
            chunk_from(r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#).delta(),
            None
        );
    }

    #[test]
    fn system_messages_lift_to_system_field() {
        let adapter = AnthropicAdapter::new(reqwest::Client::new());
        let ctx = BranchContext {
            model: "claude-haiku".to_string(),
            provider: ProviderId::Anthropic,
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            api_key: SecretString::from("k".to_string()),
            cancel: CancellationToken::new(),
        };
        let body = adapter.request_body(&ctx);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn overloaded_override() {
        let adapter = AnthropicAdapter::new(reqwest::Client::new());
        let c = adapter
            .reclassify(&StreamError::Http("Overloaded".to_string()))
            .unwrap();
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert!(c.retryable);
    }
}
