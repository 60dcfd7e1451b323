//! OpenAI-compatible chat completions streaming.
//!
//! Serves OpenAI itself plus the providers that speak its wire format
//! (DeepSeek, Groq). SSE frames carry `chat.completion.chunk` JSON objects
//! and the stream ends with a literal `[DONE]` data line.

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{BranchContext, ChunkStream, ProviderAdapter, ProviderChunk, ProviderId};
use crate::context::{ChatMessage, MessageRole};
use crate::error::{Classification, ErrorKind, StreamError};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// One `chat.completion.chunk` stream object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Option<Vec<ChunkChoice>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: Option<u32>,
    pub delta: Option<ChunkDelta>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    /// DeepSeek reasoning field; not surfaced as answer text.
    pub reasoning_content: Option<String>,
}

impl ChatCompletionChunk {
    /// Content delta of the first choice, if non-empty.
    pub fn delta(&self) -> Option<&str> {
        self.choices
            .as_ref()?
            .first()?
            .delta
            .as_ref()?
            .content
            .as_deref()
            .filter(|text| !text.is_empty())
    }
}

/// Adapter for OpenAI-format chat completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAdapter {
    id: ProviderId,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiCompatibleAdapter {
    pub fn openai(http: reqwest::Client) -> Self {
        Self::with_base_url(ProviderId::OpenAi, OPENAI_BASE_URL, http)
    }

    pub fn deepseek(http: reqwest::Client) -> Self {
        Self::with_base_url(ProviderId::DeepSeek, DEEPSEEK_BASE_URL, http)
    }

    pub fn groq(http: reqwest::Client) -> Self {
        Self::with_base_url(ProviderId::Groq, GROQ_BASE_URL, http)
    }

    /// Point the adapter at a custom endpoint (tests, proxies).
    pub fn with_base_url(id: ProviderId, base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            id,
            base_url: base_url.into(),
            http,
        }
    }

    fn request_body(&self, ctx: &BranchContext) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = ctx
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": role_name(m), "content": m.content }))
            .collect();
        serde_json::json!({
            "model": ctx.model,
            "messages": messages,
            "stream": true,
        })
    }
}

fn role_name(message: &ChatMessage) -> &'static str {
    match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn open_stream(&self, ctx: &BranchContext) -> Result<ChunkStream, StreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(ctx.api_key.expose_secret())
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
                        if data == "[DONE]" {
                            break;
                        }
                        match serde_json::from_str::<ChatCompletionChunk>(data) {
                            Ok(chunk) => yield Ok(ProviderChunk::OpenAi(chunk)),
                            Err(e) => {
                                yield Err(StreamError::Parse(format!(
                                    "invalid chat completion chunk: {e}"
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
        let StreamError::Api { code, message } = error else {
            return None;
        };
        let lower = message.to_lowercase();
        if lower.contains("context_length_exceeded") || lower.contains("maximum context length") {
            return Some(Classification::new(
                ErrorKind::TokenLimitExceeded,
                "The conversation exceeds the model's context window",
            ));
        }
        if self.id == ProviderId::DeepSeek
            && (*code == 402 || lower.contains("insufficient balance"))
        {
            return Some(Classification::new(
                ErrorKind::InsufficientBalance,
                "DeepSeek account balance is insufficient",
            ));
        }
        None
    }
}
