//! Gemini streaming via `streamGenerateContent` with `alt=sse`.

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{BranchContext, ChunkStream, ProviderAdapter, ProviderChunk, ProviderId};
use crate::context::{ChatMessage, MessageRole};
use crate::error::{Classification, ErrorKind, StreamError};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One streamed `GenerateContentResponse` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateContentChunk {
    pub candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiContent {
    pub parts: Option<Vec<GeminiPart>>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: Option<String>,
}

impl GenerateContentChunk {
    /// Text of the first part of the first candidate, if non-empty.
    pub fn delta(&self) -> Option<&str> {
        self.candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_ref()?
            .first()?
            .text
            .as_deref()
            .filter(|text| !text.is_empty())
    }
}

/// Adapter for the Gemini generative language API.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    base_url: String,
    http: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(GEMINI_BASE_URL, http)
    }

    pub fn with_base_url(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    /// Map uniform messages to Gemini `contents` plus `systemInstruction`.
    fn request_body(&self, ctx: &BranchContext) -> serde_json::Value {
        let mut contents = Vec::new();
        let mut system_parts: Vec<serde_json::Value> = Vec::new();
        for message in &ctx.messages {
            match message.role {
                MessageRole::System => {
                    system_parts.push(serde_json::json!({ "text": message.content }));
                }
                _ => contents.push(serde_json::json!({
                    "role": gemini_role(message),
                    "parts": [{ "text": message.content }],
                })),
            }
        }

        let mut body = serde_json::json!({ "contents": contents });
        if !system_parts.is_empty() {
            body["systemInstruction"] = serde_json::json!({ "parts": system_parts });
        }
        body
    }
}

fn gemini_role(message: &ChatMessage) -> &'static str {
    match message.role {
        MessageRole::Assistant => "model",
        _ => "user",
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn open_stream(&self, ctx: &BranchContext) -> Result<ChunkStream, StreamError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, ctx.model
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", ctx.api_key.expose_secret())
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
                        match serde_json::from_str::<GenerateContentChunk>(data) {
                            Ok(chunk) => yield Ok(ProviderChunk::Gemini(chunk)),
                            Err(e) => {
                                yield Err(StreamError::Parse(format!(
                                    "invalid Gemini stream chunk: {e}"
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
        let StreamError::Api { message, .. } = error else {
            return None;
        };
        if message.to_lowercase().contains("resource_exhausted") {
            return Some(Classification::new(
                ErrorKind::RateLimit,
                "Gemini quota exhausted, try again later",
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

    fn context_with(messages: Vec<ChatMessage>) -> BranchContext {
        BranchContext {
            model: "gemini-flash".to_string(),
            provider: ProviderId::Gemini,
            messages,
            api_key: SecretString::from("k".to_string()),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn extracts_text_delta() {
        let chunk: GenerateContentChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.delta(), Some("Hello"));
    }

    #[test]
    fn finish_only_chunk_has_no_delta() {
        let chunk: GenerateContentChunk =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"STOP"}]}"#).unwrap();
        assert_eq!(chunk.delta(), None);
    }

    #[test]
    fn system_messages_become_system_instruction() {
        let adapter = GeminiAdapter::new(reqwest::Client::new());
        let ctx = context_with(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        let body = adapter.request_body(&ctx);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
    }

    #[test]
    fn resource_exhausted_override() {
        let adapter = GeminiAdapter::new(reqwest::Client::new());
        let c = adapter
            .reclassify(&StreamError::Api {
                code: 429,
                message: r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#.to_string(),
            })
            .unwrap();
        assert_eq!(c.kind, ErrorKind::RateLimit);
    }
}
