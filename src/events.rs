//! Outbound event wire type and SSE framing.
//!
//! Every frame sent to the client is one [`StreamEvent`] serialized as a
//! single `data: <json>\n\n` block. Absent fields are suppressed so each
//! event kind carries only what it needs.

use serde::{Deserialize, Serialize};

use crate::error::Classification;

/// One outbound SSE event.
///
/// Field names follow the wire protocol (`errorType`, `allComplete`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_complete: Option<bool>,
}

impl StreamEvent {
    /// Branch entered Loading: the upstream call is being established.
    pub fn loading(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            loading: Some(true),
            ..Self::default()
        }
    }

    /// One non-empty delta of generated text.
    pub fn delta(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            text: Some(text.into()),
            streaming: Some(true),
            ..Self::default()
        }
    }

    /// Terminal success event carrying the branch's final accumulated text.
    pub fn done(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            text: Some(text.into()),
            done: Some(true),
            ..Self::default()
        }
    }

    /// Terminal error event; terminal errors also carry `done: true`.
    pub fn error(model: impl Into<String>, classification: &Classification) -> Self {
        Self {
            model: Some(model.into()),
            done: Some(true),
            error: Some(classification.message.clone()),
            error_type: Some(classification.kind.as_str().to_string()),
            ..Self::default()
        }
    }

    /// The single stream-terminating frame.
    pub fn all_complete() -> Self {
        Self {
            done: Some(true),
            all_complete: Some(true),
            ..Self::default()
        }
    }

    /// Whether this is a terminal event for its branch.
    pub fn is_terminal(&self) -> bool {
        self.done == Some(true)
    }

    /// Serialize to the JSON payload of one SSE frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Encode as a complete `data: <json>\n\n` SSE frame.
    pub fn sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Classification, ErrorKind};

    #[test]
    fn absent_fields_are_suppressed() {
        let json = StreamEvent::loading("gemini-flash").to_json();
        assert_eq!(json, r#"{"model":"gemini-flash","loading":true}"#);
    }

    #[test]
    fn error_event_shape() {
        let c = Classification::new(ErrorKind::ApiKeyMissing, "No API key configured");
        let event = StreamEvent::error("deepseek-chat", &c);
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["model"], "deepseek-chat");
        assert_eq!(value["errorType"], "API_KEY_MISSING");
        assert_eq!(value["done"], true);
        assert!(value.get("allComplete").is_none());
    }

    #[test]
    fn all_complete_frame() {
        let json = StreamEvent::all_complete().to_json();
        assert_eq!(json, r#"{"done":true,"allComplete":true}"#);
    }

    #[test]
    fn sse_frame_format() {
        let frame = StreamEvent::delta("m", "hi").sse_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn terminal_detection() {
        assert!(StreamEvent::done("m", "t").is_terminal());
        assert!(StreamEvent::all_complete().is_terminal());
        assert!(!StreamEvent::delta("m", "t").is_terminal());
        assert!(!StreamEvent::loading("m").is_terminal());
    }
}
