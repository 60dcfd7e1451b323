//! Provider adapters.
//!
//! An adapter is a pure mapping from a uniform message list to one
//! provider-native chunk stream, plus an optional error reclassifier. All
//! timeout, retry, and outbound-SSE logic lives in the driver, which is what
//! lets one shared implementation serve every provider.

pub mod anthropic;
pub mod gemini;
pub mod openai_compatible;

use std::collections::HashMap;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::context::ChatMessage;
use crate::error::{Classification, StreamError};

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai_compatible::OpenAiCompatibleAdapter;

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAi,
    DeepSeek,
    Groq,
    Gemini,
    Anthropic,
}

impl ProviderId {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Groq => "groq",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "groq" => Ok(Self::Groq),
            "gemini" => Ok(Self::Gemini),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(StreamError::ModelUnavailable(other.to_string())),
        }
    }
}

/// One provider-native streaming chunk, tagged by provider family.
///
/// Each variant keeps its provider's deserialized shape; `delta()` has one
/// explicit extraction arm per variant instead of shape-guessing across
/// providers.
#[derive(Debug, Clone)]
pub enum ProviderChunk {
    OpenAi(openai_compatible::ChatCompletionChunk),
    Gemini(gemini::GenerateContentChunk),
    Anthropic(anthropic::MessageStreamChunk),
}

impl ProviderChunk {
    /// Extract this chunk's text delta, if it carries one.
    pub fn delta(&self) -> Option<&str> {
        match self {
            Self::OpenAi(chunk) => chunk.delta(),
            Self::Gemini(chunk) => chunk.delta(),
            Self::Anthropic(chunk) => chunk.delta(),
        }
    }
}

/// Stream of provider-native chunks for one branch.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ProviderChunk, StreamError>> + Send>>;

/// Everything one branch needs to call its provider.
#[derive(Clone)]
pub struct BranchContext {
    pub model: String,
    pub provider: ProviderId,
    pub messages: Vec<ChatMessage>,
    pub api_key: SecretString,
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for BranchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchContext")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("messages", &self.messages.len())
            .finish()
    }
}

/// A provider-specific streaming call.
///
/// Implementations hold no timeout, retry, or SSE-out logic.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Establish the provider stream for one branch.
    async fn open_stream(&self, ctx: &BranchContext) -> Result<ChunkStream, StreamError>;

    /// Provider-specific error reclassification, consulted before the shared
    /// classifier. Return `None` to fall through.
    fn reclassify(&self, _error: &StreamError) -> Option<Classification> {
        None
    }
}

/// Provider id → adapter lookup for one deployment.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock adapters over one shared HTTP client.
    pub fn with_defaults(http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiCompatibleAdapter::openai(http.clone())));
        registry.register(Arc::new(OpenAiCompatibleAdapter::deepseek(http.clone())));
        registry.register(Arc::new(OpenAiCompatibleAdapter::groq(http.clone())));
        registry.register(Arc::new(GeminiAdapter::new(http.clone())));
        registry.register(Arc::new(AnthropicAdapter::new(http)));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_round_trip() {
        for id in [
            ProviderId::OpenAi,
            ProviderId::DeepSeek,
            ProviderId::Groq,
            ProviderId::Gemini,
            ProviderId::Anthropic,
        ] {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert!("mystery".parse::<ProviderId>().is_err());
    }

    #[test]
    fn default_registry_covers_all_providers() {
        let registry = AdapterRegistry::with_defaults(reqwest::Client::new());
        for id in [
            ProviderId::OpenAi,
            ProviderId::DeepSeek,
            ProviderId::Groq,
            ProviderId::Gemini,
            ProviderId::Anthropic,
        ] {
            let adapter = registry.get(id).expect("adapter registered");
            assert_eq!(adapter.id(), id);
        }
    }
}
