//! Credential resolution seam.
//!
//! The engine never stores credentials; it asks a [`CredentialResolver`] for
//! a per-provider key map (authenticated requests) or the single guest
//! system key. Keys are held as [`SecretString`] so they never land in logs
//! or debug output.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::StreamError;
use crate::providers::ProviderId;

/// A provider → API key map for one user.
#[derive(Clone, Default)]
pub struct CredentialSet {
    keys: HashMap<ProviderId, SecretString>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: ProviderId, key: SecretString) {
        self.keys.insert(provider, key);
    }

    pub fn with_key(mut self, provider: ProviderId, key: SecretString) -> Self {
        self.insert(provider, key);
        self
    }

    pub fn get(&self, provider: ProviderId) -> Option<&SecretString> {
        self.keys.get(&provider)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("providers", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves credentials for a request.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Per-provider keys for an authenticated user's conversation.
    async fn resolve_user(&self, conversation_id: &str) -> Result<CredentialSet, StreamError>;

    /// The guest system key, if one is configured.
    async fn resolve_guest(&self) -> Option<SecretString>;
}

/// Resolver backed by process environment variables.
///
/// Reads `OPENAI_API_KEY`, `DEEPSEEK_API_KEY`, `GROQ_API_KEY`,
/// `GEMINI_API_KEY`, `ANTHROPIC_API_KEY` and, for guests,
/// `GUEST_SYSTEM_API_KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialResolver;

impl EnvCredentialResolver {
    fn env_key(name: &str) -> Option<SecretString> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecretString::from)
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve_user(&self, _conversation_id: &str) -> Result<CredentialSet, StreamError> {
        let mut set = CredentialSet::new();
        let vars = [
            (ProviderId::OpenAi, "OPENAI_API_KEY"),
            (ProviderId::DeepSeek, "DEEPSEEK_API_KEY"),
            (ProviderId::Groq, "GROQ_API_KEY"),
            (ProviderId::Gemini, "GEMINI_API_KEY"),
            (ProviderId::Anthropic, "ANTHROPIC_API_KEY"),
        ];
        for (provider, var) in vars {
            if let Some(key) = Self::env_key(var) {
                set.insert(provider, key);
            }
        }
        Ok(set)
    }

    async fn resolve_guest(&self) -> Option<SecretString> {
        Self::env_key("GUEST_SYSTEM_API_KEY")
    }
}

/// Fixed-credential resolver for embedding and tests.
#[derive(Clone, Default)]
pub struct StaticCredentialResolver {
    user: CredentialSet,
    guest: Option<SecretString>,
}

impl StaticCredentialResolver {
    pub fn new(user: CredentialSet, guest: Option<SecretString>) -> Self {
        Self { user, guest }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve_user(&self, _conversation_id: &str) -> Result<CredentialSet, StreamError> {
        Ok(self.user.clone())
    }

    async fn resolve_guest(&self) -> Option<SecretString> {
        self.guest.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_key_material() {
        let set = CredentialSet::new().with_key(
            ProviderId::Gemini,
            SecretString::from("very-secret".to_string()),
        );
        let debug = format!("{set:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("Gemini"));
    }

    #[tokio::test]
    async fn static_resolver_round_trips() {
        let set = CredentialSet::new()
            .with_key(ProviderId::OpenAi, SecretString::from("k".to_string()));
        let resolver = StaticCredentialResolver::new(set, None);
        let resolved = resolver.resolve_user("c1").await.unwrap();
        assert!(resolved.get(ProviderId::OpenAi).is_some());
        assert!(resolved.get(ProviderId::Anthropic).is_none());
        assert!(resolver.resolve_guest().await.is_none());
    }
}
