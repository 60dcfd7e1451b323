//! Model catalog: model id → provider, plus the guest allow-list.

use crate::providers::ProviderId;

/// Resolve the provider that serves `model`, if any.
///
/// Known ids are matched exactly; otherwise the model-family prefix decides.
/// Unknown models yield `None`, which the coordinator reports as
/// MODEL_UNAVAILABLE without dispatching anything.
pub fn provider_for_model(model: &str) -> Option<ProviderId> {
    let exact = match model {
        "gemini-flash" | "gemini-flash-lite" | "gemini-pro" => Some(ProviderId::Gemini),
        "deepseek-chat" | "deepseek-reasoner" => Some(ProviderId::DeepSeek),
        "gpt-4o" | "gpt-4o-mini" | "gpt-4.1" | "gpt-4.1-mini" => Some(ProviderId::OpenAi),
        "claude-sonnet" | "claude-haiku" => Some(ProviderId::Anthropic),
        "llama-3.3-70b" | "llama-3.1-8b" => Some(ProviderId::Groq),
        _ => None,
    };
    if exact.is_some() {
        return exact;
    }

    if model.starts_with("gemini-") {
        Some(ProviderId::Gemini)
    } else if model.starts_with("deepseek-") {
        Some(ProviderId::DeepSeek)
    } else if model.starts_with("gpt-") || model.starts_with("o1") || model.starts_with("o3") {
        Some(ProviderId::OpenAi)
    } else if model.starts_with("claude-") {
        Some(ProviderId::Anthropic)
    } else if model.starts_with("llama-") {
        Some(ProviderId::Groq)
    } else {
        None
    }
}

/// Models guests may use. Guests are limited to the Gemini flash family
/// served through the system key.
const GUEST_MODELS: &[&str] = &["gemini-flash", "gemini-flash-lite"];

/// Whether a guest may request `model` on `provider`.
pub fn guest_allowed(model: &str, provider: ProviderId) -> bool {
    provider == ProviderId::Gemini && GUEST_MODELS.contains(&model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_resolve() {
        assert_eq!(provider_for_model("gemini-flash"), Some(ProviderId::Gemini));
        assert_eq!(
            provider_for_model("deepseek-chat"),
            Some(ProviderId::DeepSeek)
        );
        assert_eq!(provider_for_model("gpt-4o-mini"), Some(ProviderId::OpenAi));
        assert_eq!(
            provider_for_model("claude-haiku"),
            Some(ProviderId::Anthropic)
        );
        assert_eq!(provider_for_model("llama-3.3-70b"), Some(ProviderId::Groq));
    }

    #[test]
    fn family_prefix_fallback() {
        assert_eq!(
            provider_for_model("gemini-2.0-flash-exp"),
            Some(ProviderId::Gemini)
        );
        assert_eq!(provider_for_model("o1-mini"), Some(ProviderId::OpenAi));
        assert_eq!(
            provider_for_model("claude-opus-latest"),
            Some(ProviderId::Anthropic)
        );
    }

    #[test]
    fn unknown_models_yield_none() {
        assert_eq!(provider_for_model("mystery-model"), None);
        assert_eq!(provider_for_model(""), None);
    }

    #[test]
    fn guest_allow_list() {
        assert!(guest_allowed("gemini-flash", ProviderId::Gemini));
        assert!(guest_allowed("gemini-flash-lite", ProviderId::Gemini));
        assert!(!guest_allowed("gemini-pro", ProviderId::Gemini));
        assert!(!guest_allowed("deepseek-chat", ProviderId::DeepSeek));
        // A gemini model name on another provider is still rejected.
        assert!(!guest_allowed("gemini-flash", ProviderId::OpenAi));
    }
}
