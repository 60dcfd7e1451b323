//! Error types and failure classification.
//!
//! Raw failures are carried as [`StreamError`] and mapped into the closed
//! [`ErrorKind`] taxonomy by [`classify`]. Classification order: provider
//! override (consulted by the driver before calling [`classify`]), HTTP
//! status, keyword match on the lower-cased message, then
//! [`ErrorKind::UnknownError`].

use thiserror::Error;

/// A raw failure from credential lookup, stream establishment, or iteration.
#[derive(Debug, Error, Clone)]
pub enum StreamError {
    /// Non-success HTTP response from a provider API.
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// Transport-level failure (request send, byte stream, SSE parse layer).
    #[error("HTTP error: {0}")]
    Http(String),

    /// A provider event that could not be decoded.
    #[error("failed to parse provider event: {0}")]
    Parse(String),

    /// No credential configured for the provider.
    #[error("no API key configured for provider {0}")]
    MissingApiKey(String),

    /// The model id maps to no known provider, or the provider has no adapter.
    #[error("model {0} is not available")]
    ModelUnavailable(String),

    /// The provider produced nothing before the first-chunk deadline.
    #[error("timed out waiting for the provider's first response chunk")]
    FirstChunkTimeout,

    /// The provider stalled between chunks past the configured idle deadline.
    #[error("timed out waiting for the provider's next response chunk")]
    IdleTimeout,

    /// The stream ended without ever producing a non-empty delta.
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// The request was cancelled (client disconnect or safety timeout).
    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

/// Closed taxonomy of user-visible stream failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ApiKeyMissing,
    ModelUnavailable,
    Timeout,
    RateLimit,
    InsufficientBalance,
    TokenLimitExceeded,
    NetworkError,
    EmptyResponse,
    AuthRequired,
    UnknownError,
}

impl ErrorKind {
    /// Wire name carried in the event `errorType` field.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKeyMissing => "API_KEY_MISSING",
            Self::ModelUnavailable => "MODEL_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::TokenLimitExceeded => "TOKEN_LIMIT_EXCEEDED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of classifying a raw failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub message: String,
}

impl Classification {
    /// Create a classification with the default retry eligibility for `kind`.
    ///
    /// `API_KEY_MISSING` and any message containing "max retries exceeded"
    /// are never retryable; every other kind is.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let retryable = !matches!(kind, ErrorKind::ApiKeyMissing)
            && !message.to_lowercase().contains("max retries exceeded");
        Self {
            kind,
            retryable,
            message,
        }
    }

    /// Mark this classification as having exhausted its retry budget.
    pub fn exhausted(mut self) -> Self {
        self.message = format!("{} (max retries exceeded)", self.message);
        self.retryable = false;
        self
    }
}

/// Map a raw failure into the closed taxonomy.
///
/// Provider-specific overrides take precedence over this function and are
/// consulted by the driver first.
pub fn classify(error: &StreamError) -> Classification {
    match error {
        StreamError::MissingApiKey(provider) => Classification::new(
            ErrorKind::ApiKeyMissing,
            format!("No API key configured for {provider}"),
        ),
        StreamError::ModelUnavailable(model) => Classification::new(
            ErrorKind::ModelUnavailable,
            format!("Model {model} is not available"),
        ),
        StreamError::FirstChunkTimeout | StreamError::IdleTimeout => {
            Classification::new(ErrorKind::Timeout, error.to_string())
        }
        StreamError::EmptyResponse => {
            Classification::new(ErrorKind::EmptyResponse, error.to_string())
        }
        StreamError::Api { code, message } => match code {
            401 | 403 => Classification::new(
                ErrorKind::ApiKeyMissing,
                format!("Authentication rejected by provider: {message}"),
            ),
            429 => Classification::new(
                ErrorKind::RateLimit,
                format!("Rate limited by provider: {message}"),
            ),
            402 => Classification::new(
                ErrorKind::InsufficientBalance,
                format!("Provider reports insufficient balance: {message}"),
            ),
            _ => classify_message(&error.to_string()),
        },
        _ => classify_message(&error.to_string()),
    }
}

/// Keyword tier of the classifier; runs over the lower-cased message.
fn classify_message(message: &str) -> Classification {
    let lower = message.to_lowercase();
    let kind = if lower.contains("api key") || lower.contains("auth") {
        ErrorKind::ApiKeyMissing
    } else if lower.contains("timeout") {
        ErrorKind::Timeout
    } else if lower.contains("rate limit") || lower.contains("quota") {
        ErrorKind::RateLimit
    } else if lower.contains("network") || lower.contains("connect") {
        ErrorKind::NetworkError
    } else {
        ErrorKind::UnknownError
    };
    Classification::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_take_precedence_over_keywords() {
        let c = classify(&StreamError::Api {
            code: 401,
            message: "rate limit mentioned but status wins".to_string(),
        });
        assert_eq!(c.kind, ErrorKind::ApiKeyMissing);
        assert!(!c.retryable);

        let c = classify(&StreamError::Api {
            code: 429,
            message: "too many requests".to_string(),
        });
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert!(c.retryable);

        let c = classify(&StreamError::Api {
            code: 402,
            message: "insufficient balance".to_string(),
        });
        assert_eq!(c.kind, ErrorKind::InsufficientBalance);
    }

    #[test]
    fn keyword_classification() {
        let cases = [
            ("the api key is invalid", ErrorKind::ApiKeyMissing),
            ("authorization failed", ErrorKind::ApiKeyMissing),
            ("request timeout after 30s", ErrorKind::Timeout),
            ("rate limit reached", ErrorKind::RateLimit),
            ("quota exceeded for project", ErrorKind::RateLimit),
            ("network unreachable", ErrorKind::NetworkError),
            ("failed to connect to host", ErrorKind::NetworkError),
            ("something odd happened", ErrorKind::UnknownError),
        ];
        for (message, expected) in cases {
            let c = classify(&StreamError::Http(message.to_string()));
            assert_eq!(c.kind, expected, "message: {message}");
        }
    }

    #[test]
    fn timeout_variants_classify_as_timeout() {
        assert_eq!(
            classify(&StreamError::FirstChunkTimeout).kind,
            ErrorKind::Timeout
        );
        assert_eq!(classify(&StreamError::IdleTimeout).kind, ErrorKind::Timeout);
    }

    #[test]
    fn api_key_missing_is_never_retryable() {
        let c = Classification::new(ErrorKind::ApiKeyMissing, "no key");
        assert!(!c.retryable);
    }

    #[test]
    fn max_retries_exceeded_is_never_retryable() {
        let c = Classification::new(ErrorKind::NetworkError, "gave up: max retries exceeded");
        assert!(!c.retryable);

        let c = Classification::new(ErrorKind::RateLimit, "slow down").exhausted();
        assert!(!c.retryable);
        assert!(c.message.contains("max retries exceeded"));
    }

    #[test]
    fn wire_names_match_taxonomy() {
        assert_eq!(ErrorKind::ApiKeyMissing.as_str(), "API_KEY_MISSING");
        assert_eq!(ErrorKind::TokenLimitExceeded.as_str(), "TOKEN_LIMIT_EXCEEDED");
        assert_eq!(ErrorKind::AuthRequired.as_str(), "AUTH_REQUIRED");
        assert_eq!(ErrorKind::UnknownError.as_str(), "UNKNOWN_ERROR");
    }
}
