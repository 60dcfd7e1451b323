//! Stream and server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Retry eligibility settings.
///
/// Retries are caller-driven: a failed model is re-invoked with a fresh
/// single-model request, not by an internal loop. These settings bound how
/// many such attempts are considered retryable.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Maximum retry attempts per model within one request lifetime.
    pub max_retries: u32,
    /// Fixed delay the caller should wait between attempts.
    pub retry_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Tunables for one fan-out stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Deadline covering stream establishment and the first non-empty delta.
    pub first_chunk_timeout: Duration,
    /// Optional deadline between deltas after the first. `None` matches the
    /// historical behavior of not bounding inter-chunk stalls.
    pub idle_chunk_timeout: Option<Duration>,
    /// Safety ceiling on total chunks pulled per branch; exceeding it forces
    /// completion with the text accumulated so far.
    pub max_chunks: u32,
    /// Grace period after each branch completion to let trailing writes flush.
    pub completion_grace: Duration,
    /// Overall safety timeout that force-ends the stream.
    pub overall_timeout: Duration,
    /// Capacity of the per-connection outbound event channel.
    pub channel_capacity: usize,
    pub retry: RetrySettings,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            first_chunk_timeout: Duration::from_secs(30),
            idle_chunk_timeout: None,
            max_chunks: 5000,
            completion_grace: Duration::from_millis(150),
            overall_timeout: Duration::from_secs(120),
            channel_capacity: 64,
            retry: RetrySettings::default(),
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_first_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.first_chunk_timeout = timeout;
        self
    }

    pub const fn with_idle_chunk_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_chunk_timeout = timeout;
        self
    }

    pub const fn with_max_chunks(mut self, max_chunks: u32) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    pub const fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.completion_grace = grace;
        self
    }

    pub const fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 3001).into(),
        }
    }
}

impl ServerConfig {
    /// Read settings from the environment (`PORT`), falling back to defaults.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let config = StreamConfig::default();
        assert_eq!(config.first_chunk_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_chunk_timeout, None);
        assert_eq!(config.overall_timeout, Duration::from_secs(120));
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn builder_setters() {
        let config = StreamConfig::new()
            .with_max_chunks(10)
            .with_first_chunk_timeout(Duration::from_millis(50));
        assert_eq!(config.max_chunks, 10);
        assert_eq!(config.first_chunk_timeout, Duration::from_millis(50));
    }
}
