//! Request-scoped retry accounting.
//!
//! Counters are keyed per model id and never decrease within a request's
//! lifetime. The tracker lives on the request context rather than in a
//! process-wide map, so parallel requests cannot leak attempts into each
//! other.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::RetrySettings;
use crate::error::Classification;

/// Per-model attempt counters for one request.
#[derive(Debug, Default)]
pub struct RetryTracker {
    counts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt for `model`, returning the new total.
    pub fn record_attempt(&self, model: &str) -> u32 {
        let mut counts = self.counts.lock().expect("retry counter lock poisoned");
        let count = counts.entry(model.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Attempts recorded for `model` so far.
    pub fn attempts(&self, model: &str) -> u32 {
        self.counts
            .lock()
            .expect("retry counter lock poisoned")
            .get(model)
            .copied()
            .unwrap_or(0)
    }

    /// Whether `model` has used up its retry budget.
    ///
    /// The first attempt is not a retry, so a model is exhausted once more
    /// than `max_retries + 1` attempts have been recorded.
    pub fn exhausted(&self, model: &str, settings: &RetrySettings) -> bool {
        self.attempts(model) > settings.max_retries + 1
    }

    /// Downgrade a retryable classification once the budget is spent.
    pub fn apply_budget(
        &self,
        model: &str,
        settings: &RetrySettings,
        classification: Classification,
    ) -> Classification {
        if classification.retryable && self.exhausted(model, settings) {
            classification.exhausted()
        } else {
            classification
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn counters_only_increase() {
        let tracker = RetryTracker::new();
        assert_eq!(tracker.attempts("m"), 0);
        assert_eq!(tracker.record_attempt("m"), 1);
        assert_eq!(tracker.record_attempt("m"), 2);
        assert_eq!(tracker.attempts("m"), 2);
        // Other models are independent.
        assert_eq!(tracker.attempts("other"), 0);
    }

    #[test]
    fn budget_allows_initial_attempt_plus_cap() {
        let settings = RetrySettings::default(); // cap 2
        let tracker = RetryTracker::new();
        for _ in 0..3 {
            tracker.record_attempt("m");
            assert!(!tracker.exhausted("m", &settings));
        }
        tracker.record_attempt("m");
        assert!(tracker.exhausted("m", &settings));
    }

    #[test]
    fn exhausted_budget_downgrades_classification() {
        let settings = RetrySettings::default();
        let tracker = RetryTracker::new();
        for _ in 0..4 {
            tracker.record_attempt("m");
        }
        let c = Classification::new(ErrorKind::RateLimit, "slow down");
        let c = tracker.apply_budget("m", &settings, c);
        assert!(!c.retryable);
        assert!(c.message.contains("max retries exceeded"));

        // A non-retryable classification passes through unchanged.
        let c = Classification::new(ErrorKind::ApiKeyMissing, "no key");
        let c = tracker.apply_budget("m", &settings, c);
        assert_eq!(c.message, "no key");
    }
}
