//! Per-node retry configuration
//!
//! Parsed from the node's static config under the `retry` key on every
//! execution; there is no persistent entity.
//!
//! ```json
//! {
//!   "retry": { "maxRetries": 3, "backoffMs": 2000, "backoffMultiplier": 2.0 }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::graph::JsonMap;

const MAX_RETRIES_CEILING: u32 = 10;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Retry/backoff settings for a single node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the initial attempt; 0 means no retry. Clamped to
    /// [0, 10].
    pub max_retries: u32,
    /// Delay before the first retry attempt, in milliseconds.
    pub backoff_ms: u64,
    /// Multiplier applied to the delay after each failed attempt,
    /// e.g. 1000 ms with 2.0 → 1 s, 2 s, 4 s.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: DEFAULT_BACKOFF_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Parse from a node config map, clamping out-of-range values and
    /// falling back to defaults for anything missing or malformed.
    pub fn from_config(config: &JsonMap) -> Self {
        let mut parsed = Self::default();
        let Some(retry) = config.get("retry").and_then(|v| v.as_object()) else {
            return parsed;
        };

        if let Some(n) = retry.get("maxRetries").and_then(|v| v.as_i64()) {
            parsed.max_retries = n.clamp(0, MAX_RETRIES_CEILING as i64) as u32;
        }
        if let Some(n) = retry.get("backoffMs").and_then(|v| v.as_i64()) {
            if n > 0 {
                parsed.backoff_ms = n as u64;
            }
        }
        if let Some(m) = retry.get("backoffMultiplier").and_then(|v| v.as_f64()) {
            if m > 0.0 {
                parsed.backoff_multiplier = m;
            }
        }
        parsed
    }

    /// The delay for a given zero-based retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        delay.round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(retry: serde_json::Value) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("retry".into(), retry);
        map
    }

    #[test]
    fn test_defaults_without_retry_key() {
        let parsed = RetryConfig::from_config(&JsonMap::new());
        assert_eq!(parsed.max_retries, 0);
        assert_eq!(parsed.backoff_ms, 1000);
        assert_eq!(parsed.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_parses_all_fields() {
        let parsed = RetryConfig::from_config(&config(json!({
            "maxRetries": 3,
            "backoffMs": 250,
            "backoffMultiplier": 1.5,
        })));
        assert_eq!(parsed.max_retries, 3);
        assert_eq!(parsed.backoff_ms, 250);
        assert_eq!(parsed.backoff_multiplier, 1.5);
    }

    #[test]
    fn test_clamps_max_retries() {
        let parsed = RetryConfig::from_config(&config(json!({ "maxRetries": 99 })));
        assert_eq!(parsed.max_retries, 10);

        let parsed = RetryConfig::from_config(&config(json!({ "maxRetries": -1 })));
        assert_eq!(parsed.max_retries, 0);
    }

    #[test]
    fn test_rejects_non_positive_backoff() {
        let parsed = RetryConfig::from_config(&config(json!({
            "backoffMs": 0,
            "backoffMultiplier": -2.0,
        })));
        assert_eq!(parsed.backoff_ms, 1000);
        assert_eq!(parsed.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_delay_progression() {
        let retry = RetryConfig {
            max_retries: 2,
            backoff_ms: 100,
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.delay_for_attempt(0), 100);
        assert_eq!(retry.delay_for_attempt(1), 200);
        assert_eq!(retry.delay_for_attempt(2), 400);
    }
}
