//! Engine configuration

use std::time::Duration;

/// Tunable parameters for the sync engine.
///
/// The dedup window is deliberately configurable: 30 seconds is a heuristic
/// and may falsely merge rapid, legitimate repeat reports by the same user
/// at the same spot.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Two submissions by the same author, of the same type, in the same
    /// location cell, closer together than this are treated as one incident.
    pub dedup_window: Duration,
    /// Decimal places retained when rounding coordinates into a dedup cell.
    /// 3 places is roughly a 110 m cell.
    pub location_precision: u32,
    /// Per-attempt timeout for one submission tier (backend or host leg).
    pub request_timeout: Duration,
    /// Per-request timeout on the mesh proxy's accept side.
    pub proxy_timeout: Duration,
    /// Cadence of the offline queue drain timer.
    pub drain_interval: Duration,
    /// Cadence of the connectivity poll.
    pub poll_interval: Duration,
    /// Base delay before retrying a failed queue entry.
    pub backoff_base: Duration,
    /// Upper bound on the per-entry retry delay.
    pub backoff_cap: Duration,
    /// Maximum accepted size of a single mesh request or response.
    pub max_message_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(30),
            location_precision: 3,
            request_timeout: Duration::from_secs(5),
            proxy_timeout: Duration::from_secs(5),
            drain_interval: Duration::from_secs(15),
            poll_interval: Duration::from_secs(5),
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(300),
            max_message_bytes: 256 * 1024,
        }
    }
}

impl SyncConfig {
    /// Retry delay for a queue entry that has failed `attempts` times,
    /// doubling from the base and capped.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exp = attempts.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(1u32 << exp);
        delay.min(self.backoff_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_30s() {
        assert_eq!(SyncConfig::default().dedup_window, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.backoff_for(0), Duration::ZERO);
        assert_eq!(cfg.backoff_for(1), Duration::from_secs(2));
        assert_eq!(cfg.backoff_for(2), Duration::from_secs(4));
        assert_eq!(cfg.backoff_for(3), Duration::from_secs(8));
        assert_eq!(cfg.backoff_for(30), cfg.backoff_cap);
    }
}
