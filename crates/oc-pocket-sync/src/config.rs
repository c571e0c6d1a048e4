//! Sync engine configuration.

use std::time::Duration;

/// What to do with a patch for a notification the engine has not seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownPatchPolicy {
    /// Fetch the full record, then apply the patch on top.
    #[default]
    Fetch,
    /// Drop the patch; the next resync picks the record up.
    Drop,
}

/// Tuning for [`crate::NotificationSyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records requested per page.
    pub page_size: u32,
    /// Delay before the first reconnect attempt.
    pub reconnect_delay: Duration,
    /// Upper bound for the doubling reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Fraction of the delay added or removed at random, so clients
    /// dropped together do not reconnect together.
    pub reconnect_jitter: f64,
    /// Number of recent proactive event ids remembered for de-duplication.
    pub proactive_window: usize,
    pub unknown_patch: UnknownPatchPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_delay: Duration::from_secs(60),
            reconnect_jitter: 0.2,
            proactive_window: 256,
            unknown_patch: UnknownPatchPolicy::Fetch,
        }
    }
}

impl SyncConfig {
    /// Next reconnect delay after `current`, capped at `max_reconnect_delay`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_reconnect_delay)
    }

    /// `delay` scaled by a random factor within `1 ± reconnect_jitter`.
    #[must_use]
    pub fn jittered(&self, delay: Duration) -> Duration {
        let spread = self.reconnect_jitter.clamp(0.0, 1.0);
        if spread.is_nan() || spread <= 0.0 {
            return delay;
        }
        let factor = rand::random::<f64>().mul_add(2.0 * spread, 1.0 - spread);
        delay.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = SyncConfig::default();
        let mut delay = config.reconnect_delay;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = config.next_delay(delay);
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = SyncConfig::default();
        let base = Duration::from_secs(10);
        for _ in 0..200 {
            let delay = config.jittered(base);
            assert!(delay >= Duration::from_secs(8), "{delay:?}");
            assert!(delay <= Duration::from_secs(12), "{delay:?}");
        }

        let exact = SyncConfig {
            reconnect_jitter: 0.0,
            ..SyncConfig::default()
        };
        assert_eq!(exact.jittered(base), base);
    }
}
