//! Full-snapshot rate limiting.

/// Suppresses world snapshots closer together than `min_interval_ms`,
/// no matter how many ticks mutate the world in between.
#[derive(Debug, Clone)]
pub struct BroadcastThrottler {
    min_interval_ms: u64,
    last_broadcast: Option<u64>,
}

impl BroadcastThrottler {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_broadcast: None,
        }
    }

    /// Claim the right to broadcast at `now_ms`. The first call always succeeds.
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        match self.last_broadcast {
            Some(last) if now_ms.saturating_sub(last) < self.min_interval_ms => false,
            _ => {
                self.last_broadcast = Some(now_ms);
                true
            }
        }
    }

    #[inline]
    pub fn last_broadcast(&self) -> Option<u64> {
        self.last_broadcast
    }

    #[inline]
    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }
}
