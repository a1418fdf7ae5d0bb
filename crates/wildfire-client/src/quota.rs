//! Cumulative request quota gate
//!
//! Mirrors the remote service's request quota locally: past the ceiling, all
//! senders hold off until the next reset point. The reset cadence is a policy
//! parameter (`reset_after`, one hour by default) measured from the moment of
//! the breach — a rolling period, not a wall-clock hour boundary.
//!
//! The gate also closes without a configured ceiling when every API key
//! rejects within one rotation round; the pipeline calls
//! [`QuotaGate::breach`] directly for that.

use std::time::{Duration, Instant};

use tracing::info;

/// Default reset period, matching the service's hourly quota cadence.
pub const DEFAULT_RESET_AFTER: Duration = Duration::from_secs(3600);

pub struct QuotaGate {
    ceiling: Option<u64>,
    reset_after: Duration,
    usage: u64,
    wait_until: Option<Instant>,
}

impl QuotaGate {
    /// `None` disables usage counting; `breach` still closes the gate.
    pub fn new(ceiling: Option<u64>, reset_after: Duration) -> Self {
        Self {
            ceiling,
            reset_after,
            usage: 0,
            wait_until: None,
        }
    }

    /// Count one request against the quota. `Some(wait)` means the gate is
    /// closed: the caller must suspend for `wait` before sending. The
    /// deadline is cleared here — the serialized caller is guaranteed to
    /// sleep it out before the next admission.
    pub fn admit(&mut self, now: Instant) -> Option<Duration> {
        if let Some(ceiling) = self.ceiling {
            self.usage += 1;
            if self.usage > ceiling {
                self.breach(now);
            }
        }
        let until = self.wait_until.take()?;
        until.checked_duration_since(now)
    }

    /// Close the gate until the next reset point. A breach while the gate is
    /// already closed leaves the existing deadline untouched. Usage restarts
    /// from zero for the period after the reset.
    pub fn breach(&mut self, now: Instant) {
        if self.wait_until.is_some() {
            return;
        }
        info!(
            reset_in_secs = self.reset_after.as_secs(),
            "request quota exhausted, closing gate"
        );
        self.wait_until = Some(now + self.reset_after);
        self.usage = 0;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.wait_until
    }

    pub fn usage(&self) -> u64 {
        self.usage
    }
}
