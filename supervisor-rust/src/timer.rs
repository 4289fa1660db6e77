//! # timer
//!
//! Polled countdown timers. A timer carries no callback and no thread; the
//! periodic decision cycle asks whether it has overflowed.
//!
//! Resets are timestamped: [`Countdown::reset`] only ever moves the reset
//! instant forward, so a heartbeat processed late can never undo a newer one.

use std::time::{Duration, Instant};

/// Fixed cooldown between failure-recovery attempts.
pub const FAIL_RETRY_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    top: Duration,
    last_reset: Instant,
}

impl Countdown {
    /// A countdown that starts running at `now`.
    pub fn new(top: Duration, now: Instant) -> Self {
        Self { top, last_reset: now }
    }

    pub fn top(&self) -> Duration {
        self.top
    }

    pub fn last_reset(&self) -> Instant {
        self.last_reset
    }

    /// Restart the countdown from `at`. Older instants are ignored.
    pub fn reset(&mut self, at: Instant) {
        if at > self.last_reset {
            self.last_reset = at;
        }
    }

    /// Change the top value and restart, so a shorter top never turns a
    /// running countdown into an overflowed one on the spot.
    pub fn set_top(&mut self, top: Duration, now: Instant) {
        self.top = top;
        self.reset(now);
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_reset)
    }

    pub fn overflow(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.top
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.top.saturating_sub(self.elapsed(now))
    }
}

/// The supervisor's two timers.
#[derive(Debug, Clone)]
pub struct TimerBank {
    /// Lost operator communications
    pub comms: Countdown,
    /// Cooldown before another failure-recovery directive
    pub fail: Countdown,
}

impl TimerBank {
    pub fn new(lost_comms_timeout: Duration, now: Instant) -> Self {
        Self {
            comms: Countdown::new(lost_comms_timeout, now),
            fail: Countdown::new(FAIL_RETRY_COOLDOWN, now),
        }
    }
}
