//! Fixed-period timer polled from a tick loop

use std::time::{Duration, Instant};

/// Fires at most once per poll, every `period`.
///
/// Deadlines advance from the previous deadline rather than from the poll
/// time, so a steady tick loop does not drift. After a stall the timer fires
/// on consecutive polls until it has caught up.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next_fire: Option<Instant>,
}

impl IntervalTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_fire: None,
        }
    }

    /// Arms the timer with its first deadline at `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_fire = Some(now);
    }

    pub fn stop(&mut self) {
        self.next_fire = None;
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_fire {
            Some(deadline) if now >= deadline => {
                self.next_fire = Some(deadline + self.period);
                true
            }
            _ => false,
        }
    }
}
