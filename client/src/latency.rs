//! Round-trip estimate from client-initiated pings
//!
//! Pings carry no payload, so an echo is matched to the most recent ping in
//! flight. A ping that is still unanswered when the next one goes out is
//! counted as lost.

use std::time::{Duration, Instant};

/// Weight of a new sample in the smoothed estimate.
const SMOOTHING: f64 = 0.125;

#[derive(Debug, Default)]
pub struct LatencyEstimator {
    in_flight: Option<Instant>,
    last_sample: Option<Duration>,
    smoothed: Option<Duration>,
    samples: u64,
    lost: u64,
}

impl LatencyEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ping_sent(&mut self, now: Instant) {
        if self.in_flight.replace(now).is_some() {
            self.lost += 1;
        }
    }

    /// Records an echo and returns the new one-way latency estimate.
    ///
    /// Returns `None` for an echo with no ping in flight.
    pub fn pong_received(&mut self, now: Instant) -> Option<Duration> {
        let sent_at = self.in_flight.take()?;
        let one_way = now.saturating_duration_since(sent_at) / 2;

        self.last_sample = Some(one_way);
        self.samples += 1;
        let smoothed = match self.smoothed {
            None => one_way,
            Some(previous) => Duration::from_secs_f64(
                previous.as_secs_f64() * (1.0 - SMOOTHING) + one_way.as_secs_f64() * SMOOTHING,
            ),
        };
        self.smoothed = Some(smoothed);
        Some(smoothed)
    }

    /// Smoothed one-way latency, half the round trip.
    pub fn latency(&self) -> Option<Duration> {
        self.smoothed
    }

    pub fn last_sample(&self) -> Option<Duration> {
        self.last_sample
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_round_trip() {
        let start = Instant::now();
        let mut estimator = LatencyEstimator::new();

        estimator.ping_sent(start);
        let latency = estimator.pong_received(start + Duration::from_millis(80));

        assert_eq!(latency, Some(Duration::from_millis(40)));
        assert_eq!(estimator.last_sample(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_stray_echo_is_ignored() {
        let mut estimator = LatencyEstimator::new();
        assert_eq!(estimator.pong_received(Instant::now()), None);
        assert_eq!(estimator.latency(), None);
    }

    #[test]
    fn test_unanswered_ping_counts_as_lost() {
        let start = Instant::now();
        let mut estimator = LatencyEstimator::new();

        estimator.ping_sent(start);
        estimator.ping_sent(start + Duration::from_millis(2500));
        estimator.pong_received(start + Duration::from_millis(2560));

        assert_eq!(estimator.lost(), 1);
        assert_eq!(estimator.last_sample(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn test_smoothing_moves_towards_new_samples() {
        let start = Instant::now();
        let mut estimator = LatencyEstimator::new();

        estimator.ping_sent(start);
        estimator.pong_received(start + Duration::from_millis(100));
        estimator.ping_sent(start);
        let smoothed = estimator
            .pong_received(start + Duration::from_millis(300))
            .unwrap();

        // 50ms then 150ms samples
        assert!(smoothed > Duration::from_millis(50));
        assert!(smoothed < Duration::from_millis(150));
        assert_eq!(estimator.samples(), 2);
    }
}
