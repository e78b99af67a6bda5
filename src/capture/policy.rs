//! Playback retry policy

use std::time::Duration;

/// How hard to try before asking the user to start the camera by hand
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPolicy {
    /// Play attempts before giving up
    pub max_attempts: u32,
    /// Pause between failed play attempts
    pub retry_delay: Duration,
    /// Readiness checks, as offsets from successful playback
    pub readiness_checks: Vec<Duration>,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_millis(500),
            readiness_checks: [300, 800, 1500, 3000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

impl PlaybackPolicy {
    /// Delay before attempt `attempt` (1-based), `None` once attempts are exhausted
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        match attempt {
            0 => None,
            1 => Some(Duration::ZERO),
            n if n <= self.max_attempts => Some(self.retry_delay),
            _ => None,
        }
    }

    /// Sleep durations between successive readiness checks
    pub fn readiness_waits(&self) -> Vec<Duration> {
        let mut elapsed = Duration::ZERO;
        self.readiness_checks
            .iter()
            .map(|at| {
                let wait = at.saturating_sub(elapsed);
                elapsed = elapsed.max(*at);
                wait
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_schedule() {
        let policy = PlaybackPolicy::default();
        assert_eq!(policy.delay_before(1), Some(Duration::ZERO));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_before(5), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_before(6), None);
        assert_eq!(policy.delay_before(0), None);
    }

    #[test]
    fn test_readiness_waits_are_incremental() {
        let waits: Vec<u64> = PlaybackPolicy::default()
            .readiness_waits()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(waits, vec![300, 500, 700, 1500]);
    }

    #[test]
    fn test_unsorted_checks_never_wait_negative() {
        let policy = PlaybackPolicy {
            readiness_checks: vec![Duration::from_millis(50), Duration::from_millis(10)],
            ..PlaybackPolicy::default()
        };
        assert_eq!(
            policy.readiness_waits(),
            vec![Duration::from_millis(50), Duration::ZERO]
        );
    }
}
