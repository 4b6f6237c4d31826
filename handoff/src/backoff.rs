//! Timeouts and the progressive spin, yield, park backoff.

use std::hint;
use std::thread;
use std::time::Duration;

use minstant::Instant;

use crate::config::BackoffConfig;

const UNBOUNDED: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// How long a waiting operation may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl Timeout {
    /// Absolute deadline measured from now, `None` when unbounded.
    ///
    /// Durations of a century or more are treated as [`Timeout::Infinite`].
    #[must_use]
    pub fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            Self::Duration(d) if d >= UNBOUNDED => None,
            Self::Duration(d) => Instant::now().checked_add(d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Returns `true` once `deadline` has passed.
#[inline]
pub(crate) fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|dl| Instant::now() >= dl)
}

const MIN_PARK: Duration = Duration::from_micros(1);

/// Progressive waiting strategy for a retry loop.
///
/// Each call to [`Backoff::snooze`] is one failed attempt: the first
/// `spin_limit` attempts spin, attempts up to `yield_limit` yield the CPU, and
/// later attempts park for a duration that doubles up to `max_park`.
///
/// Parking uses [`thread::park_timeout`], so an [`crate::Interrupter`] wakes a
/// parked thread immediately.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
    park: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            config: *config,
            attempts: 0,
            park: MIN_PARK,
        }
    }

    /// Starts the schedule over, typically after the awaited state changed.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.park = MIN_PARK;
    }

    /// `true` once the schedule has moved past spinning and yielding.
    #[cfg(test)]
    fn is_parking(&self) -> bool {
        self.attempts >= self.config.yield_limit.max(self.config.spin_limit)
    }

    /// Waits one step. A park never extends past `deadline`.
    pub fn snooze(&mut self, deadline: Option<Instant>) {
        if self.attempts < self.config.spin_limit {
            hint::spin_loop();
        } else if self.attempts < self.config.yield_limit {
            thread::yield_now();
        } else {
            let mut park = self.park.min(self.config.max_park);
            if let Some(dl) = deadline {
                park = park.min(dl.saturating_duration_since(Instant::now()));
            }
            if !park.is_zero() {
                thread::park_timeout(park);
            }
            self.park = (self.park * 2).min(self.config.max_park.max(MIN_PARK));
        }
        self.attempts = self.attempts.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_has_no_deadline() {
        assert!(Timeout::Infinite.deadline().is_none());
        assert!(!expired(None));
    }

    #[test]
    fn test_huge_duration_is_unbounded() {
        assert!(Timeout::Duration(Duration::MAX).deadline().is_none());
    }

    #[test]
    fn test_zero_duration_expires_immediately() {
        let deadline = Timeout::from(Duration::ZERO).deadline();
        assert!(deadline.is_some());
        assert!(expired(deadline));
    }

    #[test]
    fn test_schedule_phases() {
        let config = BackoffConfig {
            spin_limit: 2,
            yield_limit: 4,
            max_park: Duration::from_micros(4),
        };
        let mut backoff = Backoff::new(&config);

        for _ in 0..4 {
            assert!(!backoff.is_parking());
            backoff.snooze(None);
        }
        assert!(backoff.is_parking());

        // Park duration doubles from 1us and saturates at max_park.
        backoff.snooze(None);
        assert_eq!(backoff.park, Duration::from_micros(2));
        backoff.snooze(None);
        backoff.snooze(None);
        assert_eq!(backoff.park, Duration::from_micros(4));

        backoff.reset();
        assert!(!backoff.is_parking());
        assert_eq!(backoff.park, MIN_PARK);
    }

    #[test]
    fn test_park_respects_deadline() {
        let config = BackoffConfig {
            spin_limit: 0,
            yield_limit: 0,
            max_park: Duration::from_secs(5),
        };
        let mut backoff = Backoff::new(&config);
        backoff.park = Duration::from_secs(5);

        let start = Instant::now();
        backoff.snooze(Some(start + Duration::from_millis(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
