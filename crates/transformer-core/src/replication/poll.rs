//! Cooperative repeating task driven by elapsed time.

use std::time::Duration;

/// Outcome of advancing a [`PollTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTick {
    /// Not due yet.
    Idle,
    /// The interval elapsed: check the condition now.
    Fire,
    /// The task ran past its maximum wait and should stop.
    Expired,
}

/// A task that fires once immediately and then every `interval`, until the
/// owner drops it or `max_wait` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTask {
    interval: Duration,
    max_wait: Duration,
    elapsed: Duration,
    until_next: Duration,
}

impl PollTask {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval,
            max_wait,
            elapsed: Duration::ZERO,
            until_next: Duration::ZERO,
        }
    }

    /// Time since the task started.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn advance(&mut self, dt: Duration) -> PollTick {
        self.elapsed += dt;
        if self.elapsed > self.max_wait {
            return PollTick::Expired;
        }
        if dt >= self.until_next {
            // several missed intervals still fire once
            let overshoot = dt - self.until_next;
            let interval = self.interval.max(Duration::from_millis(1));
            let remainder = Duration::from_nanos((overshoot.as_nanos() % interval.as_nanos()) as u64);
            self.until_next = interval - remainder;
            PollTick::Fire
        } else {
            self.until_next -= dt;
            PollTick::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_fires_immediately_then_on_interval() {
        let mut task = PollTask::new(ms(50), ms(1000));
        assert_eq!(task.advance(Duration::ZERO), PollTick::Fire);
        assert_eq!(task.advance(ms(20)), PollTick::Idle);
        assert_eq!(task.advance(ms(20)), PollTick::Idle);
        assert_eq!(task.advance(ms(10)), PollTick::Fire);
        assert_eq!(task.advance(ms(49)), PollTick::Idle);
        assert_eq!(task.elapsed(), ms(99));
    }

    #[test]
    fn test_long_frame_fires_once() {
        let mut task = PollTask::new(ms(50), ms(1000));
        task.advance(Duration::ZERO);
        assert_eq!(task.advance(ms(170)), PollTick::Fire);
        // 170 = 3 intervals + 20: next fire in 30
        assert_eq!(task.advance(ms(29)), PollTick::Idle);
        assert_eq!(task.advance(ms(1)), PollTick::Fire);
    }

    #[test]
    fn test_expires_after_max_wait() {
        let mut task = PollTask::new(ms(50), ms(100));
        assert_eq!(task.advance(ms(100)), PollTick::Fire);
        assert_eq!(task.advance(ms(1)), PollTick::Expired);
    }
}
