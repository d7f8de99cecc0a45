use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock source for expiry arithmetic
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock. Jumps forward after process suspension.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock advanced by tokio's `Instant`, so it follows paused test time.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor_instant: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor_instant.elapsed();
        match chrono::Duration::from_std(elapsed) {
            Ok(delta) => self.anchor_wall + delta,
            Err(_) => DateTime::<Utc>::MAX_UTC,
        }
    }
}

/// Time left until `deadline`, zero once it has passed
pub fn until(clock: &dyn Clock, deadline: DateTime<Utc>) -> std::time::Duration {
    (deadline - clock.now()).to_std().unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let t0 = clock.now();

        tokio::time::advance(Duration::from_secs(90)).await;

        assert_eq!((clock.now() - t0).num_seconds(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_saturates_at_zero() {
        let clock = TokioClock::new();
        let deadline = clock.now() + chrono::Duration::seconds(5);
        assert_eq!(until(&clock, deadline), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(until(&clock, deadline), Duration::ZERO);
    }
}
