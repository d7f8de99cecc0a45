use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use wayfare_core::Clock;

/// Countdown to an absolute expiry.
///
/// Remaining time is always recomputed as `expires_at - now()`, never kept as
/// a decrementing counter, so a process that was suspended sees the correct
/// (possibly zero) value on its next tick.
#[derive(Clone)]
pub struct Countdown {
    expires_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
}

impl Countdown {
    pub fn new(expires_at: DateTime<Utc>, clock: Arc<dyn Clock>) -> Self {
        Self { expires_at, clock }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whole seconds left, rounded up; zero once expired
    pub fn remaining_secs(&self) -> u64 {
        let left = self.expires_at - self.clock.now();
        if left <= Duration::zero() {
            0
        } else {
            ceil_secs(left) as u64
        }
    }

    pub fn is_expired(&self) -> bool {
        self.clock.now() >= self.expires_at
    }

    /// Start ticking on a background task
    pub fn spawn(self) -> CountdownHandle {
        let (expired_tx, expired_rx) = oneshot::channel();
        let (remaining_tx, remaining_rx) = watch::channel(self.remaining_secs());
        let expires_at = self.expires_at;

        let task = tokio::spawn(async move {
            loop {
                let now = self.clock.now();
                if now >= self.expires_at {
                    publish(&remaining_tx, 0);
                    debug!("Countdown to {} reached zero", self.expires_at);
                    let _ = expired_tx.send(now);
                    return;
                }

                let left = self.expires_at - now;
                let remaining = ceil_secs(left);
                publish(&remaining_tx, remaining as u64);

                // Wake on the next whole-second boundary before expiry
                let to_next = left - Duration::seconds(remaining - 1);
                let pause = to_next.to_std().unwrap_or(std::time::Duration::from_millis(1));
                tokio::time::sleep(pause).await;
            }
        });

        CountdownHandle {
            task,
            expired: Some(expired_rx),
            remaining: remaining_rx,
            expires_at,
        }
    }
}

/// Notify watchers only when the displayed value changes
fn publish(tx: &watch::Sender<u64>, value: u64) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

fn ceil_secs(left: Duration) -> i64 {
    let whole = left.num_seconds();
    if left > Duration::seconds(whole) {
        whole + 1
    } else {
        whole
    }
}

/// Owns a running countdown. Dropping it stops the ticks.
pub struct CountdownHandle {
    task: JoinHandle<()>,
    expired: Option<oneshot::Receiver<DateTime<Utc>>>,
    remaining: watch::Receiver<u64>,
    expires_at: DateTime<Utc>,
}

impl CountdownHandle {
    /// Resolves once, at the tick that crosses zero, with the observed time.
    /// Later calls never resolve.
    pub async fn expired(&mut self) -> DateTime<Utc> {
        if let Some(rx) = self.expired.as_mut() {
            let fired = rx.await;
            self.expired = None;
            if let Ok(at) = fired {
                return at;
            }
        }
        std::future::pending().await
    }

    /// Live view of the remaining whole seconds
    pub fn remaining(&self) -> watch::Receiver<u64> {
        self.remaining.clone()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use wayfare_core::TokioClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(TokioClock::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_not_before_expiry() {
        let clock = clock();
        let expires_at = clock.now() + Duration::milliseconds(2_500);
        let mut handle = Countdown::new(expires_at, clock.clone()).spawn();

        let fired_at = handle.expired().await;
        assert!(fired_at >= expires_at);
        assert!(clock.now() >= expires_at);

        // second wait never resolves
        let again = tokio::time::timeout(StdDuration::from_secs(30), handle.expired()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_ticks_down() {
        let clock = clock();
        let expires_at = clock.now() + Duration::seconds(3);
        let handle = Countdown::new(expires_at, clock.clone()).spawn();
        let mut remaining = handle.remaining();
        assert_eq!(*remaining.borrow(), 3);

        let mut seen = Vec::new();
        while remaining.changed().await.is_ok() {
            let value = *remaining.borrow();
            seen.push(value);
            if value == 0 {
                break;
            }
        }
        assert_eq!(seen, vec![2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_expired_fires_immediately() {
        let clock = clock();
        let countdown = Countdown::new(clock.now() - Duration::seconds(5), clock);
        assert_eq!(countdown.remaining_secs(), 0);
        assert!(countdown.is_expired());

        let mut handle = countdown.spawn();
        tokio::time::timeout(StdDuration::from_millis(10), handle.expired())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_derived_from_absolute_expiry() {
        let clock = clock();
        let countdown = Countdown::new(clock.now() + Duration::seconds(60), clock);
        assert_eq!(countdown.remaining_secs(), 60);

        // suspension: the clock moves without any ticks being observed
        tokio::time::advance(StdDuration::from_millis(59_400)).await;
        assert_eq!(countdown.remaining_secs(), 1);

        tokio::time::advance(StdDuration::from_secs(5)).await;
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_expiry() {
        let clock = clock();
        let mut handle = Countdown::new(clock.now() + Duration::seconds(2), clock).spawn();
        handle.stop();

        let result = tokio::time::timeout(StdDuration::from_secs(10), handle.expired()).await;
        assert!(result.is_err());
    }
}
