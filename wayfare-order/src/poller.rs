use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use wayfare_core::{PaymentService, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Pause between status reads; the first read happens one interval after start
    pub interval: Duration,
    /// Give up after this long and treat the session as expired
    pub ceiling: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            ceiling: Duration::from_secs(120),
        }
    }
}

/// Final result of a polling run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// Always terminal
    pub status: PaymentStatus,
    /// Status reads issued, failed ones included
    pub polls: u32,
    /// No terminal status was seen before the ceiling
    pub ceiling_reached: bool,
}

/// Repeatedly reads a payment session's status until it settles
pub struct StatusPoller {
    payments: Arc<dyn PaymentService>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(payments: Arc<dyn PaymentService>, config: PollerConfig) -> Self {
        Self { payments, config }
    }

    /// Start polling `payment_id` on a background task
    pub fn spawn(&self, payment_id: &str) -> PollerHandle {
        let (tx, rx) = oneshot::channel();
        let payments = Arc::clone(&self.payments);
        let config = self.config;
        let id = payment_id.to_string();

        let task = tokio::spawn(async move {
            let outcome = poll_until_terminal(payments.as_ref(), &id, config).await;
            info!(
                "Payment {} polling finished: {:?} after {} poll(s){}",
                id, outcome.status, outcome.polls,
                if outcome.ceiling_reached { " (ceiling)" } else { "" }
            );
            let _ = tx.send(outcome);
        });

        PollerHandle {
            task,
            outcome: Some(rx),
        }
    }
}

async fn poll_until_terminal(payments: &dyn PaymentService, payment_id: &str, config: PollerConfig) -> PollOutcome {
    let start = Instant::now();
    let deadline = start + config.ceiling;
    let mut ticker = interval_at(start + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0;

    let polling = async {
        loop {
            ticker.tick().await;
            polls += 1;
            match payments.payment_status(payment_id).await {
                Ok(status) if status.is_terminal() => return status,
                Ok(_) => debug!("Payment {} still pending (poll {})", payment_id, polls),
                Err(e) if e.is_transient() => {
                    warn!("Status poll {} for payment {} failed: {}", polls, payment_id, e)
                }
                Err(e) => {
                    error!("Payment {} cannot be polled, giving up: {}", payment_id, e);
                    return PaymentStatus::Failed;
                }
            }
        }
    };

    let settled = timeout_at(deadline, polling).await;
    match settled {
        Ok(status) => PollOutcome { status, polls, ceiling_reached: false },
        Err(_) => PollOutcome { status: PaymentStatus::Expired, polls, ceiling_reached: true },
    }
}

/// Owns a running poller. Dropping it stops polling.
pub struct PollerHandle {
    task: JoinHandle<()>,
    outcome: Option<oneshot::Receiver<PollOutcome>>,
}

impl PollerHandle {
    /// Resolves once with the terminal outcome. Returns `None` if the poller
    /// was stopped first; later calls never resolve.
    pub async fn outcome(&mut self) -> Option<PollOutcome> {
        if let Some(rx) = self.outcome.as_mut() {
            let result = rx.await;
            self.outcome = None;
            return result.ok();
        }
        std::future::pending().await
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
