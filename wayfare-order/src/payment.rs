use std::sync::Arc;
use chrono::Duration;
use tracing::{info, warn};
use wayfare_core::{
    HandshakeError, HandshakeResult, PaymentService, PaymentSession, PaymentStatus, RetryPolicy,
    ReservationHold,
};
use crate::poller::{PollerConfig, PollerHandle, StatusPoller};

/// Owns the single active payment session of a hold and its poller
pub struct PaymentSessionManager {
    payments: Arc<dyn PaymentService>,
    expiry_tolerance: Duration,
    retry: RetryPolicy,
    active: Option<PaymentSession>,
    poller: Option<PollerHandle>,
}

impl PaymentSessionManager {
    pub fn new(payments: Arc<dyn PaymentService>, expiry_tolerance: Duration, retry: RetryPolicy) -> Self {
        Self {
            payments,
            expiry_tolerance,
            retry,
            active: None,
            poller: None,
        }
    }

    pub fn active(&self) -> Option<&PaymentSession> {
        self.active.as_ref()
    }

    /// Open a payment session for `hold.amount_due`.
    ///
    /// A session still pending locally is superseded: its poller is stopped
    /// and it is cancelled remotely before the new one is requested.
    pub async fn create_session(&mut self, hold: &ReservationHold) -> HandshakeResult<&PaymentSession> {
        if hold.amount_due < 0 {
            return Err(HandshakeError::Validation(format!("amount due {} is negative", hold.amount_due)));
        }

        if let Some(PaymentStatus::Completed) = self.active.as_ref().map(|s| s.status) {
            return Err(HandshakeError::TerminalPayment(PaymentStatus::Completed));
        }

        if let Some(previous) = self.active.take() {
            self.stop_poller();
            if !previous.status.is_terminal() {
                info!("Superseding payment {} for hold {}", previous.payment_id, previous.hold_id);
                self.cancel_remote(&previous.payment_id).await;
            }
        }

        let payments = Arc::clone(&self.payments);
        let hold_id = hold.hold_id.clone();
        let amount = hold.amount_due;
        let max_attempts = self.retry.max_attempts();
        let mut session = self.retry
            .run(|attempt| {
                let payments = Arc::clone(&payments);
                let hold_id = hold_id.clone();
                async move {
                    if attempt > 1 {
                        info!("Retrying payment session for hold {} (attempt {}/{})", hold_id, attempt, max_attempts);
                    }
                    payments.create_payment(&hold_id, amount).await
                }
            })
            .await?;

        if let Err(e) = check_session(&session, hold) {
            warn!("Discarding payment {}: {}", session.payment_id, e);
            self.cancel_remote(&session.payment_id).await;
            return Err(e);
        }

        let latest_allowed = hold.expires_at + self.expiry_tolerance;
        if session.expires_at > latest_allowed {
            warn!(
                "Payment {} expires at {}, after hold {} at {}; clamping to hold expiry",
                session.payment_id, session.expires_at, hold.hold_id, hold.expires_at
            );
            session.expires_at = hold.expires_at;
        }

        info!("Payment {} open for hold {} ({} {})", session.payment_id, hold.hold_id, amount, hold.currency);
        Ok(self.active.insert(session))
    }

    /// Start polling the active session, replacing any running poller
    pub fn start_poller(&mut self, config: PollerConfig) -> HandshakeResult<()> {
        let session = self.active.as_ref()
            .ok_or_else(|| HandshakeError::NotFound("no active payment session".to_string()))?;
        if session.status.is_terminal() {
            return Err(HandshakeError::TerminalPayment(session.status));
        }
        let payment_id = session.payment_id.clone();

        self.stop_poller();
        let poller = StatusPoller::new(Arc::clone(&self.payments), config);
        self.poller = Some(poller.spawn(&payment_id));
        Ok(())
    }

    pub fn poller_mut(&mut self) -> Option<&mut PollerHandle> {
        self.poller.as_mut()
    }

    pub fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }

    /// Ask the remote service for the active session's status once and
    /// record it when terminal
    pub async fn refresh(&mut self) -> HandshakeResult<PaymentStatus> {
        let payment_id = match self.active.as_ref() {
            Some(session) if session.status.is_terminal() => return Ok(session.status),
            Some(session) => session.payment_id.clone(),
            None => return Err(HandshakeError::NotFound("no active payment session".to_string())),
        };
        let status = self.payments.payment_status(&payment_id).await?;
        if status.is_terminal() {
            self.record(status);
        }
        Ok(status)
    }

    /// Record a terminal status observed elsewhere (poller, countdown)
    pub fn record(&mut self, status: PaymentStatus) {
        if let Some(session) = self.active.as_mut() {
            if !session.status.is_terminal() {
                session.status = status;
            }
        }
    }

    /// Stop polling and cancel the active session. The remote call is
    /// best-effort; a session already terminal is left untouched.
    pub async fn cancel(&mut self) {
        self.stop_poller();
        let pending = match self.active.as_ref() {
            Some(session) if !session.status.is_terminal() => session.payment_id.clone(),
            _ => return,
        };
        self.record(PaymentStatus::Cancelled);
        self.cancel_remote(&pending).await;
    }

    /// Mark the active session expired and cancel it remotely if it was
    /// still pending
    pub async fn expire(&mut self) {
        self.stop_poller();
        let pending = match self.active.as_ref() {
            Some(session) if !session.status.is_terminal() => session.payment_id.clone(),
            _ => return,
        };
        self.record(PaymentStatus::Expired);
        self.cancel_remote(&pending).await;
    }

    /// Forget the session without any remote call
    pub fn clear(&mut self) {
        self.stop_poller();
        self.active = None;
    }

    async fn cancel_remote(&self, payment_id: &str) {
        match self.payments.cancel_payment(payment_id).await {
            Ok(()) => info!("Payment {} cancelled", payment_id),
            Err(e) => warn!("Cancelling payment {} failed, continuing: {}", payment_id, e),
        }
    }
}

fn check_session(session: &PaymentSession, hold: &ReservationHold) -> HandshakeResult<()> {
    if !session.is_presentable() {
        return Err(HandshakeError::Transient(format!(
            "payment {} has neither QR payload nor checkout link",
            session.payment_id
        )));
    }
    if session.hold_id != hold.hold_id {
        return Err(HandshakeError::Transient(format!(
            "payment {} belongs to hold {}, expected {}",
            session.payment_id, session.hold_id, hold.hold_id
        )));
    }
    if session.amount != hold.amount_due {
        return Err(HandshakeError::Transient(format!(
            "payment {} is for {}, hold amount is {}",
            session.payment_id, session.amount, hold.amount_due
        )));
    }
    Ok(())
}
