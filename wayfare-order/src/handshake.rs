use std::fmt;
use std::sync::Arc;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use wayfare_catalog::{AvailabilityResolver, Candidate, PricingEngine};
use wayfare_core::{
    BookingService, Clock, DateRange, HandshakeError, HandshakeResult, HoldStatus, ItemType,
    PaymentService, PaymentSession, PaymentStatus, Promotion, ReservationHold, RetryPolicy,
    SessionContext,
};
use wayfare_store::app_config::HandshakeSettings;
use crate::countdown::{Countdown, CountdownHandle};
use crate::payment::PaymentSessionManager;
use crate::poller::{PollOutcome, PollerConfig};
use crate::reservation::ReservationRequester;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    Resolving,
    AwaitingSelection,
    Reserving,
    PayingSetup,
    AwaitingPayment,
    Confirmed,
    Cancelled,
    Expired,
    Failed,
}

impl Phase {
    pub fn is_settled(&self) -> bool {
        matches!(self, Phase::Confirmed | Phase::Cancelled | Phase::Expired | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "IDLE",
            Phase::Resolving => "RESOLVING",
            Phase::AwaitingSelection => "AWAITING_SELECTION",
            Phase::Reserving => "RESERVING",
            Phase::PayingSetup => "PAYING_SETUP",
            Phase::AwaitingPayment => "AWAITING_PAYMENT",
            Phase::Confirmed => "CONFIRMED",
            Phase::Cancelled => "CANCELLED",
            Phase::Expired => "EXPIRED",
            Phase::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// How an attempt ended. Produced exactly once per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Settlement {
    Confirmed {
        hold: ReservationHold,
        payment_id: String,
        /// Payment completed after the hold's local expiry and the service
        /// confirmed the hold on re-verification
        reverified: bool,
    },
    Cancelled {
        hold_id: Option<String>,
    },
    Expired {
        hold_id: String,
    },
    Failed {
        hold_id: String,
        status: PaymentStatus,
    },
}

impl Settlement {
    pub fn phase(&self) -> Phase {
        match self {
            Settlement::Confirmed { .. } => Phase::Confirmed,
            Settlement::Cancelled { .. } => Phase::Cancelled,
            Settlement::Expired { .. } => Phase::Expired,
            Settlement::Failed { .. } => Phase::Failed,
        }
    }

    /// One-line summary for the traveler
    pub fn message(&self) -> String {
        match self {
            Settlement::Confirmed { hold, .. } => format!(
                "Reservation of {} for {} confirmed",
                hold.item_ref, hold.date_range
            ),
            Settlement::Cancelled { .. } => "Reservation cancelled".to_string(),
            Settlement::Expired { .. } => "The hold expired before payment completed".to_string(),
            Settlement::Failed { status, .. } => format!("Payment {:?}; the hold was released", status),
        }
    }

    /// The confirmed hold, or the terminal payment state that ended the attempt
    pub fn into_result(self) -> HandshakeResult<ReservationHold> {
        match self {
            Settlement::Confirmed { hold, .. } => Ok(hold),
            Settlement::Cancelled { .. } => Err(HandshakeError::TerminalPayment(PaymentStatus::Cancelled)),
            Settlement::Expired { .. } => Err(HandshakeError::TerminalPayment(PaymentStatus::Expired)),
            Settlement::Failed { status, .. } => Err(HandshakeError::TerminalPayment(status)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub poller: PollerConfig,
    /// Allowed excess of a payment session's expiry over its hold's
    pub expiry_tolerance: Duration,
    pub payment_retry: RetryPolicy,
    pub pricing: PricingEngine,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            expiry_tolerance: Duration::seconds(3),
            payment_retry: RetryPolicy::default(),
            pricing: PricingEngine::default(),
        }
    }
}

impl From<&HandshakeSettings> for HandshakeConfig {
    fn from(settings: &HandshakeSettings) -> Self {
        Self {
            poller: PollerConfig {
                interval: settings.poll_interval(),
                ceiling: settings.poll_ceiling(),
            },
            expiry_tolerance: settings.expiry_tolerance(),
            payment_retry: RetryPolicy::new(
                settings.payment_retry_attempts,
                settings.payment_retry_backoff(),
            ),
            pricing: PricingEngine::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub item_type: ItemType,
    pub range: DateRange,
    #[serde(default)]
    pub promotion: Option<Promotion>,
}

/// Requests cancellation of a running attempt from outside `settle()`
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

enum Event {
    Cancelled,
    TimedOut,
    Polled(PollOutcome),
}

type SettledCallback = Box<dyn FnOnce(&Settlement) + Send>;

/// Drives one reservation attempt from availability to settlement.
///
/// Every transition takes `&mut self`, so a second transition cannot start
/// while one is awaiting the remote service.
pub struct Handshake {
    ctx: SessionContext,
    resolver: AvailabilityResolver,
    requester: ReservationRequester,
    payments: PaymentSessionManager,
    clock: Arc<dyn Clock>,
    poller_config: PollerConfig,
    phase: Phase,
    request: Option<BookingRequest>,
    candidates: Vec<Candidate>,
    hold: Option<ReservationHold>,
    countdown: Option<CountdownHandle>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    on_settled: Option<SettledCallback>,
    settlement: Option<Settlement>,
}

impl Handshake {
    pub fn new(
        ctx: SessionContext,
        booking: Arc<dyn BookingService>,
        payments: Arc<dyn PaymentService>,
        clock: Arc<dyn Clock>,
        config: HandshakeConfig,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            ctx,
            resolver: AvailabilityResolver::new(Arc::clone(&booking), config.pricing),
            requester: ReservationRequester::new(booking, Arc::clone(&clock)),
            payments: PaymentSessionManager::new(payments, config.expiry_tolerance, config.payment_retry),
            clock,
            poller_config: config.poller,
            phase: Phase::Idle,
            request: None,
            candidates: Vec::new(),
            hold: None,
            countdown: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            on_settled: None,
            settlement: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn hold(&self) -> Option<&ReservationHold> {
        self.hold.as_ref()
    }

    pub fn session(&self) -> Option<&PaymentSession> {
        self.payments.active()
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    /// Remaining whole seconds while awaiting payment
    pub fn remaining(&self) -> Option<watch::Receiver<u64>> {
        self.countdown.as_ref().map(|c| c.remaining())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { tx: Arc::clone(&self.cancel_tx) }
    }

    /// Register the callback for this attempt's settlement. It runs at most once.
    pub fn on_settled<F>(&mut self, callback: F)
    where
        F: FnOnce(&Settlement) + Send + 'static,
    {
        self.on_settled = Some(Box::new(callback));
    }

    /// Idle -> Resolving -> AwaitingSelection, or back to Idle when nothing is free
    pub async fn resolve(&mut self, request: BookingRequest) -> HandshakeResult<&[Candidate]> {
        self.guard(&[Phase::Idle, Phase::AwaitingSelection], Phase::Resolving)?;
        self.enter(Phase::Resolving);

        match self.resolver.resolve(request.item_type, request.range).await {
            Ok(candidates) if candidates.is_empty() => {
                info!("No {} units free for {}", request.item_type, request.range);
                self.candidates.clear();
                self.request = None;
                self.enter(Phase::Idle);
            }
            Ok(candidates) => {
                self.candidates = candidates;
                self.request = Some(request);
                self.enter(Phase::AwaitingSelection);
            }
            Err(e) => {
                warn!("Resolving availability failed: {}", e);
                self.candidates.clear();
                self.request = None;
                self.enter(Phase::Idle);
                return Err(e);
            }
        }
        Ok(&self.candidates)
    }

    /// AwaitingSelection -> Reserving -> PayingSetup. A conflict or any other
    /// failure returns to AwaitingSelection; a conflicted unit is dropped
    /// from the candidates.
    pub async fn select(&mut self, unit_id: &str) -> HandshakeResult<&ReservationHold> {
        self.guard(&[Phase::AwaitingSelection], Phase::Reserving)?;
        let request = self.request.clone()
            .ok_or_else(|| HandshakeError::NotFound("no booking request".to_string()))?;
        if !self.candidates.iter().any(|c| c.unit.unit_id == unit_id) {
            return Err(HandshakeError::Validation(format!(
                "unit {} is not among the available units",
                unit_id
            )));
        }

        self.enter(Phase::Reserving);
        let reserved = self.requester
            .reserve(&self.ctx, unit_id, request.range, request.promotion.as_ref())
            .await;

        match reserved {
            Ok(hold) => {
                self.enter(Phase::PayingSetup);
                Ok(self.hold.insert(hold))
            }
            Err(e) => {
                if matches!(e, HandshakeError::Conflict { .. }) {
                    self.candidates.retain(|c| c.unit.unit_id != unit_id);
                }
                self.enter(Phase::AwaitingSelection);
                Err(e)
            }
        }
    }

    /// PayingSetup -> AwaitingPayment, starting the countdown and the poller.
    ///
    /// If session creation fails the attempt falls back to Reserving with the
    /// hold kept, and this can be called again without re-resolving.
    pub async fn open_payment(&mut self) -> HandshakeResult<&PaymentSession> {
        let hold = match (&self.phase, &self.hold) {
            (Phase::PayingSetup | Phase::Reserving, Some(hold)) => hold.clone(),
            _ => return Err(self.invalid(Phase::AwaitingPayment)),
        };

        if hold.is_expired_at(self.clock.now()) {
            warn!("Hold {} expired before a payment session was opened", hold.hold_id);
            let settlement = self.expire(&hold).await;
            self.finish(settlement);
            return Err(HandshakeError::TerminalPayment(PaymentStatus::Expired));
        }

        self.enter(Phase::PayingSetup);
        let expires_at = match self.payments.create_session(&hold).await {
            Ok(session) => session.expires_at,
            Err(e) => {
                warn!("Payment session for hold {} failed: {}", hold.hold_id, e);
                self.enter(Phase::Reserving);
                return Err(e);
            }
        };

        if let Err(e) = self.payments.start_poller(self.poller_config) {
            self.enter(Phase::Reserving);
            return Err(e);
        }
        let deadline = expires_at.min(hold.expires_at);
        self.countdown = Some(Countdown::new(deadline, Arc::clone(&self.clock)).spawn());
        self.enter(Phase::AwaitingPayment);

        self.payments.active()
            .ok_or_else(|| HandshakeError::NotFound("no active payment session".to_string()))
    }

    /// Wait for the first of user cancel, countdown expiry or a terminal poll.
    ///
    /// Calling again after settlement returns the same settlement.
    pub async fn settle(&mut self) -> HandshakeResult<Settlement> {
        if let Some(settlement) = &self.settlement {
            return Ok(settlement.clone());
        }
        self.guard(&[Phase::AwaitingPayment], Phase::Confirmed)?;
        let hold = self.hold.clone()
            .ok_or_else(|| HandshakeError::NotFound("no reservation hold".to_string()))?;

        let event = {
            let countdown = self.countdown.as_mut()
                .ok_or_else(|| HandshakeError::NotFound("countdown not running".to_string()))?;
            let poller = self.payments.poller_mut()
                .ok_or_else(|| HandshakeError::NotFound("poller not running".to_string()))?;
            let mut cancel = self.cancel_rx.clone();

            tokio::select! {
                biased;
                _ = cancel_requested(&mut cancel) => Event::Cancelled,
                _ = countdown.expired() => Event::TimedOut,
                Some(outcome) = poller.outcome() => Event::Polled(outcome),
            }
        };

        let settlement = self.resolve_event(&hold, event).await;
        Ok(self.finish(settlement))
    }

    /// User cancel outside `settle()`. Releases whatever was acquired and
    /// always reaches Cancelled; cancelling twice returns the first result.
    pub async fn cancel(&mut self) -> HandshakeResult<Settlement> {
        if let (Phase::Cancelled, Some(settlement)) = (self.phase, &self.settlement) {
            return Ok(settlement.clone());
        }
        if self.phase == Phase::Idle || self.phase.is_settled() {
            return Err(self.invalid(Phase::Cancelled));
        }
        let settlement = self.cancelled().await;
        Ok(self.finish(settlement))
    }

    /// Return a settled attempt to Idle so the same session can try again
    pub fn reset(&mut self) -> HandshakeResult<()> {
        if !(self.phase == Phase::Idle || self.phase.is_settled()) {
            return Err(self.invalid(Phase::Idle));
        }
        self.countdown = None;
        self.payments.clear();
        self.hold = None;
        self.candidates.clear();
        self.request = None;
        self.settlement = None;
        self.on_settled = None;
        self.cancel_tx.send_replace(false);
        self.enter(Phase::Idle);
        Ok(())
    }

    /// Run a whole attempt. `choose` picks a unit from the candidates, or
    /// `None` to give up (which settles as Cancelled). A unit lost to a
    /// conflict triggers a fresh resolve.
    pub async fn begin<F>(&mut self, request: BookingRequest, mut choose: F) -> HandshakeResult<Settlement>
    where
        F: FnMut(&[Candidate]) -> Option<String>,
    {
        let mut resolved = self.resolve(request.clone()).await?.to_vec();
        loop {
            if resolved.is_empty() {
                return Err(HandshakeError::NotFound(format!(
                    "no {} available for {}",
                    request.item_type, request.range
                )));
            }
            if self.cancel_handle().is_requested() {
                return self.cancel().await;
            }
            let Some(unit_id) = choose(&resolved) else {
                return self.cancel().await;
            };

            match self.select(&unit_id).await {
                Ok(_) => break,
                Err(HandshakeError::Conflict { .. }) => {
                    info!("Unit {} was taken, resolving again", unit_id);
                    resolved = self.resolve(request.clone()).await?.to_vec();
                }
                Err(e) => return Err(e),
            }
        }

        if self.cancel_handle().is_requested() {
            return self.cancel().await;
        }
        self.open_payment().await?;
        self.settle().await
    }

    async fn resolve_event(&mut self, hold: &ReservationHold, event: Event) -> Settlement {
        match event {
            Event::Cancelled => self.cancelled().await,
            Event::TimedOut => {
                info!("Countdown for hold {} reached zero", hold.hold_id);
                self.lapse(hold).await
            }
            Event::Polled(outcome) => match outcome.status {
                PaymentStatus::Completed => {
                    self.payments.record(PaymentStatus::Completed);
                    self.confirm(hold).await
                }
                status @ (PaymentStatus::Failed | PaymentStatus::Cancelled) => self.failed(hold, status).await,
                PaymentStatus::Expired | PaymentStatus::Pending => self.lapse(hold).await,
            },
        }
    }

    /// Local time ran out. The remote status is read once more so a payment
    /// that completed on the final tick still confirms.
    async fn lapse(&mut self, hold: &ReservationHold) -> Settlement {
        self.payments.stop_poller();
        match self.payments.refresh().await {
            Ok(PaymentStatus::Completed) => {
                info!("Payment for hold {} completed at expiry", hold.hold_id);
                self.confirm(hold).await
            }
            Ok(status @ (PaymentStatus::Failed | PaymentStatus::Cancelled)) => self.failed(hold, status).await,
            Ok(_) => self.expire(hold).await,
            Err(e) => {
                warn!("Final status check for hold {} failed: {}", hold.hold_id, e);
                self.expire(hold).await
            }
        }
    }

    async fn failed(&mut self, hold: &ReservationHold, status: PaymentStatus) -> Settlement {
        self.payments.record(status);
        self.payments.stop_poller();
        self.countdown = None;
        self.requester.release(&hold.hold_id).await;
        Settlement::Failed { hold_id: hold.hold_id.clone(), status }
    }

    async fn confirm(&mut self, hold: &ReservationHold) -> Settlement {
        self.countdown = None;
        let payment_id = self.payments.active()
            .map(|s| s.payment_id.clone())
            .unwrap_or_default();
        let confirmed = |reverified| Settlement::Confirmed {
            hold: hold.clone(),
            payment_id: payment_id.clone(),
            reverified,
        };

        if !hold.is_expired_at(self.clock.now()) {
            return confirmed(false);
        }

        warn!(
            "Payment {} completed after hold {} expired at {}, re-verifying",
            payment_id, hold.hold_id, hold.expires_at
        );
        match self.requester.verify(&hold.hold_id).await {
            Ok(HoldStatus::Confirmed) => {
                warn!("Hold {} confirmed on re-verification", hold.hold_id);
                confirmed(true)
            }
            Ok(status) => {
                error!("Payment {} completed but hold {} is {:?}", payment_id, hold.hold_id, status);
                Settlement::Expired { hold_id: hold.hold_id.clone() }
            }
            Err(e) => {
                error!("Re-verifying hold {} failed: {}", hold.hold_id, e);
                Settlement::Expired { hold_id: hold.hold_id.clone() }
            }
        }
    }

    async fn expire(&mut self, hold: &ReservationHold) -> Settlement {
        self.countdown = None;
        self.payments.expire().await;
        if !hold.is_expired_at(self.clock.now()) {
            // the session lapsed first; the hold would otherwise linger
            self.requester.release(&hold.hold_id).await;
        }
        Settlement::Expired { hold_id: hold.hold_id.clone() }
    }

    async fn cancelled(&mut self) -> Settlement {
        self.countdown = None;
        self.payments.cancel().await;
        let hold_id = self.hold.as_ref().map(|h| h.hold_id.clone());
        if let Some(id) = &hold_id {
            self.requester.release(id).await;
        }
        Settlement::Cancelled { hold_id }
    }

    fn finish(&mut self, settlement: Settlement) -> Settlement {
        self.countdown = None;
        self.payments.stop_poller();
        self.enter(settlement.phase());
        info!("Handshake for {} settled: {}", self.ctx.traveler_id, settlement.message());

        if let Some(callback) = self.on_settled.take() {
            callback(&settlement);
        }
        self.settlement = Some(settlement.clone());
        settlement
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Handshake {}: {} -> {}", self.ctx.traveler_id, self.phase, phase);
            self.phase = phase;
        }
    }

    fn guard(&self, allowed: &[Phase], to: Phase) -> HandshakeResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: Phase) -> HandshakeError {
        HandshakeError::InvalidTransition {
            from: self.phase.to_string(),
            to: to.to_string(),
        }
    }
}
