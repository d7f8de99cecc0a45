use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wayfare_catalog::PricingEngine;
use wayfare_core::{
    BookingService, Clock, DateRange, HandshakeError, HandshakeResult, HoldReply, HoldStatus,
    ItemType, PaymentService, PaymentSession, PaymentStatus, Promotion, ReservationHold,
    SessionContext, UnitAvailability, UnitDescriptor,
};

/// Remote calls the in-memory service can count and fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListUnits,
    CreateHold,
    CancelHold,
    VerifyHold,
    CreatePayment,
    PaymentStatus,
    CancelPayment,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub hold_ttl: Duration,
    pub payment_ttl: Duration,
    pub currency: String,
    pub checkout_base_url: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::minutes(10),
            payment_ttl: Duration::seconds(120),
            currency: "VND".to_string(),
            checkout_base_url: "https://pay.wayfare.local/checkout".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct HoldRecord {
    hold: ReservationHold,
    owner: String,
    status: HoldStatus,
}

#[derive(Default)]
struct State {
    units: BTreeMap<String, UnitDescriptor>,
    holds: HashMap<String, HoldRecord>,
    payments: HashMap<String, PaymentSession>,
    faults: HashMap<Operation, u32>,
    calls: HashMap<Operation, u32>,
}

impl State {
    /// Lazily moves holds and payments past their expiry into `Expired`
    fn refresh(&mut self, now: DateTime<Utc>) {
        for record in self.holds.values_mut() {
            if record.status == HoldStatus::Active && record.hold.is_expired_at(now) {
                debug!("Hold {} expired", record.hold.hold_id);
                record.status = HoldStatus::Expired;
            }
        }
        for session in self.payments.values_mut() {
            if session.status == PaymentStatus::Pending && now >= session.expires_at {
                debug!("Payment {} expired", session.payment_id);
                session.status = PaymentStatus::Expired;
            }
        }
    }

    fn booked_ranges(&self, unit_id: &str) -> Vec<DateRange> {
        let mut ranges: Vec<DateRange> = self.holds.values()
            .filter(|r| r.hold.item_ref == unit_id)
            .filter(|r| matches!(r.status, HoldStatus::Active | HoldStatus::Confirmed))
            .map(|r| r.hold.date_range)
            .collect();
        ranges.sort_by_key(|r| r.start());
        ranges
    }

    /// Records the call; returns an injected failure if one is pending
    fn enter(&mut self, op: Operation) -> HandshakeResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        if let Some(remaining) = self.faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HandshakeError::Transient(format!("injected failure on {:?}", op)));
            }
        }
        Ok(())
    }
}

/// Booking and payment service living in process memory.
///
/// All state changes happen under one lock, so two racing hold requests on
/// the same unit are serialized and exactly one of them wins.
pub struct MemoryBookingService {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    pricing: PricingEngine,
    config: MemoryConfig,
}

impl MemoryBookingService {
    pub fn new(clock: Arc<dyn Clock>, config: MemoryConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            pricing: PricingEngine::default(),
            config,
        }
    }

    pub fn add_unit(&self, unit: UnitDescriptor) -> HandshakeResult<()> {
        let mut state = self.lock()?;
        info!("Registered unit {} ({})", unit.unit_id, unit.item_type);
        state.units.insert(unit.unit_id.clone(), unit);
        Ok(())
    }

    /// Make the next `times` calls of `op` fail with a transient error
    pub fn inject_fault(&self, op: Operation, times: u32) -> HandshakeResult<()> {
        let mut state = self.lock()?;
        state.faults.insert(op, times);
        Ok(())
    }

    /// How many times `op` has been called, failures included
    pub fn calls(&self, op: Operation) -> u32 {
        self.lock()
            .map(|s| s.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Provider callback: the traveler paid. Confirms the hold if it is still active.
    pub fn complete_payment(&self, payment_id: &str) -> HandshakeResult<PaymentStatus> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.refresh(now);

        let session = state.payments.get_mut(payment_id)
            .ok_or_else(|| HandshakeError::NotFound(format!("payment {}", payment_id)))?;
        if session.status != PaymentStatus::Pending {
            return Ok(session.status);
        }
        session.status = PaymentStatus::Completed;
        let hold_id = session.hold_id.clone();

        if let Some(record) = state.holds.get_mut(&hold_id) {
            if record.status == HoldStatus::Active {
                record.status = HoldStatus::Confirmed;
                info!("Hold {} confirmed by payment {}", hold_id, payment_id);
            } else {
                warn!("Payment {} completed but hold {} is {:?}", payment_id, hold_id, record.status);
            }
        }
        Ok(PaymentStatus::Completed)
    }

    /// Provider callback: the payment was declined
    pub fn fail_payment(&self, payment_id: &str) -> HandshakeResult<PaymentStatus> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.refresh(now);

        let session = state.payments.get_mut(payment_id)
            .ok_or_else(|| HandshakeError::NotFound(format!("payment {}", payment_id)))?;
        if session.status == PaymentStatus::Pending {
            session.status = PaymentStatus::Failed;
        }
        Ok(session.status)
    }

    pub fn hold_owner(&self, hold_id: &str) -> Option<String> {
        self.lock().ok()?.holds.get(hold_id).map(|r| r.owner.clone())
    }

    fn lock(&self) -> HandshakeResult<MutexGuard<'_, State>> {
        self.state.lock()
            .map_err(|_| HandshakeError::Transient("booking state lock poisoned".to_string()))
    }
}

#[async_trait]
impl BookingService for MemoryBookingService {
    async fn list_units(&self, item_type: ItemType, range: DateRange) -> HandshakeResult<Vec<UnitAvailability>> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.enter(Operation::ListUnits)?;
        state.refresh(now);

        let units = state.units.values()
            .filter(|u| u.item_type == item_type)
            .map(|u| UnitAvailability {
                unit: u.clone(),
                booked: state.booked_ranges(&u.unit_id),
            })
            .collect::<Vec<_>>();
        debug!("Listed {} {} units for {}", units.len(), item_type, range);
        Ok(units)
    }

    async fn create_hold(
        &self,
        ctx: &SessionContext,
        unit_id: &str,
        range: DateRange,
        promotion: Option<&Promotion>,
    ) -> HandshakeResult<HoldReply> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.enter(Operation::CreateHold)?;
        state.refresh(now);

        let unit = state.units.get(unit_id)
            .cloned()
            .ok_or_else(|| HandshakeError::NotFound(format!("unit {}", unit_id)))?;

        let conflicts: Vec<DateRange> = state.booked_ranges(unit_id)
            .into_iter()
            .filter(|b| b.overlaps(&range))
            .collect();
        if !conflicts.is_empty() {
            info!("Hold on {} for {} rejected: {} conflicting range(s)", unit_id, range, conflicts.len());
            return Ok(HoldReply::Conflict { conflicts });
        }

        let quote = self.pricing.quote(&unit.price, &range, promotion)?;
        let hold = ReservationHold {
            hold_id: format!("hold_{}", Uuid::new_v4().simple()),
            item_ref: unit_id.to_string(),
            date_range: range,
            expires_at: now + self.config.hold_ttl,
            amount_due: quote.net,
            currency: self.config.currency.clone(),
        };

        info!("Hold {} placed on {} for {} ({} {})", hold.hold_id, unit_id, range, hold.amount_due, hold.currency);
        state.holds.insert(hold.hold_id.clone(), HoldRecord {
            hold: hold.clone(),
            owner: ctx.traveler_id.clone(),
            status: HoldStatus::Active,
        });
        Ok(HoldReply::Held { hold })
    }

    async fn cancel_hold(&self, hold_id: &str) -> HandshakeResult<()> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.enter(Operation::CancelHold)?;
        state.refresh(now);

        let record = state.holds.get_mut(hold_id)
            .ok_or_else(|| HandshakeError::NotFound(format!("hold {}", hold_id)))?;
        if record.status == HoldStatus::Active {
            record.status = HoldStatus::Released;
            info!("Hold {} released", hold_id);
        }
        Ok(())
    }

    async fn verify_hold(&self, hold_id: &str) -> HandshakeResult<HoldStatus> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.enter(Operation::VerifyHold)?;
        state.refresh(now);

        state.holds.get(hold_id)
            .map(|r| r.status)
            .ok_or_else(|| HandshakeError::NotFound(format!("hold {}", hold_id)))
    }
}

#[async_trait]
impl PaymentService for MemoryBookingService {
    async fn create_payment(&self, hold_id: &str, amount: i64) -> HandshakeResult<PaymentSession> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.enter(Operation::CreatePayment)?;
        state.refresh(now);

        let record = state.holds.get(hold_id)
            .ok_or_else(|| HandshakeError::NotFound(format!("hold {}", hold_id)))?;
        if record.status != HoldStatus::Active {
            return Err(HandshakeError::Validation(format!("hold {} is {:?}", hold_id, record.status)));
        }
        if record.hold.amount_due != amount {
            return Err(HandshakeError::Validation(format!(
                "amount {} does not match hold amount {}",
                amount, record.hold.amount_due
            )));
        }

        // One pending session per hold: a new request supersedes the old one
        for previous in state.payments.values_mut() {
            if previous.hold_id == hold_id && previous.status == PaymentStatus::Pending {
                info!("Payment {} superseded", previous.payment_id);
                previous.status = PaymentStatus::Cancelled;
            }
        }

        let payment_id = format!("pay_{}", Uuid::new_v4().simple());
        let session = PaymentSession {
            qr_payload: Some(format!("WAYFARE|{}|{}|{}", payment_id, amount, self.config.currency)),
            checkout_url: Some(format!("{}/{}", self.config.checkout_base_url, payment_id)),
            payment_id: payment_id.clone(),
            hold_id: hold_id.to_string(),
            amount,
            status: PaymentStatus::Pending,
            expires_at: now + self.config.payment_ttl,
        };

        info!("Payment {} opened for hold {} ({})", payment_id, hold_id, amount);
        state.payments.insert(payment_id, session.clone());
        Ok(session)
    }

    async fn payment_status(&self, payment_id: &str) -> HandshakeResult<PaymentStatus> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.enter(Operation::PaymentStatus)?;
        state.refresh(now);

        state.payments.get(payment_id)
            .map(|s| s.status)
            .ok_or_else(|| HandshakeError::NotFound(format!("payment {}", payment_id)))
    }

    async fn cancel_payment(&self, payment_id: &str) -> HandshakeResult<()> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        state.enter(Operation::CancelPayment)?;
        state.refresh(now);

        let session = state.payments.get_mut(payment_id)
            .ok_or_else(|| HandshakeError::NotFound(format!("payment {}", payment_id)))?;
        if session.status == PaymentStatus::Pending {
            session.status = PaymentStatus::Cancelled;
            info!("Payment {} cancelled", payment_id);
        }
        Ok(())
    }
}
