use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::models::{DateRange, ItemType, Promotion, UnitAvailability};
use crate::session::SessionContext;
use crate::HandshakeResult;

/// Temporary, time-boxed claim on a unit. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationHold {
    pub hold_id: String,
    pub item_ref: String,
    pub date_range: DateRange,
    pub expires_at: DateTime<Utc>,
    pub amount_due: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "VND".to_string()
}

impl ReservationHold {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Authoritative hold state as reported by the booking service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Active,
    Confirmed,
    Released,
    Expired,
}

/// Outcome of a hold request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldReply {
    Held { hold: ReservationHold },
    /// Lost the race against another booking; lists the colliding ranges
    Conflict { conflicts: Vec<DateRange> },
}

/// Remote inventory and reservation endpoints
#[async_trait]
pub trait BookingService: Send + Sync {
    /// Units of the given type with the ranges already reserved on them
    async fn list_units(
        &self,
        item_type: ItemType,
        range: DateRange,
    ) -> HandshakeResult<Vec<UnitAvailability>>;

    /// Place a hold on a unit for a date range
    async fn create_hold(
        &self,
        ctx: &SessionContext,
        unit_id: &str,
        range: DateRange,
        promotion: Option<&Promotion>,
    ) -> HandshakeResult<HoldReply>;

    /// Release a hold (best-effort on the caller's side)
    async fn cancel_hold(&self, hold_id: &str) -> HandshakeResult<()>;

    /// Read the authoritative state of a hold
    async fn verify_hold(&self, hold_id: &str) -> HandshakeResult<HoldStatus>;
}
