//! JSON bodies exchanged between [`crate::HttpBookingClient`] and the sandbox server.

use serde::{Deserialize, Serialize};
use chrono::NaiveDate;
use wayfare_core::{DateRange, HoldStatus, ItemType, PaymentStatus, Promotion};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsQuery {
    pub item_type: ItemType,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHoldRequest {
    pub unit_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub promotion: Option<Promotion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub hold_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldStatusResponse {
    pub hold_id: String,
    pub status: HoldStatus,
}

/// Error body; `conflicts` is only set on 409 responses to hold requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<DateRange>>,
}
