use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::HandshakeResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    /// Every status except `Pending` is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentSession {
    pub payment_id: String,
    pub hold_id: String,
    pub amount: i64,
    pub qr_payload: Option<String>,
    pub checkout_url: Option<String>,
    pub status: PaymentStatus,
    pub expires_at: DateTime<Utc>,
}

impl PaymentSession {
    /// At least one artifact the traveler can act on
    pub fn is_presentable(&self) -> bool {
        let non_empty = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        non_empty(&self.qr_payload) || non_empty(&self.checkout_url)
    }
}

/// Payment provider endpoints tied to a hold
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Create a payment session settling the given hold
    async fn create_payment(&self, hold_id: &str, amount: i64) -> HandshakeResult<PaymentSession>;

    /// Retrieve the current session status
    async fn payment_status(&self, payment_id: &str) -> HandshakeResult<PaymentStatus>;

    /// Cancel a pending session
    async fn cancel_payment(&self, payment_id: &str) -> HandshakeResult<()>;
}
