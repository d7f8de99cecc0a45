pub mod models;
pub mod booking;
pub mod payment;
pub mod clock;
pub mod retry;
pub mod session;

pub use models::{DateRange, ItemType, PriceBasis, Promotion, UnitDescriptor, UnitAvailability};
pub use booking::{BookingService, HoldReply, HoldStatus, ReservationHold};
pub use payment::{PaymentService, PaymentSession, PaymentStatus};
pub use clock::{Clock, SystemClock, TokioClock};
pub use retry::RetryPolicy;
pub use session::SessionContext;

/// Failure taxonomy shared by every stage of the handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unit {unit_id} is already reserved for {}", format_ranges(.conflicts))]
    Conflict {
        unit_id: String,
        conflicts: Vec<DateRange>,
    },

    #[error("Remote service unavailable: {0}")]
    Transient(String),

    #[error("Payment reached terminal state {0:?}")]
    TerminalPayment(PaymentStatus),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl HandshakeError {
    /// Network or server failure; the same call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, HandshakeError::Transient(_))
    }

    /// Conflicts are recoverable by picking other dates or another unit,
    /// transient errors by repeating the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandshakeError::Transient(_) | HandshakeError::Conflict { .. })
    }
}

fn format_ranges(ranges: &[DateRange]) -> String {
    ranges.iter()
        .map(|r| r.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_conflict_message_lists_ranges() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        ).unwrap();
        let err = HandshakeError::Conflict { unit_id: "R".to_string(), conflicts: vec![range] };

        assert_eq!(err.to_string(), "Unit R is already reserved for 2024-06-01..2024-06-03");
        assert!(err.is_retryable());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classification() {
        assert!(HandshakeError::Transient("timeout".into()).is_transient());
        assert!(!HandshakeError::Validation("bad".into()).is_retryable());
        assert!(!HandshakeError::TerminalPayment(PaymentStatus::Failed).is_retryable());
    }
}
