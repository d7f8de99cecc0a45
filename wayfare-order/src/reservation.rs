use std::sync::Arc;
use tracing::{info, warn};
use wayfare_core::{
    BookingService, Clock, DateRange, HandshakeError, HandshakeResult, HoldReply, HoldStatus,
    Promotion, ReservationHold, SessionContext,
};

/// Places holds on units. Never deduplicates: the booking service is the arbiter.
pub struct ReservationRequester {
    booking: Arc<dyn BookingService>,
    clock: Arc<dyn Clock>,
}

impl ReservationRequester {
    pub fn new(booking: Arc<dyn BookingService>, clock: Arc<dyn Clock>) -> Self {
        Self { booking, clock }
    }

    /// Request a hold on `unit_id` for `range`.
    ///
    /// A date overlap reported by the service comes back as
    /// [`HandshakeError::Conflict`] carrying the colliding ranges.
    pub async fn reserve(
        &self,
        ctx: &SessionContext,
        unit_id: &str,
        range: DateRange,
        promotion: Option<&Promotion>,
    ) -> HandshakeResult<ReservationHold> {
        if unit_id.trim().is_empty() {
            return Err(HandshakeError::Validation("unit id is required".to_string()));
        }
        validate_promotion(promotion)?;

        match self.booking.create_hold(ctx, unit_id, range, promotion).await? {
            HoldReply::Held { hold } => {
                if hold.is_expired_at(self.clock.now()) {
                    warn!("Hold {} arrived already expired at {}", hold.hold_id, hold.expires_at);
                    return Err(HandshakeError::Transient(format!(
                        "hold {} expired before it was returned",
                        hold.hold_id
                    )));
                }
                info!(
                    "Hold {} on {} for {} until {} ({} {})",
                    hold.hold_id, unit_id, range, hold.expires_at, hold.amount_due, hold.currency
                );
                Ok(hold)
            }
            HoldReply::Conflict { conflicts } => {
                info!("Hold on {} for {} lost to {} existing reservation(s)", unit_id, range, conflicts.len());
                Err(HandshakeError::Conflict {
                    unit_id: unit_id.to_string(),
                    conflicts,
                })
            }
        }
    }

    /// Best-effort release; failures are logged and swallowed
    pub async fn release(&self, hold_id: &str) {
        match self.booking.cancel_hold(hold_id).await {
            Ok(()) => info!("Hold {} released", hold_id),
            Err(e) => warn!("Releasing hold {} failed: {}", hold_id, e),
        }
    }

    /// Authoritative hold state, used when local timers and remote status disagree
    pub async fn verify(&self, hold_id: &str) -> HandshakeResult<HoldStatus> {
        self.booking.verify_hold(hold_id).await
    }
}

fn validate_promotion(promotion: Option<&Promotion>) -> HandshakeResult<()> {
    match promotion {
        Some(Promotion::Percent { percent, .. }) if *percent > 100 => Err(HandshakeError::Validation(
            format!("promotion of {}% exceeds 100%", percent),
        )),
        Some(Promotion::Fixed { amount, .. }) if *amount < 0 => Err(HandshakeError::Validation(
            format!("fixed promotion {} is negative", amount),
        )),
        _ => Ok(()),
    }
}
