use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wayfare_core::{BookingService, DateRange, HandshakeResult, ItemType, UnitDescriptor};
use crate::pricing::{PricingEngine, Quote};

/// A unit free for the requested range, with its undiscounted quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub unit: UnitDescriptor,
    pub quote: Quote,
}

/// Turns remote inventory into the set of units a traveler can pick from
pub struct AvailabilityResolver {
    booking: Arc<dyn BookingService>,
    pricing: PricingEngine,
}

impl AvailabilityResolver {
    pub fn new(booking: Arc<dyn BookingService>, pricing: PricingEngine) -> Self {
        Self { booking, pricing }
    }

    /// Units of `item_type` with no reservation overlapping `range`.
    ///
    /// An empty vector means sold out. Transport failures are returned as
    /// errors so callers can tell "try again" apart from "nothing left".
    pub async fn resolve(&self, item_type: ItemType, range: DateRange) -> HandshakeResult<Vec<Candidate>> {
        let units = self.booking.list_units(item_type, range).await?;
        let listed = units.len();

        let mut candidates = Vec::with_capacity(listed);
        for entry in units {
            if entry.unit.item_type != item_type {
                continue;
            }
            if let Some(clash) = entry.booked.iter().find(|b| b.overlaps(&range)) {
                debug!("Unit {} unavailable: booked {}", entry.unit.unit_id, clash);
                continue;
            }
            let quote = self.pricing.quote(&entry.unit.price, &range, None)?;
            candidates.push(Candidate { unit: entry.unit, quote });
        }

        info!(
            "Resolved {} of {} {} units for {}",
            candidates.len(), listed, item_type, range
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use wayfare_core::{HandshakeError, HoldReply, HoldStatus, PriceBasis, Promotion, SessionContext, UnitAvailability};

    struct FixedInventory {
        units: HandshakeResult<Vec<UnitAvailability>>,
    }

    #[async_trait]
    impl BookingService for FixedInventory {
        async fn list_units(&self, _item_type: ItemType, _range: DateRange) -> HandshakeResult<Vec<UnitAvailability>> {
            self.units.clone()
        }

        async fn create_hold(
            &self,
            _ctx: &SessionContext,
            _unit_id: &str,
            _range: DateRange,
            _promotion: Option<&Promotion>,
        ) -> HandshakeResult<HoldReply> {
            Err(HandshakeError::Transient("not used".into()))
        }

        async fn cancel_hold(&self, _hold_id: &str) -> HandshakeResult<()> {
            Ok(())
        }

        async fn verify_hold(&self, _hold_id: &str) -> HandshakeResult<HoldStatus> {
            Ok(HoldStatus::Active)
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn room(id: &str, booked: Vec<DateRange>) -> UnitAvailability {
        UnitAvailability {
            unit: UnitDescriptor {
                unit_id: id.to_string(),
                item_type: ItemType::Room,
                name: format!("Room {}", id),
                price: PriceBasis::PerNight(250_000),
            },
            booked,
        }
    }

    fn resolver(units: HandshakeResult<Vec<UnitAvailability>>) -> AvailabilityResolver {
        AvailabilityResolver::new(Arc::new(FixedInventory { units }), PricingEngine::default())
    }

    #[tokio::test]
    async fn test_filters_overlapping_units() {
        let taken = DateRange::new(date(2), date(4)).unwrap();
        let checkout_day = DateRange::new(date(3), date(5)).unwrap();
        let resolver = resolver(Ok(vec![
            room("101", vec![taken]),
            room("102", vec![checkout_day]),
            room("103", vec![]),
        ]));

        let candidates = resolver
            .resolve(ItemType::Room, DateRange::new(date(1), date(3)).unwrap())
            .await
            .unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.unit.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["102", "103"]);
        assert_eq!(candidates[0].quote.net, 500_000);
    }

    #[tokio::test]
    async fn test_sold_out_is_empty_not_error() {
        let range = DateRange::new(date(1), date(3)).unwrap();
        let resolver = resolver(Ok(vec![room("101", vec![range])]));

        let candidates = resolver.resolve(ItemType::Room, range).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_distinct() {
        let resolver = resolver(Err(HandshakeError::Transient("connection reset".into())));
        let result = resolver
            .resolve(ItemType::Room, DateRange::new(date(1), date(3)).unwrap())
            .await;
        assert!(matches!(result, Err(HandshakeError::Transient(_))));
    }

    #[tokio::test]
    async fn test_ignores_units_of_other_types() {
        let mut ad = room("ad-1", vec![]);
        ad.unit.item_type = ItemType::TourAd;
        let resolver = resolver(Ok(vec![ad, room("101", vec![])]));

        let candidates = resolver
            .resolve(ItemType::Room, DateRange::new(date(1), date(2)).unwrap())
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }
}
