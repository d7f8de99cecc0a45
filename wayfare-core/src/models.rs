use serde::{Deserialize, Serialize};
use chrono::NaiveDate;
use std::fmt;
use crate::HandshakeError;

/// Bookable item categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    /// Hotel room, priced per night
    Room,
    /// Tour advertisement slot, priced flat for its validity window
    TourAd,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Room => write!(f, "ROOM"),
            ItemType::TourAd => write!(f, "TOUR_AD"),
        }
    }
}

/// Half-open date interval `[start, end)`.
///
/// For lodging `start` is the check-in day and `end` the check-out day. For
/// ad slots the pair is the validity window. `start < end` always holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = HandshakeError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, HandshakeError> {
        if start >= end {
            return Err(HandshakeError::Validation(format!(
                "date range start {} must be before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of nights (or days of validity) covered
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// `[a,b)` and `[c,d)` conflict iff `a < d && c < b`
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// How a unit is priced, in minor currency units
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "basis", content = "amount", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceBasis {
    PerNight(i64),
    Flat(i64),
}

/// A bookable unit as listed by the remote inventory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitDescriptor {
    pub unit_id: String,
    pub item_type: ItemType,
    pub name: String,
    pub price: PriceBasis,
}

/// A unit together with the ranges already reserved on it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitAvailability {
    pub unit: UnitDescriptor,
    #[serde(default)]
    pub booked: Vec<DateRange>,
}

/// Discount applied to the gross price of a reservation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Promotion {
    Percent { code: Option<String>, percent: u8 },
    Fixed { code: Option<String>, amount: i64 },
}

impl Promotion {
    pub fn percent(percent: u8) -> Self {
        Promotion::Percent { code: None, percent }
    }

    pub fn fixed(amount: i64) -> Self {
        Promotion::Fixed { code: None, amount }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Promotion::Percent { code, .. } | Promotion::Fixed { code, .. } => code.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        ).unwrap()
    }

    #[test]
    fn test_rejects_empty_and_inverted_ranges() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(matches!(DateRange::new(day, day), Err(HandshakeError::Validation(_))));
        assert!(DateRange::new(day.succ_opt().unwrap(), day).is_err());
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = range((2024, 6, 1), (2024, 6, 3));
        let back_to_back = range((2024, 6, 3), (2024, 6, 5));
        let inside = range((2024, 6, 2), (2024, 6, 3));
        let spanning = range((2024, 5, 30), (2024, 6, 10));

        assert!(!a.overlaps(&back_to_back));
        assert!(!back_to_back.overlaps(&a));
        assert!(a.overlaps(&inside));
        assert!(inside.overlaps(&a));
        assert!(a.overlaps(&spanning));
        assert_eq!(a.nights(), 2);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: DateRange = serde_json::from_str(r#"{"start":"2024-06-01","end":"2024-06-03"}"#).unwrap();
        assert_eq!(ok.nights(), 2);

        let bad = serde_json::from_str::<DateRange>(r#"{"start":"2024-06-03","end":"2024-06-01"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_price_basis_wire_shape() {
        let json = serde_json::to_value(PriceBasis::PerNight(250_000)).unwrap();
        assert_eq!(json, serde_json::json!({"basis": "PER_NIGHT", "amount": 250000}));
    }
}
