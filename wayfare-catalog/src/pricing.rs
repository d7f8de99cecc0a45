use serde::{Deserialize, Serialize};
use wayfare_core::{DateRange, HandshakeError, PriceBasis, Promotion};

/// Price breakdown for one unit over one date range, in minor units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub gross: i64,
    pub discount: i64,
    pub net: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Net prices are rounded to a multiple of this (1 = no rounding)
    pub rounding_unit: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { rounding_unit: 1 }
    }
}

/// Computes the amount due for a reservation
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Gross price before promotions: per-night rate times nights, or the flat price
    pub fn gross(&self, price: &PriceBasis, range: &DateRange) -> Result<i64, PricingError> {
        match *price {
            PriceBasis::PerNight(rate) if rate < 0 => Err(PricingError::NegativePrice(rate)),
            PriceBasis::Flat(amount) if amount < 0 => Err(PricingError::NegativePrice(amount)),
            PriceBasis::PerNight(rate) => rate
                .checked_mul(range.nights())
                .ok_or(PricingError::Overflow),
            PriceBasis::Flat(amount) => Ok(amount),
        }
    }

    /// Discount a promotion grants on `gross`; never exceeds `gross`
    pub fn discount(&self, gross: i64, promotion: &Promotion) -> Result<i64, PricingError> {
        let discount = match *promotion {
            Promotion::Percent { percent, .. } => {
                if percent > 100 {
                    return Err(PricingError::InvalidPromotion(format!("{}% is above 100%", percent)));
                }
                gross
                    .checked_mul(percent as i64)
                    .ok_or(PricingError::Overflow)?
                    / 100
            }
            Promotion::Fixed { amount, .. } => {
                if amount < 0 {
                    return Err(PricingError::InvalidPromotion(format!("fixed discount {} is negative", amount)));
                }
                amount
            }
        };
        Ok(discount.min(gross))
    }

    pub fn quote(
        &self,
        price: &PriceBasis,
        range: &DateRange,
        promotion: Option<&Promotion>,
    ) -> Result<Quote, PricingError> {
        let gross = self.gross(price, range)?;
        let discount = match promotion {
            Some(p) => self.discount(gross, p)?,
            None => 0,
        };
        let net = self.round(gross - discount);
        Ok(Quote { gross, discount: gross - net, net })
    }

    fn round(&self, amount: i64) -> i64 {
        let unit = self.config.rounding_unit.max(1);
        let remainder = amount % unit;
        if remainder * 2 >= unit {
            amount + (unit - remainder)
        } else {
            amount - remainder
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Price must not be negative: {0}")]
    NegativePrice(i64),

    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),

    #[error("Price calculation overflowed")]
    Overflow,
}

impl From<PricingError> for HandshakeError {
    fn from(err: PricingError) -> Self {
        HandshakeError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn june(start: u32, end: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 6, start).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, end).unwrap(),
        ).unwrap()
    }

    #[test]
    fn test_per_night_without_promotion() {
        let engine = PricingEngine::default();
        let quote = engine.quote(&PriceBasis::PerNight(250_000), &june(1, 3), None).unwrap();
        assert_eq!(quote, Quote { gross: 500_000, discount: 0, net: 500_000 });
    }

    #[test]
    fn test_percent_promotion() {
        let engine = PricingEngine::default();
        let quote = engine
            .quote(&PriceBasis::PerNight(250_000), &june(1, 3), Some(&Promotion::percent(10)))
            .unwrap();
        assert_eq!(quote.net, 450_000);
        assert_eq!(quote.discount, 50_000);
    }

    #[test]
    fn test_flat_price_ignores_nights() {
        let engine = PricingEngine::default();
        let quote = engine.quote(&PriceBasis::Flat(1_200_000), &june(1, 30), None).unwrap();
        assert_eq!(quote.net, 1_200_000);
    }

    #[test]
    fn test_fixed_discount_floors_at_zero() {
        let engine = PricingEngine::default();
        let quote = engine
            .quote(&PriceBasis::Flat(100_000), &june(1, 2), Some(&Promotion::fixed(250_000)))
            .unwrap();
        assert_eq!(quote.net, 0);
    }

    #[test]
    fn test_rejects_bad_promotions() {
        let engine = PricingEngine::default();
        let over = engine.quote(&PriceBasis::Flat(10), &june(1, 2), Some(&Promotion::percent(120)));
        assert!(matches!(over, Err(PricingError::InvalidPromotion(_))));

        let negative = engine.quote(&PriceBasis::Flat(10), &june(1, 2), Some(&Promotion::fixed(-5)));
        assert!(negative.is_err());
    }

    #[test]
    fn test_rounding_unit() {
        let engine = PricingEngine::new(PricingConfig { rounding_unit: 1_000 });
        let quote = engine
            .quote(&PriceBasis::PerNight(333_333), &june(1, 2), Some(&Promotion::percent(15)))
            .unwrap();
        // 333_333 - 49_999 = 283_334
        assert_eq!(quote.net, 283_000);
        assert_eq!(quote.gross - quote.discount, quote.net);
    }
}
