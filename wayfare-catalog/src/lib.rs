pub mod pricing;
pub mod availability;

pub use pricing::{PricingConfig, PricingEngine, PricingError, Quote};
pub use availability::{AvailabilityResolver, Candidate};
