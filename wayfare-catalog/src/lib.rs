pub mod pricing;

pub use pricing::{PriceTable, PricingError, RideFare, TourFare};
