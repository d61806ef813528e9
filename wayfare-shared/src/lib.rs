pub mod models;
pub mod pii;

pub use models::events::{ReservationEvent, ReservationEventKind};
pub use models::money::Money;
pub use pii::Masked;
