use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationEventKind {
    Confirmed,
    PaymentFailed,
    DriverAssigned,
    Completed,
    Cancelled,
    ReceiptIssued,
}

impl ReservationEventKind {
    /// Topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Confirmed => "reservation.confirmed",
            Self::PaymentFailed => "reservation.payment_failed",
            Self::DriverAssigned => "reservation.driver_assigned",
            Self::Completed => "reservation.completed",
            Self::Cancelled => "reservation.cancelled",
            Self::ReceiptIssued => "reservation.receipt_issued",
        }
    }
}

/// Emitted after a lifecycle transition has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationEvent {
    pub reservation_id: Uuid,
    pub owner_id: String,
    pub kind: ReservationEventKind,
    pub driver_id: Option<String>,
    pub timestamp: i64,
}

impl ReservationEvent {
    pub fn new(reservation_id: Uuid, owner_id: &str, kind: ReservationEventKind) -> Self {
        Self {
            reservation_id,
            owner_id: owner_id.to_string(),
            kind,
            driver_id: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_driver(mut self, driver_id: Option<&str>) -> Self {
        self.driver_id = driver_id.map(str::to_string);
        self
    }
}
