use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{PaymentStatus, Reservation, ReservationDetails, ReservationStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Reservation not found: {0}")]
    NotFound(Uuid),

    #[error("Conditional write rejected for reservation {0}")]
    Conflict(Uuid),

    #[error("Reservation already exists: {0}")]
    Duplicate(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The state a writer observed before computing its update.
///
/// A conditional write only lands if the stored record still matches every
/// field here; otherwise the store rejects it with [`StoreError::Conflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteGuard {
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub payment_session_id: Option<String>,
    pub assigned_driver_id: Option<String>,
    pub receipt_issued: bool,
    pub details: ReservationDetails,
}

impl WriteGuard {
    pub fn observed(reservation: &Reservation) -> Self {
        Self {
            status: reservation.status,
            payment_status: reservation.payment_status,
            payment_session_id: reservation.payment_session_id.clone(),
            assigned_driver_id: reservation.assigned_driver_id.clone(),
            receipt_issued: reservation.receipt.is_some(),
            details: reservation.details.clone(),
        }
    }

    pub fn matches(&self, current: &Reservation) -> bool {
        *self == Self::observed(current)
    }
}

/// Durable keyed storage for reservations.
///
/// Records are never deleted. `update_if` writes only the mutable fields
/// (details, status, payment fields, driver, receipt); identity, owner,
/// contact and amount are fixed at insert.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    /// Compare-and-swap: apply `next` if the stored record still matches `guard`.
    /// Returns the record as stored, with `updated_at` maintained by the store.
    async fn update_if(&self, guard: &WriteGuard, next: &Reservation) -> StoreResult<Reservation>;

    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Reservation>>;

    /// Pending reservations holding an unsettled payment session, oldest first
    async fn list_awaiting_payment(&self, limit: usize) -> StoreResult<Vec<Reservation>>;

    /// Paid reservations whose receipt has not been recorded yet, oldest first
    async fn list_missing_receipts(&self, limit: usize) -> StoreResult<Vec<Reservation>>;
}
