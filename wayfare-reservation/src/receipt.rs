use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use wayfare_core::{CoreError, DocumentStore, EventPublisher};
use wayfare_shared::{ReservationEvent, ReservationEventKind};

use crate::models::{ContactInfo, PaymentStatus, Receipt, Reservation, ReservationDetails};
use crate::repository::{ReservationRepository, StoreError, WriteGuard};

/// Snapshot written to the document store. Only fields frozen at creation
/// (plus the schedule as paid for) go in.
#[derive(Debug, Serialize)]
pub struct ReceiptDocument {
    pub receipt_number: String,
    pub reservation_id: Uuid,
    pub owner_id: String,
    pub contact: ContactInfo,
    pub details: ReservationDetails,
    pub description: String,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_session_id: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl ReceiptDocument {
    pub fn from_reservation(reservation: &Reservation, issued_at: DateTime<Utc>) -> Self {
        Self {
            receipt_number: receipt_number(&reservation.id, issued_at),
            reservation_id: reservation.id,
            owner_id: reservation.owner_id.clone(),
            contact: reservation.contact.clone(),
            details: reservation.details.clone(),
            description: reservation.details.describe(),
            amount_minor: reservation.amount.amount_minor,
            currency: reservation.amount.currency.clone(),
            payment_session_id: reservation.payment_session_id.clone(),
            issued_at,
        }
    }
}

/// Format: WF-{yyyymmdd}-{short_uuid}
fn receipt_number(reservation_id: &Uuid, issued_at: DateTime<Utc>) -> String {
    let short_id = &reservation_id.simple().to_string()[..8];
    format!("WF-{}-{}", issued_at.format("%Y%m%d"), short_id.to_uppercase())
}

/// Produces receipt documents for paid reservations and records their reference
pub struct ReceiptIssuer {
    repo: Arc<dyn ReservationRepository>,
    documents: Arc<dyn DocumentStore>,
    events: Arc<dyn EventPublisher>,
    max_write_attempts: usize,
}

impl ReceiptIssuer {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        documents: Arc<dyn DocumentStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repo,
            documents,
            events,
            max_write_attempts: 3,
        }
    }

    pub fn with_max_write_attempts(mut self, attempts: usize) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    /// Issue the receipt for a paid reservation.
    ///
    /// Idempotent: a reservation that already carries a receipt is returned
    /// unchanged. If the document store fails the reservation is not touched,
    /// so the call can simply be repeated later.
    pub async fn issue(&self, reservation_id: Uuid) -> Result<Receipt, ReceiptError> {
        let mut reservation = self.load(reservation_id).await?;
        if let Some(existing) = reservation.receipt.clone() {
            return Ok(existing);
        }
        if reservation.payment_status != PaymentStatus::Paid {
            return Err(ReceiptError::NotPaid(reservation_id));
        }

        let issued_at = Utc::now();
        let document = ReceiptDocument::from_reservation(&reservation, issued_at);
        let bytes = serde_json::to_vec(&document)?;
        let document_ref = self.documents.store(&bytes).await?;

        let receipt = Receipt {
            document_ref,
            issued_at,
        };

        for _ in 0..self.max_write_attempts {
            let guard = WriteGuard::observed(&reservation);
            let mut next = reservation.clone();
            next.receipt = Some(receipt.clone());

            match self.repo.update_if(&guard, &next).await {
                Ok(stored) => {
                    info!(
                        reservation_id = %reservation_id,
                        receipt_number = %document.receipt_number,
                        document_ref = %receipt.document_ref,
                        "Receipt issued"
                    );
                    let event = ReservationEvent::new(stored.id, &stored.owner_id, ReservationEventKind::ReceiptIssued);
                    if let Err(e) = self.events.publish(&event).await {
                        warn!(reservation_id = %reservation_id, error = %e, "Failed to publish receipt event");
                    }
                    return Ok(receipt);
                }
                Err(StoreError::Conflict(_)) => {
                    reservation = self.load(reservation_id).await?;
                    if let Some(existing) = reservation.receipt.clone() {
                        // Another issuer won the race; our document is never referenced
                        warn!(
                            reservation_id = %reservation_id,
                            orphaned_ref = %receipt.document_ref,
                            "Receipt already recorded by a concurrent issuer"
                        );
                        return Ok(existing);
                    }
                    if reservation.payment_status != PaymentStatus::Paid {
                        return Err(ReceiptError::NotPaid(reservation_id));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReceiptError::ConcurrentModification(reservation_id))
    }

    /// Load the stored receipt document for a reservation, if one was issued
    pub async fn document(&self, reservation_id: Uuid) -> Result<Option<Vec<u8>>, ReceiptError> {
        let reservation = self.load(reservation_id).await?;
        match reservation.receipt {
            Some(receipt) => Ok(self.documents.fetch(&receipt.document_ref).await?),
            None => Ok(None),
        }
    }

    async fn load(&self, reservation_id: Uuid) -> Result<Reservation, ReceiptError> {
        self.repo
            .get(reservation_id)
            .await?
            .ok_or(ReceiptError::NotFound(reservation_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    #[error("Reservation not found: {0}")]
    NotFound(Uuid),

    #[error("Reservation {0} is not paid")]
    NotPaid(Uuid),

    #[error("Receipt document could not be stored: {0}")]
    Document(#[from] CoreError),

    #[error("Receipt encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Reservation {0} kept changing while recording the receipt")]
    ConcurrentModification(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
