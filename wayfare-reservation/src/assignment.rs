use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wayfare_core::EventPublisher;
use wayfare_shared::{ReservationEvent, ReservationEventKind};

use crate::lifecycle::{LifecycleError, LifecycleResult};
use crate::models::{Reservation, ReservationStatus};
use crate::repository::{ReservationRepository, StoreError, WriteGuard};

/// Binds drivers to confirmed reservations.
///
/// A claim is a conditional write from Confirmed with no driver. A rejected
/// write is re-read: if another driver landed first or the status moved, the
/// claim is `AlreadyClaimed` and the caller should re-fetch. Unrelated writes
/// (a receipt being recorded, say) only cause another attempt. Claims are
/// released only by cancelling.
pub struct DriverAssignmentService {
    repo: Arc<dyn ReservationRepository>,
    events: Arc<dyn EventPublisher>,
    max_write_attempts: usize,
}

impl DriverAssignmentService {
    pub fn new(repo: Arc<dyn ReservationRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            repo,
            events,
            max_write_attempts: 3,
        }
    }

    pub fn with_max_write_attempts(mut self, attempts: usize) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    /// Transition: Confirmed → Assigned
    pub async fn claim(&self, reservation_id: Uuid, driver_id: &str) -> LifecycleResult<Reservation> {
        if driver_id.trim().is_empty() {
            return Err(LifecycleError::Validation("driver id must not be empty".to_string()));
        }

        for attempt in 1..=self.max_write_attempts {
            let current = self
                .repo
                .get(reservation_id)
                .await?
                .ok_or(LifecycleError::NotFound(reservation_id))?;
            Self::ensure_claimable(&current, attempt)?;

            let mut next = current.clone();
            next.assigned_driver_id = Some(driver_id.to_string());
            next.status = ReservationStatus::Assigned;

            match self.repo.update_if(&WriteGuard::observed(&current), &next).await {
                Ok(stored) => {
                    self.announce(&stored, driver_id).await;
                    return Ok(stored);
                }
                Err(StoreError::Conflict(_)) => {
                    debug!(
                        reservation_id = %reservation_id,
                        driver_id = %driver_id,
                        attempt,
                        "Claim write rejected, re-reading"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(reservation_id = %reservation_id, driver_id = %driver_id, "Giving up claim after repeated write conflicts");
        Err(LifecycleError::ConcurrentModification(reservation_id))
    }

    fn ensure_claimable(current: &Reservation, attempt: usize) -> LifecycleResult<()> {
        let reservation_id = current.id;
        match current.status {
            ReservationStatus::Confirmed if current.assigned_driver_id.is_none() => Ok(()),
            ReservationStatus::Confirmed | ReservationStatus::Assigned => {
                if attempt > 1 {
                    info!(reservation_id = %reservation_id, "Claim lost to a concurrent claim");
                }
                Err(LifecycleError::AlreadyClaimed {
                    reservation_id,
                    driver_id: current.assigned_driver_id.clone(),
                })
            }
            ReservationStatus::Completed | ReservationStatus::Cancelled => Err(LifecycleError::AlreadyFinal {
                reservation_id,
                state: current.status.to_string(),
            }),
            ReservationStatus::Pending => Err(LifecycleError::InvalidTransition {
                from: current.status.to_string(),
                to: ReservationStatus::Assigned.to_string(),
            }),
        }
    }

    async fn announce(&self, stored: &Reservation, driver_id: &str) {
        info!(reservation_id = %stored.id, driver_id = %driver_id, "Driver assigned");

        let event = ReservationEvent::new(stored.id, &stored.owner_id, ReservationEventKind::DriverAssigned)
            .with_driver(Some(driver_id));
        if let Err(e) = self.events.publish(&event).await {
            warn!(reservation_id = %stored.id, error = %e, "Failed to publish assignment event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEventPublisher, MemoryReservationRepository};
    use crate::models::fixtures::new_reservation;
    use crate::models::{PaymentStatus, Receipt};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::repository::StoreResult;

    /// Records a receipt on the stored reservation right before the first
    /// driver write, as the receipt worker would when it runs concurrently.
    struct ReceiptLandsFirst {
        inner: MemoryReservationRepository,
        fired: AtomicBool,
    }

    #[async_trait]
    impl ReservationRepository for ReceiptLandsFirst {
        async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
            self.inner.insert(reservation).await
        }

        async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
            self.inner.get(id).await
        }

        async fn update_if(&self, guard: &WriteGuard, next: &Reservation) -> StoreResult<Reservation> {
            if next.assigned_driver_id.is_some() && !self.fired.swap(true, Ordering::SeqCst) {
                if let Some(current) = self.inner.get(next.id).await? {
                    let mut with_receipt = current.clone();
                    with_receipt.receipt = Some(Receipt {
                        document_ref: "memory:receipt".to_string(),
                        issued_at: Utc::now(),
                    });
                    self.inner.update_if(&WriteGuard::observed(&current), &with_receipt).await?;
                }
            }
            self.inner.update_if(guard, next).await
        }

        async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Reservation>> {
            self.inner.list_for_owner(owner_id).await
        }

        async fn list_awaiting_payment(&self, limit: usize) -> StoreResult<Vec<Reservation>> {
            self.inner.list_awaiting_payment(limit).await
        }

        async fn list_missing_receipts(&self, limit: usize) -> StoreResult<Vec<Reservation>> {
            self.inner.list_missing_receipts(limit).await
        }
    }

    async fn confirmed(repo: &MemoryReservationRepository) -> Reservation {
        let mut reservation = Reservation::new(new_reservation("customer-1"));
        reservation.status = ReservationStatus::Confirmed;
        reservation.payment_status = PaymentStatus::Paid;
        reservation.payment_session_id = Some("cs_1".to_string());
        repo.insert(&reservation).await.unwrap();
        reservation
    }

    fn service(repo: Arc<MemoryReservationRepository>) -> DriverAssignmentService {
        DriverAssignmentService::new(repo, Arc::new(MemoryEventPublisher::new()))
    }

    #[tokio::test]
    async fn test_claim_then_second_claim_is_rejected() {
        let repo = Arc::new(MemoryReservationRepository::new());
        let reservation = confirmed(&repo).await;
        let service = service(repo.clone());

        let assigned = service.claim(reservation.id, "driver-1").await.unwrap();
        assert_eq!(assigned.status, ReservationStatus::Assigned);
        assert_eq!(assigned.assigned_driver_id.as_deref(), Some("driver-1"));

        let second = service.claim(reservation.id, "driver-2").await;
        match second {
            Err(LifecycleError::AlreadyClaimed { driver_id, .. }) => {
                assert_eq!(driver_id.as_deref(), Some("driver-1"));
            }
            other => panic!("expected AlreadyClaimed, got {:?}", other),
        }

        let stored = repo.get(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_driver_id.as_deref(), Some("driver-1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        for _ in 0..25 {
            let repo = Arc::new(MemoryReservationRepository::new());
            let reservation = confirmed(&repo).await;
            let service = Arc::new(service(repo.clone()));

            let first = tokio::spawn({
                let service = service.clone();
                async move { service.claim(reservation.id, "driver-1").await }
            });
            let second = tokio::spawn({
                let service = service.clone();
                async move { service.claim(reservation.id, "driver-2").await }
            });

            let results = [first.await.unwrap(), second.await.unwrap()];
            let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            let losers = results
                .iter()
                .filter(|r| matches!(r, Err(LifecycleError::AlreadyClaimed { .. })))
                .count();

            assert_eq!(winners.len(), 1);
            assert_eq!(losers, 1);

            let stored = repo.get(reservation.id).await.unwrap().unwrap();
            assert_eq!(stored.assigned_driver_id, winners[0].assigned_driver_id);
        }
    }

    #[tokio::test]
    async fn test_claim_survives_receipt_recorded_mid_claim() {
        let repo = Arc::new(ReceiptLandsFirst {
            inner: MemoryReservationRepository::new(),
            fired: AtomicBool::new(false),
        });
        let reservation = confirmed(&repo.inner).await;
        let service = DriverAssignmentService::new(repo.clone(), Arc::new(MemoryEventPublisher::new()));

        let assigned = service.claim(reservation.id, "driver-1").await.unwrap();
        assert_eq!(assigned.status, ReservationStatus::Assigned);
        assert_eq!(assigned.assigned_driver_id.as_deref(), Some("driver-1"));

        // The receipt written in between is kept, not overwritten
        let stored = repo.get(reservation.id).await.unwrap().unwrap();
        assert!(repo.fired.load(Ordering::SeqCst));
        assert_eq!(stored.assigned_driver_id.as_deref(), Some("driver-1"));
        assert_eq!(stored.receipt.map(|r| r.document_ref).as_deref(), Some("memory:receipt"));
    }

    #[tokio::test]
    async fn test_pending_reservation_cannot_be_claimed() {
        let repo = Arc::new(MemoryReservationRepository::new());
        let reservation = Reservation::new(new_reservation("customer-1"));
        repo.insert(&reservation).await.unwrap();

        let result = service(repo).claim(reservation.id, "driver-1").await;
        assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_reservation_cannot_be_claimed() {
        let repo = Arc::new(MemoryReservationRepository::new());
        let mut reservation = Reservation::new(new_reservation("customer-1"));
        reservation.status = ReservationStatus::Cancelled;
        repo.insert(&reservation).await.unwrap();

        let result = service(repo).claim(reservation.id, "driver-1").await;
        assert!(matches!(result, Err(LifecycleError::AlreadyFinal { .. })));
    }

    #[tokio::test]
    async fn test_unknown_reservation() {
        let repo = Arc::new(MemoryReservationRepository::new());
        let result = service(repo).claim(Uuid::new_v4(), "driver-1").await;
        assert!(matches!(result, Err(LifecycleError::NotFound(_))));
    }
}
