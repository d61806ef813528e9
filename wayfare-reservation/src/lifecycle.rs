use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wayfare_core::{CoreError, EventPublisher, PaymentOutcome};
use wayfare_shared::{ReservationEvent, ReservationEventKind};

use crate::models::{
    Actor, NewReservation, PaymentStatus, Reservation, ReservationDetails, ReservationStatus,
};
use crate::receipt::ReceiptIssuer;
use crate::repository::{ReservationRepository, StoreError, WriteGuard};

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// What a transition decided after looking at the current record.
enum Step {
    /// Write this state, conditional on the record not having moved.
    Write(Reservation),
    /// Nothing to change; the current state already reflects the request.
    Unchanged,
}

/// Owns reservation status and every transition between statuses.
///
/// Holds no locks of its own: each operation reads the record, decides, and
/// commits with a conditional write against what it read. A rejected write
/// means someone else moved the record first, so the operation re-reads and
/// decides again, up to `max_write_attempts` times.
pub struct LifecycleManager {
    repo: Arc<dyn ReservationRepository>,
    receipts: Arc<ReceiptIssuer>,
    events: Arc<dyn EventPublisher>,
    max_write_attempts: usize,
}

impl LifecycleManager {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        receipts: Arc<ReceiptIssuer>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repo,
            receipts,
            events,
            max_write_attempts: 3,
        }
    }

    pub fn with_max_write_attempts(mut self, attempts: usize) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    /// Create a new reservation in `PENDING`
    pub async fn create_reservation(&self, input: NewReservation) -> LifecycleResult<Reservation> {
        input.details.validate().map_err(LifecycleError::Validation)?;
        if !input.amount.is_positive() {
            return Err(LifecycleError::Validation(format!(
                "amount must be positive, got {}",
                input.amount
            )));
        }

        let reservation = Reservation::new(input);
        self.repo.insert(&reservation).await?;

        info!(
            reservation_id = %reservation.id,
            owner_id = %reservation.owner_id,
            kind = reservation.kind().as_str(),
            amount = %reservation.amount,
            "Reservation created"
        );
        Ok(reservation)
    }

    pub async fn get_reservation(&self, reservation_id: Uuid) -> LifecycleResult<Reservation> {
        self.repo
            .get(reservation_id)
            .await?
            .ok_or(LifecycleError::NotFound(reservation_id))
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> LifecycleResult<Vec<Reservation>> {
        Ok(self.repo.list_for_owner(owner_id).await?)
    }

    /// Reconcile a gateway outcome for `session_id` into the reservation.
    ///
    /// Safe under at-least-once delivery: repeating an outcome that is already
    /// recorded returns the current reservation without writing. On the first
    /// `Paid` the reservation moves `PENDING -> CONFIRMED` and the receipt is
    /// issued; a receipt failure is logged and left for a later retry.
    pub async fn record_payment_outcome(
        &self,
        reservation_id: Uuid,
        session_id: &str,
        outcome: PaymentOutcome,
    ) -> LifecycleResult<Reservation> {
        let (reservation, changed) = self
            .transition(reservation_id, |current| {
                if current.payment_session_id.as_deref() != Some(session_id) {
                    return Err(LifecycleError::StaleSession {
                        reservation_id,
                        session_id: session_id.to_string(),
                    });
                }

                match (current.payment_status, outcome) {
                    (PaymentStatus::Paid, PaymentOutcome::Paid) => return Ok(Step::Unchanged),
                    (PaymentStatus::Failed, PaymentOutcome::Failed) => return Ok(Step::Unchanged),
                    (status, _) if status.is_final() => {
                        return Err(LifecycleError::AlreadyFinal {
                            reservation_id,
                            state: format!("payment {}", status),
                        })
                    }
                    _ => {}
                }
                if current.status.is_terminal() {
                    warn!(
                        reservation_id = %reservation_id,
                        session_id = %session_id,
                        outcome = ?outcome,
                        "Payment outcome arrived for a closed reservation"
                    );
                    return Err(LifecycleError::AlreadyFinal {
                        reservation_id,
                        state: current.status.to_string(),
                    });
                }

                let mut next = current.clone();
                match outcome {
                    PaymentOutcome::Paid => {
                        next.payment_status = PaymentStatus::Paid;
                        next.status = ReservationStatus::Confirmed;
                    }
                    PaymentOutcome::Failed => {
                        next.payment_status = PaymentStatus::Failed;
                    }
                }
                Ok(Step::Write(next))
            })
            .await?;

        if !changed {
            debug!(
                reservation_id = %reservation_id,
                session_id = %session_id,
                outcome = ?outcome,
                "Duplicate payment outcome ignored"
            );
            return Ok(reservation);
        }

        match outcome {
            PaymentOutcome::Paid => {
                info!(reservation_id = %reservation_id, session_id = %session_id, "Reservation confirmed");
                self.emit(&reservation, ReservationEventKind::Confirmed).await;

                if let Err(e) = self.receipts.issue(reservation_id).await {
                    warn!(
                        reservation_id = %reservation_id,
                        error = %e,
                        "Receipt issuance failed, will be retried"
                    );
                }
                // Re-read so the caller sees the receipt when it landed
                return self.get_reservation(reservation_id).await;
            }
            PaymentOutcome::Failed => {
                info!(reservation_id = %reservation_id, session_id = %session_id, "Payment failed");
                self.emit(&reservation, ReservationEventKind::PaymentFailed).await;
            }
        }

        Ok(reservation)
    }

    /// Record a freshly opened payment session as the one the reservation
    /// will accept outcomes for. Any earlier session becomes stale.
    pub async fn attach_payment_session(
        &self,
        reservation_id: Uuid,
        session_id: &str,
    ) -> LifecycleResult<Reservation> {
        let (reservation, _) = self
            .transition(reservation_id, |current| {
                Self::ensure_billable(current)?;
                let mut next = current.clone();
                next.payment_session_id = Some(session_id.to_string());
                next.payment_status = PaymentStatus::Pending;
                Ok(Step::Write(next))
            })
            .await?;

        info!(reservation_id = %reservation_id, session_id = %session_id, "Payment session attached");
        Ok(reservation)
    }

    /// Precondition for opening a new payment session.
    pub fn ensure_billable(reservation: &Reservation) -> LifecycleResult<()> {
        if reservation.payment_status.is_final() {
            return Err(LifecycleError::AlreadyFinal {
                reservation_id: reservation.id,
                state: format!("payment {}", reservation.payment_status),
            });
        }
        if reservation.status.is_terminal() {
            return Err(LifecycleError::AlreadyFinal {
                reservation_id: reservation.id,
                state: reservation.status.to_string(),
            });
        }
        if reservation.status != ReservationStatus::Pending {
            return Err(LifecycleError::InvalidTransition {
                from: reservation.status.to_string(),
                to: "PAYMENT_SESSION".to_string(),
            });
        }
        Ok(())
    }

    /// Cancel a reservation, releasing its driver if one is bound.
    /// Payment fields are left as they are.
    pub async fn cancel(&self, reservation_id: Uuid, actor: &Actor) -> LifecycleResult<Reservation> {
        let mut released_driver = None;
        let (reservation, _) = self
            .transition(reservation_id, |current| {
                Self::ensure_not_final(current)?;
                if !actor.may_cancel(current) {
                    return Err(LifecycleError::NotPermitted(format!(
                        "{} may not cancel reservation {} while {}",
                        actor.id(),
                        reservation_id,
                        current.status
                    )));
                }

                released_driver = current.assigned_driver_id.clone();
                let mut next = current.clone();
                next.assigned_driver_id = None;
                next.status = ReservationStatus::Cancelled;
                Ok(Step::Write(next))
            })
            .await?;

        info!(
            reservation_id = %reservation_id,
            actor = %actor.id(),
            released_driver = ?released_driver,
            "Reservation cancelled"
        );
        let event = ReservationEvent::new(reservation.id, &reservation.owner_id, ReservationEventKind::Cancelled)
            .with_driver(released_driver.as_deref());
        self.publish(event).await;

        Ok(reservation)
    }

    /// Mark an assigned reservation as completed. Only the bound driver or an
    /// operator may do this.
    pub async fn complete(&self, reservation_id: Uuid, actor: &Actor) -> LifecycleResult<Reservation> {
        let (reservation, _) = self
            .transition(reservation_id, |current| {
                Self::ensure_not_final(current)?;
                if current.status != ReservationStatus::Assigned || !actor.may_complete(current) {
                    return Err(LifecycleError::NotAssigned(reservation_id));
                }

                let mut next = current.clone();
                next.status = ReservationStatus::Completed;
                Ok(Step::Write(next))
            })
            .await?;

        info!(reservation_id = %reservation_id, actor = %actor.id(), "Reservation completed");
        self.emit(&reservation, ReservationEventKind::Completed).await;
        Ok(reservation)
    }

    /// Replace the schedule fields while the reservation is still pending.
    /// The kind can not change.
    pub async fn reschedule(
        &self,
        reservation_id: Uuid,
        actor: &Actor,
        details: ReservationDetails,
    ) -> LifecycleResult<Reservation> {
        details.validate().map_err(LifecycleError::Validation)?;

        let (reservation, _) = self
            .transition(reservation_id, |current| {
                Self::ensure_not_final(current)?;
                if !actor.may_modify(current) {
                    return Err(LifecycleError::NotPermitted(format!(
                        "{} may not modify reservation {}",
                        actor.id(),
                        reservation_id
                    )));
                }
                if current.status != ReservationStatus::Pending {
                    return Err(LifecycleError::InvalidTransition {
                        from: current.status.to_string(),
                        to: "RESCHEDULED".to_string(),
                    });
                }
                if details.kind() != current.kind() {
                    return Err(LifecycleError::Validation(format!(
                        "reservation is a {}, details describe a {}",
                        current.kind().as_str(),
                        details.kind().as_str()
                    )));
                }
                if current.details == details {
                    return Ok(Step::Unchanged);
                }

                let mut next = current.clone();
                next.details = details.clone();
                Ok(Step::Write(next))
            })
            .await?;

        info!(reservation_id = %reservation_id, actor = %actor.id(), "Reservation rescheduled");
        Ok(reservation)
    }

    fn ensure_not_final(reservation: &Reservation) -> LifecycleResult<()> {
        if reservation.status.is_terminal() {
            return Err(LifecycleError::AlreadyFinal {
                reservation_id: reservation.id,
                state: reservation.status.to_string(),
            });
        }
        Ok(())
    }

    /// Read, decide, conditionally write; re-read on a rejected write.
    /// Returns the stored record and whether a write happened.
    async fn transition<F>(&self, reservation_id: Uuid, mut decide: F) -> LifecycleResult<(Reservation, bool)>
    where
        F: FnMut(&Reservation) -> LifecycleResult<Step>,
    {
        for attempt in 1..=self.max_write_attempts {
            let current = self.get_reservation(reservation_id).await?;
            let next = match decide(&current)? {
                Step::Unchanged => return Ok((current, false)),
                Step::Write(next) => next,
            };

            match self.repo.update_if(&WriteGuard::observed(&current), &next).await {
                Ok(stored) => return Ok((stored, true)),
                Err(StoreError::Conflict(_)) => {
                    debug!(
                        reservation_id = %reservation_id,
                        attempt,
                        "Conditional write rejected, re-reading"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(reservation_id = %reservation_id, "Giving up after repeated write conflicts");
        Err(LifecycleError::ConcurrentModification(reservation_id))
    }

    async fn emit(&self, reservation: &Reservation, kind: ReservationEventKind) {
        let event = ReservationEvent::new(reservation.id, &reservation.owner_id, kind)
            .with_driver(reservation.assigned_driver_id.as_deref());
        self.publish(event).await;
    }

    async fn publish(&self, event: ReservationEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!(
                reservation_id = %event.reservation_id,
                kind = ?event.kind,
                error = %e,
                "Failed to publish reservation event"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Reservation not found: {0}")]
    NotFound(Uuid),

    #[error("Payment session {session_id} is not the current session of reservation {reservation_id}")]
    StaleSession {
        reservation_id: Uuid,
        session_id: String,
    },

    #[error("Reservation {reservation_id} is already final ({state})")]
    AlreadyFinal {
        reservation_id: Uuid,
        state: String,
    },

    #[error("Reservation {reservation_id} is already claimed")]
    AlreadyClaimed {
        reservation_id: Uuid,
        driver_id: Option<String>,
    },

    #[error("Reservation {0} is not assigned to the caller")]
    NotAssigned(Uuid),

    #[error("Reservation {0} was modified concurrently, re-read and retry")]
    ConcurrentModification(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] CoreError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => LifecycleError::NotFound(id),
            StoreError::Conflict(id) => LifecycleError::ConcurrentModification(id),
            other => LifecycleError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocumentStore, MemoryEventPublisher, MemoryReservationRepository};
    use crate::models::fixtures::{new_reservation, tour_details};
    use crate::repository::StoreResult;
    use async_trait::async_trait;

    struct Harness {
        repo: Arc<MemoryReservationRepository>,
        documents: Arc<MemoryDocumentStore>,
        events: Arc<MemoryEventPublisher>,
        manager: LifecycleManager,
    }

    fn harness() -> Harness {
        let repo = Arc::new(MemoryReservationRepository::new());
        let documents = Arc::new(MemoryDocumentStore::new());
        let events = Arc::new(MemoryEventPublisher::new());
        let receipts = Arc::new(ReceiptIssuer::new(repo.clone(), documents.clone(), events.clone()));
        let manager = LifecycleManager::new(repo.clone(), receipts, events.clone());
        Harness { repo, documents, events, manager }
    }

    async fn pending_with_session(h: &Harness, session_id: &str) -> Reservation {
        let reservation = h.manager.create_reservation(new_reservation("customer-1")).await.unwrap();
        h.manager.attach_payment_session(reservation.id, session_id).await.unwrap()
    }

    async fn assigned(h: &Harness, driver_id: &str) -> Reservation {
        let reservation = pending_with_session(h, "cs_1").await;
        let confirmed = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();
        let mut next = confirmed.clone();
        next.status = ReservationStatus::Assigned;
        next.assigned_driver_id = Some(driver_id.to_string());
        h.repo.update_if(&WriteGuard::observed(&confirmed), &next).await.unwrap()
    }

    fn customer() -> Actor {
        Actor::Customer("customer-1".to_string())
    }

    fn operator() -> Actor {
        Actor::Operator("ops-1".to_string())
    }

    #[tokio::test]
    async fn test_paid_outcome_confirms_and_issues_receipt() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;

        let confirmed = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();

        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
        assert!(confirmed.receipt.is_some());

        let kinds: Vec<_> = h.events.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ReservationEventKind::Confirmed, ReservationEventKind::ReceiptIssued]);
    }

    #[tokio::test]
    async fn test_duplicate_paid_outcome_is_noop() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;

        let first = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();
        let second = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(h.documents.len().await, 1);
        assert_eq!(h.events.events().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_session_is_rejected_without_change() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_old").await;
        let rebilled = h.manager.attach_payment_session(reservation.id, "cs_new").await.unwrap();

        let result = h
            .manager
            .record_payment_outcome(reservation.id, "cs_old", PaymentOutcome::Paid)
            .await;
        assert!(matches!(result, Err(LifecycleError::StaleSession { .. })));

        let stored = h.manager.get_reservation(reservation.id).await.unwrap();
        assert_eq!(stored, rebilled);
    }

    #[tokio::test]
    async fn test_outcome_without_any_session_is_stale() {
        let h = harness();
        let reservation = h.manager.create_reservation(new_reservation("customer-1")).await.unwrap();

        let result = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await;
        assert!(matches!(result, Err(LifecycleError::StaleSession { .. })));
    }

    #[tokio::test]
    async fn test_failed_outcome_keeps_pending_and_allows_retry() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;

        let failed = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(failed.status, ReservationStatus::Pending);
        assert_eq!(failed.payment_status, PaymentStatus::Failed);
        assert!(failed.receipt.is_none());

        // Duplicate failure delivery
        let again = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(again, failed);

        // Customer retries with a fresh session
        let retried = h.manager.attach_payment_session(reservation.id, "cs_2").await.unwrap();
        assert_eq!(retried.payment_status, PaymentStatus::Pending);

        let confirmed = h
            .manager
            .record_payment_outcome(reservation.id, "cs_2", PaymentOutcome::Paid)
            .await
            .unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_failure_after_paid_is_already_final() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;
        h.manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();

        let result = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Failed)
            .await;
        assert!(matches!(result, Err(LifecycleError::AlreadyFinal { .. })));
    }

    #[tokio::test]
    async fn test_paid_reservation_cannot_be_rebilled() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;
        h.manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();

        let result = h.manager.attach_payment_session(reservation.id, "cs_2").await;
        assert!(matches!(result, Err(LifecycleError::AlreadyFinal { .. })));

        let stored = h.manager.get_reservation(reservation.id).await.unwrap();
        assert_eq!(stored.payment_session_id.as_deref(), Some("cs_1"));
    }

    #[tokio::test]
    async fn test_receipt_failure_does_not_fail_payment() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;
        h.documents.set_available(false);

        let confirmed = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
        assert!(confirmed.receipt.is_none());
    }

    #[tokio::test]
    async fn test_cancel_assigned_releases_driver() {
        let h = harness();
        let reservation = assigned(&h, "driver-1").await;

        let cancelled = h.manager.cancel(reservation.id, &operator()).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert!(cancelled.assigned_driver_id.is_none());
        // Cancellation does not refund
        assert_eq!(cancelled.payment_status, PaymentStatus::Paid);

        let last = h.events.events().pop().unwrap();
        assert_eq!(last.kind, ReservationEventKind::Cancelled);
        assert_eq!(last.driver_id.as_deref(), Some("driver-1"));
    }

    #[tokio::test]
    async fn test_customer_cannot_cancel_once_assigned() {
        let h = harness();
        let reservation = assigned(&h, "driver-1").await;

        let result = h.manager.cancel(reservation.id, &customer()).await;
        assert!(matches!(result, Err(LifecycleError::NotPermitted(_))));
    }

    #[tokio::test]
    async fn test_cancelled_is_terminal() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;
        h.manager.cancel(reservation.id, &customer()).await.unwrap();

        assert!(matches!(
            h.manager.cancel(reservation.id, &operator()).await,
            Err(LifecycleError::AlreadyFinal { .. })
        ));
        assert!(matches!(
            h.manager.complete(reservation.id, &operator()).await,
            Err(LifecycleError::AlreadyFinal { .. })
        ));
        assert!(matches!(
            h.manager.reschedule(reservation.id, &operator(), crate::models::fixtures::ride_details()).await,
            Err(LifecycleError::AlreadyFinal { .. })
        ));
        assert!(matches!(
            h.manager.attach_payment_session(reservation.id, "cs_2").await,
            Err(LifecycleError::AlreadyFinal { .. })
        ));
    }

    #[tokio::test]
    async fn test_payment_after_cancellation_is_already_final() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;
        let cancelled = h.manager.cancel(reservation.id, &customer()).await.unwrap();

        let result = h
            .manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await;
        assert!(matches!(result, Err(LifecycleError::AlreadyFinal { .. })));

        let stored = h.manager.get_reservation(reservation.id).await.unwrap();
        assert_eq!(stored, cancelled);
    }

    #[tokio::test]
    async fn test_complete_requires_bound_driver_or_operator() {
        let h = harness();
        let reservation = assigned(&h, "driver-1").await;

        let result = h
            .manager
            .complete(reservation.id, &Actor::Driver("driver-2".to_string()))
            .await;
        assert!(matches!(result, Err(LifecycleError::NotAssigned(_))));

        let completed = h
            .manager
            .complete(reservation.id, &Actor::Driver("driver-1".to_string()))
            .await
            .unwrap();
        assert_eq!(completed.status, ReservationStatus::Completed);
        assert_eq!(completed.assigned_driver_id.as_deref(), Some("driver-1"));
    }

    #[tokio::test]
    async fn test_complete_from_confirmed_is_not_assigned() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;
        h.manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();

        let result = h.manager.complete(reservation.id, &operator()).await;
        assert!(matches!(result, Err(LifecycleError::NotAssigned(_))));
    }

    #[tokio::test]
    async fn test_reschedule_only_while_pending_and_same_kind() {
        let h = harness();
        let reservation = pending_with_session(&h, "cs_1").await;

        let mut details = reservation.details.clone();
        if let ReservationDetails::Ride { pickup, .. } = &mut details {
            *pickup = "Hotel Central".to_string();
        }
        let updated = h.manager.reschedule(reservation.id, &customer(), details.clone()).await.unwrap();
        assert_eq!(updated.details, details);

        let wrong_kind = h.manager.reschedule(reservation.id, &customer(), tour_details()).await;
        assert!(matches!(wrong_kind, Err(LifecycleError::Validation(_))));

        let stranger = Actor::Customer("customer-2".to_string());
        let forbidden = h.manager.reschedule(reservation.id, &stranger, details.clone()).await;
        assert!(matches!(forbidden, Err(LifecycleError::NotPermitted(_))));

        h.manager
            .record_payment_outcome(reservation.id, "cs_1", PaymentOutcome::Paid)
            .await
            .unwrap();
        let late = h.manager.reschedule(reservation.id, &customer(), details).await;
        assert!(matches!(late, Err(LifecycleError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let h = harness();
        let mut input = new_reservation("customer-1");
        input.amount.amount_minor = 0;
        assert!(matches!(
            h.manager.create_reservation(input).await,
            Err(LifecycleError::Validation(_))
        ));
    }

    /// Repository whose conditional writes always lose the race.
    struct ContendedRepository {
        inner: MemoryReservationRepository,
    }

    #[async_trait]
    impl ReservationRepository for ContendedRepository {
        async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
            self.inner.insert(reservation).await
        }
        async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
            self.inner.get(id).await
        }
        async fn update_if(&self, _guard: &WriteGuard, next: &Reservation) -> StoreResult<Reservation> {
            Err(StoreError::Conflict(next.id))
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

    #[tokio::test]
    async fn test_persistent_conflicts_surface_as_concurrent_modification() {
        let repo = Arc::new(ContendedRepository {
            inner: MemoryReservationRepository::new(),
        });
        let events = Arc::new(MemoryEventPublisher::new());
        let receipts = Arc::new(ReceiptIssuer::new(
            repo.clone(),
            Arc::new(MemoryDocumentStore::new()),
            events.clone(),
        ));
        let manager = LifecycleManager::new(repo.clone(), receipts, events.clone()).with_max_write_attempts(2);

        let reservation = manager.create_reservation(new_reservation("customer-1")).await.unwrap();
        let result = manager.cancel(reservation.id, &customer()).await;

        assert!(matches!(result, Err(LifecycleError::ConcurrentModification(_))));
        assert!(events.events().is_empty());
        let stored = manager.get_reservation(reservation.id).await.unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
    }
}
