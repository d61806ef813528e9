//! In-process implementations of the storage collaborators, used by tests and
//! single-node development setups.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;
use wayfare_core::{CoreError, CoreResult, DocumentStore, EventPublisher};
use wayfare_shared::ReservationEvent;

use crate::models::{PaymentStatus, Reservation, ReservationStatus};
use crate::repository::{ReservationRepository, StoreError, StoreResult, WriteGuard};

#[derive(Default)]
pub struct MemoryReservationRepository {
    records: RwLock<HashMap<Uuid, Reservation>>,
}

impl MemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for MemoryReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&reservation.id) {
            return Err(StoreError::Duplicate(reservation.id));
        }
        records.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update_if(&self, guard: &WriteGuard, next: &Reservation) -> StoreResult<Reservation> {
        // Check and write under one lock so the swap is atomic
        let mut records = self.records.write().await;
        let current = records
            .get_mut(&next.id)
            .ok_or(StoreError::NotFound(next.id))?;

        if !guard.matches(current) {
            return Err(StoreError::Conflict(next.id));
        }

        current.details = next.details.clone();
        current.status = next.status;
        current.payment_status = next.payment_status;
        current.payment_session_id = next.payment_session_id.clone();
        current.assigned_driver_id = next.assigned_driver_id.clone();
        current.receipt = next.receipt.clone();
        current.updated_at = Utc::now();

        Ok(current.clone())
    }

    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Reservation>> {
        let records = self.records.read().await;
        let mut owned: Vec<Reservation> = records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn list_awaiting_payment(&self, limit: usize) -> StoreResult<Vec<Reservation>> {
        let records = self.records.read().await;
        let mut awaiting: Vec<Reservation> = records
            .values()
            .filter(|r| {
                r.status == ReservationStatus::Pending
                    && r.payment_status == PaymentStatus::Pending
                    && r.payment_session_id.is_some()
            })
            .cloned()
            .collect();
        awaiting.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        awaiting.truncate(limit);
        Ok(awaiting)
    }

    async fn list_missing_receipts(&self, limit: usize) -> StoreResult<Vec<Reservation>> {
        let records = self.records.read().await;
        let mut missing: Vec<Reservation> = records
            .values()
            .filter(|r| r.payment_status == PaymentStatus::Paid && r.receipt.is_none())
            .cloned()
            .collect();
        missing.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        missing.truncate(limit);
        Ok(missing)
    }
}

/// Document store keeping everything in a map. Can be switched offline to
/// exercise the receipt retry path.
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn store(&self, document: &[u8]) -> CoreResult<String> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CoreError::DocumentError("document store unavailable".to_string()));
        }
        let reference = format!("memory:{}", Uuid::new_v4());
        self.documents
            .write()
            .await
            .insert(reference.clone(), document.to_vec());
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.documents.read().await.get(reference).cloned())
    }
}

/// Publisher that records every event it receives.
#[derive(Default)]
pub struct MemoryEventPublisher {
    events: Mutex<Vec<ReservationEvent>>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReservationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(&self, event: &ReservationEvent) -> CoreResult<()> {
        self.events
            .lock()
            .map_err(|e| CoreError::PublishError(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}
