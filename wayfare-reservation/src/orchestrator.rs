use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;
use wayfare_core::{
    CoreError, CoreResult, PaymentGateway, PaymentSession, SessionMetadata, SessionStatus,
    SessionVerification,
};
use wayfare_shared::Money;

use crate::lifecycle::{LifecycleError, LifecycleManager, LifecycleResult};
use crate::models::Reservation;

/// Result of asking the gateway about a session.
#[derive(Debug)]
pub enum Reconciliation {
    /// The session reached a terminal state and was recorded.
    Recorded(Reservation),
    /// The customer has not finished checking out yet.
    StillOpen(Reservation),
}

/// Identifies one checkout attempt: any write to the reservation, attaching
/// a session included, starts a new one.
fn checkout_key(reservation: &Reservation) -> String {
    format!(
        "checkout-{}-{}-{}",
        reservation.id,
        reservation.payment_session_id.as_deref().unwrap_or("none"),
        reservation.updated_at.timestamp_micros()
    )
}

/// Sits between the lifecycle manager and the payment processor
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    lifecycle: Arc<LifecycleManager>,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self { gateway, lifecycle }
    }

    /// Open a checkout session for a pending reservation and make it the
    /// reservation's current session.
    pub async fn open_payment_session(&self, reservation_id: Uuid) -> LifecycleResult<PaymentSession> {
        let reservation = self.lifecycle.get_reservation(reservation_id).await?;
        LifecycleManager::ensure_billable(&reservation)?;

        let metadata = SessionMetadata {
            reservation_id,
            owner_id: reservation.owner_id.clone(),
            description: reservation.details.describe(),
            idempotency_key: checkout_key(&reservation),
        };
        let session = self.gateway.create_session(&reservation.amount, &metadata).await?;

        // If the reservation moved while we talked to the gateway this fails
        // and the session is simply never used; it expires on the provider side.
        self.lifecycle
            .attach_payment_session(reservation_id, &session.id)
            .await?;

        Ok(session)
    }

    /// Verify a session with the gateway and record its outcome. Webhook
    /// deliveries and polling both come through here.
    pub async fn reconcile_session(
        &self,
        reservation_id: Uuid,
        session_id: &str,
    ) -> LifecycleResult<Reconciliation> {
        // Only the current session is ever sent to the gateway
        let reservation = self.lifecycle.get_reservation(reservation_id).await?;
        if reservation.payment_session_id.as_deref() != Some(session_id) {
            return Err(LifecycleError::StaleSession {
                reservation_id,
                session_id: session_id.to_string(),
            });
        }

        let verification = self.gateway.verify_session(session_id).await?;

        match verification.status.outcome() {
            Some(outcome) => {
                let reservation = self
                    .lifecycle
                    .record_payment_outcome(reservation_id, session_id, outcome)
                    .await?;
                Ok(Reconciliation::Recorded(reservation))
            }
            None => Ok(Reconciliation::StillOpen(reservation)),
        }
    }
}

/// In-process gateway for development. Sessions stay open until a test or a
/// dev tool settles them with [`MockPaymentGateway::settle`].
pub struct MockPaymentGateway {
    checkout_base: String,
    sessions: RwLock<HashMap<String, SessionVerification>>,
}

impl MockPaymentGateway {
    pub fn new(checkout_base: &str) -> Self {
        Self {
            checkout_base: checkout_base.trim_end_matches('/').to_string(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn settle(&self, session_id: &str, status: SessionStatus) -> CoreResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::GatewayError(format!("unknown session {}", session_id)))?;
        session.status = status;
        Ok(())
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new("http://localhost:8080/mock-checkout")
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(
        &self,
        amount: &Money,
        metadata: &SessionMetadata,
    ) -> CoreResult<PaymentSession> {
        if !amount.is_positive() {
            return Err(CoreError::ValidationError(format!("cannot bill {}", amount)));
        }

        let session_id = format!("mock_cs_{}", Uuid::new_v4().simple());
        self.sessions.write().await.insert(
            session_id.clone(),
            SessionVerification {
                session_id: session_id.clone(),
                status: SessionStatus::Open,
                amount_minor: Some(amount.amount_minor),
            },
        );

        info!(
            session_id = %session_id,
            reservation_id = %metadata.reservation_id,
            amount = %amount,
            "Mock checkout session opened"
        );

        Ok(PaymentSession {
            redirect_url: format!("{}/{}", self.checkout_base, session_id),
            id: session_id,
            expires_at: Some(Utc::now() + Duration::minutes(30)),
        })
    }

    async fn verify_session(&self, session_id: &str) -> CoreResult<SessionVerification> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| CoreError::GatewayError(format!("unknown session {}", session_id)))
    }
}
