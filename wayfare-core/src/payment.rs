use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_shared::Money;

use crate::CoreResult;

/// Terminal result of a checkout attempt, as reconciled into a reservation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

/// State of a checkout session as reported by the processor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Paid,
    Failed,
    Expired,
}

impl SessionStatus {
    /// `None` while the customer can still complete the checkout.
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match self {
            SessionStatus::Open => None,
            SessionStatus::Paid => Some(PaymentOutcome::Paid),
            SessionStatus::Failed | SessionStatus::Expired => Some(PaymentOutcome::Failed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub reservation_id: Uuid,
    pub owner_id: String,
    pub description: String,
    /// Same for every retry of one checkout attempt, so the processor can
    /// hand back the session it already created.
    pub idempotency_key: String,
}

/// One checkout attempt opened with the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: String, // Provider's ID (e.g., cs_test_123)
    pub redirect_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionVerification {
    pub session_id: String,
    pub status: SessionStatus,
    pub amount_minor: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout session for the given amount
    async fn create_session(
        &self,
        amount: &Money,
        metadata: &SessionMetadata,
    ) -> CoreResult<PaymentSession>;

    /// Ask the processor for the current state of a session
    async fn verify_session(&self, session_id: &str) -> CoreResult<SessionVerification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_terminal_statuses_have_outcomes() {
        assert_eq!(SessionStatus::Open.outcome(), None);
        assert_eq!(SessionStatus::Paid.outcome(), Some(PaymentOutcome::Paid));
        assert_eq!(SessionStatus::Failed.outcome(), Some(PaymentOutcome::Failed));
        assert_eq!(SessionStatus::Expired.outcome(), Some(PaymentOutcome::Failed));
    }
}
