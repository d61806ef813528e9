use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;
use wayfare_reservation::{LifecycleError, Reconciliation};

use crate::error::AppError;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-wayfare-webhook-secret";

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    fn reservation_id(&self) -> Option<Uuid> {
        self.metadata
            .get("reservation_id")
            .or(self.client_reference_id.as_ref())
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// Constant-time check of the shared secret. An empty secret on either side never matches.
fn secret_matches(presented: &str, expected: &str) -> bool {
    !presented.is_empty()
        && !expected.is_empty()
        && constant_time_eq::constant_time_eq(presented.as_bytes(), expected.as_bytes())
}

/// POST /v1/webhooks/payments
///
/// The payload is only a hint: the session is re-verified with the gateway,
/// exactly as the poller does. Outcomes that no longer apply are acknowledged
/// so the provider stops redelivering; gateway or store failures are not.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentWebhook>,
) -> Result<StatusCode, AppError> {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if !secret_matches(presented, &state.webhook_secret) {
        return Err(AppError::AuthenticationError("invalid webhook secret".to_string()));
    }

    let session_id = &payload.data.object.id;
    tracing::info!("Received webhook {}: {} for session {}", payload.id, payload.type_, session_id);

    let Some(reservation_id) = payload.data.object.reservation_id() else {
        tracing::warn!("Webhook {} carries no reservation reference, ignoring", payload.id);
        return Ok(StatusCode::OK);
    };

    match state.payments.reconcile_session(reservation_id, session_id).await {
        Ok(Reconciliation::Recorded(reservation)) => {
            tracing::info!(
                reservation_id = %reservation_id,
                status = %reservation.status,
                payment_status = %reservation.payment_status,
                "Webhook outcome recorded"
            );
            Ok(StatusCode::OK)
        }
        Ok(Reconciliation::StillOpen(_)) => Ok(StatusCode::OK),
        Err(
            e @ (LifecycleError::StaleSession { .. }
            | LifecycleError::AlreadyFinal { .. }
            | LifecycleError::NotFound(_)),
        ) => {
            tracing::warn!(reservation_id = %reservation_id, error = %e, "Webhook outcome not applicable");
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_must_match_exactly() {
        assert!(secret_matches("whsec_live", "whsec_live"));
        assert!(!secret_matches("whsec_livE", "whsec_live"));
        assert!(!secret_matches("whsec_liv", "whsec_live"));
        assert!(!secret_matches("", "whsec_live"));
        assert!(!secret_matches("", ""));
    }

    #[test]
    fn test_reservation_reference_prefers_metadata() {
        let id = Uuid::new_v4();
        let object = CheckoutSessionObject {
            id: "cs_1".to_string(),
            client_reference_id: Some("not-a-uuid".to_string()),
            metadata: HashMap::from([("reservation_id".to_string(), id.to_string())]),
        };
        assert_eq!(object.reservation_id(), Some(id));

        let fallback = CheckoutSessionObject {
            id: "cs_1".to_string(),
            client_reference_id: Some(id.to_string()),
            metadata: HashMap::new(),
        };
        assert_eq!(fallback.reservation_id(), Some(id));
    }
}
