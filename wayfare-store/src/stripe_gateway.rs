use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};
use wayfare_core::{
    CoreError, CoreResult, PaymentGateway, PaymentSession, SessionMetadata, SessionStatus,
    SessionVerification,
};
use wayfare_shared::Money;

/// Checkout session as returned by a Stripe-compatible API.
#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
    expires_at: Option<i64>,
    status: Option<String>,
    payment_status: Option<String>,
    amount_total: Option<i64>,
}

impl CheckoutSession {
    fn session_status(&self) -> SessionStatus {
        match (self.payment_status.as_deref(), self.status.as_deref()) {
            (Some("paid") | Some("no_payment_required"), _) => SessionStatus::Paid,
            (_, Some("expired")) => SessionStatus::Expired,
            _ => SessionStatus::Open,
        }
    }
}

/// Provider ids are `cs_` style tokens; anything else must not reach the URL path.
fn is_session_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 255
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Hosted checkout over the form-encoded Stripe REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
    success_url: String,
    cancel_url: String,
}

impl StripeGateway {
    pub fn new(
        api_base: &str,
        secret_key: &str,
        success_url: &str,
        cancel_url: &str,
        timeout: Duration,
    ) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
        })
    }

    async fn read_session(response: reqwest::Response) -> CoreResult<CheckoutSession> {
        match response.status() {
            StatusCode::OK => response
                .json::<CheckoutSession>()
                .await
                .map_err(|e| CoreError::GatewayError(format!("malformed session: {}", e))),
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorBody>(&body)
                    .map(|b| b.error.message)
                    .unwrap_or(body);
                warn!(status = status.as_u16(), "Payment provider rejected request");
                Err(CoreError::GatewayError(format!("{}: {}", status.as_u16(), message)))
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(&self, amount: &Money, metadata: &SessionMetadata) -> CoreResult<PaymentSession> {
        if !amount.is_positive() {
            return Err(CoreError::ValidationError(format!("cannot bill {}", amount)));
        }

        let reservation_id = metadata.reservation_id.to_string();
        let unit_amount = amount.amount_minor.to_string();
        let currency = amount.currency.to_lowercase();
        let form = [
            ("mode", "payment"),
            ("success_url", self.success_url.as_str()),
            ("cancel_url", self.cancel_url.as_str()),
            ("client_reference_id", reservation_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", currency.as_str()),
            ("line_items[0][price_data][unit_amount]", unit_amount.as_str()),
            ("line_items[0][price_data][product_data][name]", metadata.description.as_str()),
            ("metadata[reservation_id]", reservation_id.as_str()),
            ("metadata[owner_id]", metadata.owner_id.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", metadata.idempotency_key.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| CoreError::GatewayError(e.to_string()))?;

        let session = Self::read_session(response).await?;
        let redirect_url = session
            .url
            .clone()
            .ok_or_else(|| CoreError::GatewayError(format!("session {} has no checkout url", session.id)))?;

        info!(
            session_id = %session.id,
            reservation_id = %metadata.reservation_id,
            amount = %amount,
            "Checkout session opened"
        );

        Ok(PaymentSession {
            id: session.id,
            redirect_url,
            expires_at: session.expires_at.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        })
    }

    async fn verify_session(&self, session_id: &str) -> CoreResult<SessionVerification> {
        if !is_session_id(session_id) {
            return Err(CoreError::ValidationError(format!(
                "not a checkout session id: {:?}",
                session_id
            )));
        }

        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| CoreError::GatewayError(e.to_string()))?;

        let session = Self::read_session(response).await?;
        Ok(SessionVerification {
            status: session.session_status(),
            amount_minor: session.amount_total,
            session_id: session.id,
        })
    }
}
