use std::time::Duration;
use uuid::Uuid;
use wayfare_core::{CoreError, PaymentGateway, SessionMetadata, SessionStatus};
use wayfare_shared::Money;
use wayfare_store::StripeGateway;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> StripeGateway {
    StripeGateway::new(
        &server.uri(),
        "sk_test_123",
        "https://wayfare.example/paid",
        "https://wayfare.example/cancelled",
        Duration::from_secs(5),
    )
    .unwrap()
}

fn metadata() -> SessionMetadata {
    SessionMetadata {
        reservation_id: Uuid::new_v4(),
        owner_id: "customer-1".to_string(),
        description: "Tour CASTLE on 2026-11-03 at 14:00 (2 pax)".to_string(),
        idempotency_key: "checkout-attempt-1".to_string(),
    }
}

#[tokio::test]
async fn test_create_session_posts_form_and_returns_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(header("idempotency-key", "checkout-attempt-1"))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains("unit_amount%5D=9000"))
        .and(body_string_contains("currency%5D=eur"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_test_abc",
            "url": "https://checkout.example/pay/cs_test_abc",
            "expires_at": 1_800_000_000,
            "status": "open",
            "payment_status": "unpaid",
            "amount_total": 9000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = gateway(&server)
        .create_session(&Money::new(9_000, "EUR"), &metadata())
        .await
        .unwrap();

    assert_eq!(session.id, "cs_test_abc");
    assert_eq!(session.redirect_url, "https://checkout.example/pay/cs_test_abc");
    assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1_800_000_000));
}

#[tokio::test]
async fn test_verify_session_maps_provider_states() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_paid",
            "status": "complete",
            "payment_status": "paid",
            "amount_total": 9000
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_expired"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_expired",
            "status": "expired",
            "payment_status": "unpaid"
        })))
        .mount(&server)
        .await;

    let gateway = gateway(&server);

    let paid = gateway.verify_session("cs_paid").await.unwrap();
    assert_eq!(paid.status, SessionStatus::Paid);
    assert_eq!(paid.amount_minor, Some(9_000));

    let expired = gateway.verify_session("cs_expired").await.unwrap();
    assert_eq!(expired.status, SessionStatus::Expired);
}

#[tokio::test]
async fn test_provider_error_surfaces_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "message": "No such checkout.session: cs_missing" }
        })))
        .mount(&server)
        .await;

    let result = gateway(&server).verify_session("cs_missing").await;
    match result {
        Err(CoreError::GatewayError(message)) => {
            assert!(message.starts_with("404"));
            assert!(message.contains("No such checkout.session"));
        }
        other => panic!("expected GatewayError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_zero_amount_is_rejected_without_calling_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let result = gateway(&server).create_session(&Money::new(0, "EUR"), &metadata()).await;
    assert!(matches!(result, Err(CoreError::ValidationError(_))));
}

#[tokio::test]
async fn test_malformed_session_id_never_reaches_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = gateway(&server).verify_session("../../v1/customers").await;
    assert!(matches!(result, Err(CoreError::ValidationError(_))));
}
