use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod catalog;
pub mod error;
pub mod middleware;
pub mod mock_checkout;
pub mod reservations;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::USER_AGENT,
        ]);

    let authenticated = reservations::routes().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(health))
        .route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook))
        .route("/mock-checkout/{session_id}", post(mock_checkout::settle_mock_session))
        .merge(catalog::routes())
        .merge(authenticated)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::circuit_breaker_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Per-IP fixed window in Redis. Fails open: a Redis outage or a request
/// without peer information is let through.
async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (Some(redis), Some(ConnectInfo(addr))) = (
        state.redis.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().copied(),
    ) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match redis
        .check_rate_limit(&key, state.rate_limit.limit, state.rate_limit.window_seconds)
        .await
    {
        Ok(decision) if !decision.allowed() => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, decision.reset_in.to_string())],
            Json(json!({ "error": "Rate limit exceeded", "code": "RATE_LIMITED" })),
        )
            .into_response(),
        Ok(_) => next.run(req).await,
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, letting request through: {}", e);
            next.run(req).await
        }
    }
}
