use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use wayfare_catalog::PricingError;
use wayfare_core::CoreError;
use wayfare_reservation::{LifecycleError, ReceiptError};

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    /// Precondition failures; `code` tells the client what to re-read
    ConflictError { code: &'static str, message: String },
    UnprocessableError(String),
    UpstreamError(String),
    InternalServerError(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::AuthenticationError(_) => "UNAUTHENTICATED",
            AppError::AuthorizationError(_) => "NOT_PERMITTED",
            AppError::ValidationError(_) => "VALIDATION",
            AppError::NotFoundError(_) => "NOT_FOUND",
            AppError::ConflictError { code, .. } => *code,
            AppError::UnprocessableError(_) => "UNPROCESSABLE",
            AppError::UpstreamError(_) => "UPSTREAM",
            AppError::InternalServerError(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError { message, .. } => (StatusCode::CONFLICT, message),
            AppError::UnprocessableError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

fn conflict(code: &'static str, err: impl ToString) -> AppError {
    AppError::ConflictError {
        code,
        message: err.to_string(),
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::InternalError(msg) => AppError::InternalServerError(msg),
            other => AppError::UpstreamError(other.to_string()),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            LifecycleError::StaleSession { .. } => conflict("STALE_SESSION", err),
            LifecycleError::AlreadyFinal { .. } => conflict("ALREADY_FINAL", err),
            LifecycleError::AlreadyClaimed { .. } => conflict("ALREADY_CLAIMED", err),
            LifecycleError::NotAssigned(_) => conflict("NOT_ASSIGNED", err),
            LifecycleError::ConcurrentModification(_) => conflict("CONCURRENT_MODIFICATION", err),
            LifecycleError::InvalidTransition { .. } => conflict("INVALID_TRANSITION", err),
            LifecycleError::NotPermitted(msg) => AppError::AuthorizationError(msg),
            LifecycleError::Validation(msg) => AppError::ValidationError(msg),
            LifecycleError::Gateway(e) => e.into(),
            LifecycleError::Store(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<ReceiptError> for AppError {
    fn from(err: ReceiptError) -> Self {
        match err {
            ReceiptError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            ReceiptError::NotPaid(_) => conflict("NOT_PAID", err),
            ReceiptError::ConcurrentModification(_) => conflict("CONCURRENT_MODIFICATION", err),
            ReceiptError::Document(e) => AppError::UpstreamError(e.to_string()),
            ReceiptError::Encoding(e) => AppError::InternalServerError(e.to_string()),
            ReceiptError::Store(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::UnprocessableError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_lifecycle_errors_map_to_status() {
        let id = Uuid::new_v4();
        let cases = [
            (LifecycleError::NotFound(id), StatusCode::NOT_FOUND),
            (
                LifecycleError::AlreadyClaimed { reservation_id: id, driver_id: None },
                StatusCode::CONFLICT,
            ),
            (LifecycleError::NotPermitted("no".to_string()), StatusCode::FORBIDDEN),
            (LifecycleError::Validation("bad".to_string()), StatusCode::BAD_REQUEST),
            (
                LifecycleError::Gateway(CoreError::GatewayError("down".to_string())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_unknown_tour_is_unprocessable() {
        let response = AppError::from(PricingError::UnknownTour("ATLANTIS".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
