use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use wayfare_core::SessionStatus;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub status: SessionStatus,
}

/// POST /mock-checkout/{session_id}
///
/// Development stand-in for the hosted checkout page. Settling here only moves
/// the mock session; the reservation follows via verify, webhook or poller.
pub async fn settle_mock_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SettleRequest>,
) -> Result<StatusCode, AppError> {
    let gateway = state
        .mock_gateway
        .as_ref()
        .ok_or_else(|| AppError::NotFoundError("mock checkout is disabled".to_string()))?;

    gateway
        .settle(&session_id, req.status)
        .await
        .map_err(|e| AppError::NotFoundError(e.to_string()))?;

    tracing::info!(session_id = %session_id, status = ?req.status, "Mock session settled");
    Ok(StatusCode::NO_CONTENT)
}
