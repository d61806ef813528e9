use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_reservation::{
    Actor, ContactInfo, NewReservation, Receipt, Reconciliation, Reservation, ReservationDetails,
};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub details: ReservationDetails,
    pub contact: ContactInfo,
    /// Operators book on behalf of a customer
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub driver_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentSessionResponse {
    pub reservation_id: Uuid,
    pub session_id: String,
    pub redirect_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// False while the customer has not finished checking out
    pub settled: bool,
    pub reservation: Reservation,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation).get(list_reservations))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/details", put(reschedule))
        .route("/v1/reservations/{id}/payment-session", post(open_payment_session))
        .route(
            "/v1/reservations/{id}/payment-session/{session_id}/verify",
            post(verify_payment_session),
        )
        .route("/v1/reservations/{id}/cancel", post(cancel))
        .route("/v1/reservations/{id}/claim", post(claim))
        .route("/v1/reservations/{id}/complete", post(complete))
        .route("/v1/reservations/{id}/receipt", post(issue_receipt).get(get_receipt))
}

// ============================================================================
// Handlers
// ============================================================================

async fn load_visible(state: &AppState, id: Uuid, actor: &Actor) -> Result<Reservation, AppError> {
    let reservation = state.lifecycle.get_reservation(id).await?;
    if !actor.may_view(&reservation) {
        return Err(AppError::AuthorizationError(format!(
            "{} may not view reservation {}",
            actor.id(),
            id
        )));
    }
    Ok(reservation)
}

/// POST /v1/reservations
async fn create_reservation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let owner_id = match (&actor, req.owner_id) {
        (Actor::Customer(id), None) => id.clone(),
        (Actor::Customer(id), Some(owner)) if owner == *id => owner,
        (Actor::Operator(_), Some(owner)) if !owner.trim().is_empty() => owner,
        (Actor::Operator(_), _) => {
            return Err(AppError::ValidationError(
                "owner_id is required when booking for a customer".to_string(),
            ))
        }
        _ => {
            return Err(AppError::AuthorizationError(format!(
                "{} may not create this reservation",
                actor.id()
            )))
        }
    };

    if req.contact.name.trim().is_empty() || !req.contact.email.expose().contains('@') {
        return Err(AppError::ValidationError("contact needs a name and an email".to_string()));
    }
    req.details.validate().map_err(AppError::ValidationError)?;
    let amount = state.pricing.quote(&req.details)?;

    let reservation = state
        .lifecycle
        .create_reservation(NewReservation {
            owner_id,
            details: req.details,
            contact: req.contact,
            amount,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// GET /v1/reservations
async fn list_reservations(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let owner_id = match (&actor, query.owner_id) {
        (Actor::Customer(id), _) => id.clone(),
        (Actor::Operator(_), Some(owner)) => owner,
        (Actor::Operator(_), None) => {
            return Err(AppError::ValidationError("owner_id query parameter is required".to_string()))
        }
        (Actor::Driver(_), _) => {
            return Err(AppError::AuthorizationError("drivers may not list reservations".to_string()))
        }
    };

    Ok(Json(state.lifecycle.list_for_owner(&owner_id).await?))
}

/// GET /v1/reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(load_visible(&state, id, &actor).await?))
}

/// PUT /v1/reservations/{id}/details
///
/// The amount was fixed at creation, so a change that would be priced
/// differently is refused; the customer books a new reservation instead.
async fn reschedule(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(details): Json<ReservationDetails>,
) -> Result<Json<Reservation>, AppError> {
    let current = load_visible(&state, id, &actor).await?;
    details.validate().map_err(AppError::ValidationError)?;

    if details.kind() == current.kind() {
        let quoted = state.pricing.quote(&details)?;
        if quoted != current.amount {
            return Err(AppError::UnprocessableError(format!(
                "new details would cost {}, reservation was booked at {}",
                quoted, current.amount
            )));
        }
    }

    Ok(Json(state.lifecycle.reschedule(id, &actor, details).await?))
}

/// POST /v1/reservations/{id}/payment-session
async fn open_payment_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<PaymentSessionResponse>), AppError> {
    let reservation = load_visible(&state, id, &actor).await?;
    if !actor.may_modify(&reservation) {
        return Err(AppError::AuthorizationError(format!(
            "{} may not pay for reservation {}",
            actor.id(),
            id
        )));
    }

    let session = state.payments.open_payment_session(id).await?;
    Ok((
        StatusCode::CREATED,
        Json(PaymentSessionResponse {
            reservation_id: id,
            session_id: session.id,
            redirect_url: session.redirect_url,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /v1/reservations/{id}/payment-session/{session_id}/verify
///
/// Pull-based counterpart of the webhook, for return-from-checkout pages.
async fn verify_payment_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, session_id)): Path<(Uuid, String)>,
) -> Result<Json<VerifyResponse>, AppError> {
    load_visible(&state, id, &actor).await?;

    let response = match state.payments.reconcile_session(id, &session_id).await? {
        Reconciliation::Recorded(reservation) => VerifyResponse {
            settled: true,
            reservation,
        },
        Reconciliation::StillOpen(reservation) => VerifyResponse {
            settled: false,
            reservation,
        },
    };
    Ok(Json(response))
}

/// POST /v1/reservations/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.lifecycle.cancel(id, &actor).await?))
}

/// POST /v1/reservations/{id}/claim
///
/// Drivers claim for themselves; operators name the driver.
async fn claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<Reservation>, AppError> {
    let driver_id = match (&actor, req.driver_id) {
        (Actor::Driver(own), None) => own.clone(),
        (Actor::Driver(own), Some(named)) if named == *own => named,
        (Actor::Operator(_), Some(named)) => named,
        (Actor::Operator(_), None) => {
            return Err(AppError::ValidationError("driver_id is required".to_string()))
        }
        _ => {
            return Err(AppError::AuthorizationError(format!(
                "{} may not claim reservation {}",
                actor.id(),
                id
            )))
        }
    };

    Ok(Json(state.assignments.claim(id, &driver_id).await?))
}

/// POST /v1/reservations/{id}/complete
async fn complete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.lifecycle.complete(id, &actor).await?))
}

/// POST /v1/reservations/{id}/receipt
///
/// Retries issuance; returns the existing receipt when there already is one.
async fn issue_receipt(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Receipt>, AppError> {
    load_visible(&state, id, &actor).await?;
    Ok(Json(state.receipts.issue(id).await?))
}

/// GET /v1/reservations/{id}/receipt
async fn get_receipt(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    load_visible(&state, id, &actor).await?;

    let document = state
        .receipts
        .document(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("No receipt issued for reservation {}", id)))?;

    Ok(([(header::CONTENT_TYPE, "application/json")], document))
}
