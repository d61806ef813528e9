use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Serialize;
use wayfare_reservation::ReservationDetails;
use wayfare_shared::Money;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TourResponse {
    pub code: String,
    pub name: String,
    pub base_minor: i64,
    pub per_passenger_minor: i64,
    pub currency: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tours", get(list_tours))
        .route("/v1/quotes", post(quote))
}

/// GET /v1/tours
async fn list_tours(State(state): State<AppState>) -> Json<Vec<TourResponse>> {
    let tours = state
        .pricing
        .tours()
        .into_iter()
        .map(|(code, fare)| TourResponse {
            code: code.to_string(),
            name: fare.name.clone(),
            base_minor: fare.base_minor,
            per_passenger_minor: fare.per_passenger_minor,
            currency: state.pricing.currency.clone(),
        })
        .collect();
    Json(tours)
}

/// POST /v1/quotes
/// Price a booking without creating it.
async fn quote(
    State(state): State<AppState>,
    Json(details): Json<ReservationDetails>,
) -> Result<Json<Money>, AppError> {
    details.validate().map_err(AppError::ValidationError)?;
    Ok(Json(state.pricing.quote(&details)?))
}
