use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use wayfare_reservation::Actor;

use crate::state::{AppState, AuthConfig};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    /// One of `CUSTOMER`, `OPERATOR`, `DRIVER`
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn actor(&self) -> Option<Actor> {
        let id = self.sub.clone();
        match self.role.as_str() {
            "CUSTOMER" => Some(Actor::Customer(id)),
            "OPERATOR" => Some(Actor::Operator(id)),
            "DRIVER" => Some(Actor::Driver(id)),
            _ => None,
        }
    }
}

/// Mint a token for `sub` with the configured lifetime.
pub fn issue_token(auth: &AuthConfig, sub: &str, role: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = chrono::Utc::now().timestamp() as usize + auth.expiration as usize;
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
}

/// Validates the bearer token and injects the caller's [`Actor`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    let actor = token_data.claims.actor().ok_or(StatusCode::FORBIDDEN)?;

    req.extensions_mut().insert(actor);
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
