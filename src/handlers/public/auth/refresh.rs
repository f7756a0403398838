// handlers/public/auth/refresh.rs - POST /auth/refresh

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{issue_token, TokenResponse};
use crate::auth;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::DoctorService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// Trades a correctly signed token, expired or not, for a fresh one as long
/// as it is inside the grace window and the doctor is still active.
pub async fn refresh_post(State(state): State<AppState>, Json(req): Json<RefreshRequest>) -> ApiResult<TokenResponse> {
    let claims = auth::validate_jwt(req.token.trim(), true)?;
    if !auth::within_refresh_window(&claims) {
        return Err(ApiError::unauthorized("Token is too old to refresh, please log in again"));
    }

    let doctor = DoctorService::new(state.pool.clone())
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;
    if !doctor.is_active {
        return Err(ApiError::forbidden("Doctor account is deactivated"));
    }

    tracing::debug!("Refreshed token for doctor {}", doctor.id);
    Ok(ApiResponse::success(issue_token(doctor)?))
}
