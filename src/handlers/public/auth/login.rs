// handlers/public/auth/login.rs - POST /auth/doctors/login

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{issue_token, TokenResponse};
use crate::auth;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::DoctorService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Unknown email and wrong password share one 401 so accounts cannot be enumerated.
/// Deactivated doctors get 403 after the password checks out.
pub async fn login_post(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> ApiResult<TokenResponse> {
    let doctor = DoctorService::new(state.pool.clone()).find_by_email(&req.email).await?;

    let Some(doctor) = doctor else {
        tracing::info!("Login failed: unknown email");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    let hash = doctor.password_hash.clone();
    let password = req.password;
    let matches = tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|e| {
            tracing::error!("Password verification task failed: {}", e);
            ApiError::internal_server_error("Failed to verify credentials")
        })?;

    if !matches {
        tracing::info!("Login failed: bad password for doctor {}", doctor.id);
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    if !doctor.is_active {
        return Err(ApiError::forbidden("Doctor account is deactivated"));
    }

    tracing::info!("Doctor {} logged in", doctor.id);
    Ok(ApiResponse::success(issue_token(doctor)?))
}
