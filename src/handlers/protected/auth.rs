// handlers/protected/auth.rs - GET /api/auth/whoami

use axum::Extension;

use crate::middleware::{Actor, ApiResponse, ApiResult};

/// Current actor as resolved by the auth middleware
pub async fn whoami(Extension(actor): Extension<Actor>) -> ApiResult<Actor> {
    Ok(ApiResponse::success(actor))
}
