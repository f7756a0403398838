// handlers/protected/dashboard.rs - GET /api/dashboard

use axum::{extract::State, Extension};

use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::services::dashboard_service::Dashboard;
use crate::services::DashboardService;
use crate::state::AppState;

pub async fn overview(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Dashboard> {
    let doctor = actor.require_doctor()?;
    let dashboard = DashboardService::new(state.pool.clone()).overview(doctor.id).await?;
    Ok(ApiResponse::success(dashboard))
}
