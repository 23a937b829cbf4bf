use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tileflow_core::problem::Problem;

use crate::handlers::types::AppState;

/// Point-in-time dashboard snapshot
///
/// Worker occupancy, queue depths, active tenants, the sliding-window job
/// latency and the structural health self-test. Read-only over a
/// consistent view of scheduler state.
#[utoipa::path(
    tag = "Metrics",
    get,
    path = "/metrics/dashboard",
    responses(
        (status = 200, description = "Dashboard metrics", body = tileflow_scheduler::DashboardSnapshot)
    )
)]
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Problem> {
    Ok(Json(state.engine.dashboard()))
}
