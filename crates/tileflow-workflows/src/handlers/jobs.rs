use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use tileflow_core::problem::Problem;
use tracing::info;

use crate::handlers::types::{AppState, CancelJobResponse, JobResultsResponse};
use crate::tenant::Tenant;

/// Fetch a job's result descriptor
///
/// The job reference is resolved within the tenant's view: a unique bare
/// job id, or a `{workflow_id}_{job_id}` composite when unambiguous.
#[utoipa::path(
    tag = "Jobs",
    get,
    path = "/jobs/{job_id}/results",
    params(
        ("job_id" = String, Path, description = "Job reference"),
        ("X-User-ID" = String, Header, description = "Tenant id")
    ),
    responses(
        (status = 200, description = "Job outcome and result descriptor", body = JobResultsResponse),
        (status = 404, description = "Unknown or ambiguous job reference")
    )
)]
pub async fn get_job_results(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    tenant: Tenant,
) -> Result<impl IntoResponse, Problem> {
    let record = state.engine.get_job(tenant.id(), &job_id)?;
    Ok(Json(JobResultsResponse {
        workflow_id: record.workflow_id,
        job_id: record.job_id,
        status: record.status,
        result_path: record.result_path,
        error_message: record.error_message,
    }))
}

/// Cancel a PENDING job
///
/// Only jobs that have not started are cancellable; dependents fail with
/// an upstream-cancelled message.
#[utoipa::path(
    tag = "Jobs",
    delete,
    path = "/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job reference"),
        ("X-User-ID" = String, Header, description = "Tenant id")
    ),
    responses(
        (status = 200, description = "Job cancelled", body = CancelJobResponse),
        (status = 404, description = "Unknown or ambiguous job reference"),
        (status = 409, description = "Job already started or finished")
    )
)]
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    tenant: Tenant,
) -> Result<impl IntoResponse, Problem> {
    info!(tenant_id = tenant.id(), job = %job_id, "cancellation requested");
    let record = state.engine.cancel_job(tenant.id(), &job_id).await?;
    Ok(Json(CancelJobResponse {
        workflow_id: record.workflow_id,
        job_id: record.job_id,
        status: record.status,
    }))
}
