use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tileflow_core::problem::Problem;
use tileflow_core::WorkflowSpec;
use tracing::{debug, info};

use crate::handlers::types::{AppState, WorkflowListResponse, WorkflowResponse};
use crate::tenant::Tenant;

/// Submit a workflow for scheduling
#[utoipa::path(
    tag = "Workflows",
    post,
    path = "/workflows",
    request_body = WorkflowSpec,
    params(
        ("X-User-ID" = String, Header, description = "Tenant id")
    ),
    responses(
        (status = 201, description = "Workflow accepted", body = WorkflowResponse),
        (status = 400, description = "Missing tenant or invalid workflow", body = tileflow_core::problem::ProblemDetails),
        (status = 409, description = "Workflow id already exists"),
        (status = 429, description = "Tenant admission cap reached")
    )
)]
pub async fn create_workflow(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
    Json(spec): Json<WorkflowSpec>,
) -> Result<impl IntoResponse, Problem> {
    info!(
        tenant_id = tenant.id(),
        name = %spec.name,
        jobs = spec.jobs.len(),
        "workflow submission received"
    );
    let snapshot = state.engine.submit_workflow(tenant.id(), spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse::from_record(snapshot)),
    ))
}

/// List the calling tenant's workflows
#[utoipa::path(
    tag = "Workflows",
    get,
    path = "/workflows",
    params(
        ("X-User-ID" = String, Header, description = "Tenant id")
    ),
    responses(
        (status = 200, description = "Workflows owned by the tenant", body = WorkflowListResponse),
        (status = 400, description = "Missing tenant header")
    )
)]
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    tenant: Tenant,
) -> Result<impl IntoResponse, Problem> {
    debug!(tenant_id = tenant.id(), "listing workflows");
    let workflows: Vec<WorkflowResponse> = state
        .engine
        .list_workflows(tenant.id())
        .into_iter()
        .map(WorkflowResponse::from_record)
        .collect();
    let total = workflows.len();
    Ok(Json(WorkflowListResponse { workflows, total }))
}

/// Fetch one workflow by id
#[utoipa::path(
    tag = "Workflows",
    get,
    path = "/workflows/{workflow_id}",
    params(
        ("workflow_id" = String, Path, description = "Workflow id"),
        ("X-User-ID" = String, Header, description = "Tenant id")
    ),
    responses(
        (status = 200, description = "Workflow details", body = WorkflowResponse),
        (status = 404, description = "Not found in the tenant's view")
    )
)]
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    tenant: Tenant,
) -> Result<impl IntoResponse, Problem> {
    let snapshot = state.engine.get_workflow(tenant.id(), &workflow_id)?;
    Ok(Json(WorkflowResponse::from_record(snapshot)))
}
