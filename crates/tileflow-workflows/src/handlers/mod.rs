pub mod jobs;
pub mod metrics;
pub mod progress;
pub mod types;
pub mod workflows;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use utoipa::OpenApi;

use types::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        workflows::create_workflow,
        workflows::list_workflows,
        workflows::get_workflow,
        jobs::get_job_results,
        jobs::cancel_job,
        metrics::dashboard,
        progress::subscribe_progress,
    ),
    components(schemas(
        types::WorkflowResponse,
        types::WorkflowListResponse,
        types::JobResponse,
        types::JobResultsResponse,
        types::CancelJobResponse,
        tileflow_core::WorkflowSpec,
        tileflow_core::JobSpec,
        tileflow_core::problem::ProblemDetails,
        tileflow_scheduler::DashboardSnapshot,
        tileflow_scheduler::WorkerStats,
        tileflow_scheduler::QueueDepthStats,
        tileflow_scheduler::ActiveUserStats,
        tileflow_scheduler::SystemHealth,
    )),
    info(
        title = "Tileflow API",
        description = "Workflow scheduling for long-running image-inference jobs: \
        branch-serialized dispatch per tenant, dependency-aware execution, and \
        real-time progress streaming.",
        version = "1.0.0"
    )
)]
pub struct WorkflowsApiDoc;

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/workflows",
            post(workflows::create_workflow).get(workflows::list_workflows),
        )
        .route("/workflows/{workflow_id}", get(workflows::get_workflow))
        .route("/jobs/{job_id}/results", get(jobs::get_job_results))
        .route("/jobs/{job_id}", delete(jobs::cancel_job))
        .route("/metrics/dashboard", get(metrics::dashboard))
        .route("/progress/ws/{tenant_id}", get(progress::subscribe_progress))
}
