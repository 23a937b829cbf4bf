use serde::{Deserialize, Serialize};
use tileflow_core::{JobStatus, JobType, SchedulerSettings, UtcDateTime, WorkflowStatus};
use tileflow_scheduler::{JobRecord, SchedulerEngine, WorkflowRecord};
use utoipa::ToSchema;

pub struct AppState {
    pub engine: SchedulerEngine,
    pub settings: SchedulerSettings,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    pub job_id: String,
    pub workflow_id: String,
    pub job_type: JobType,
    pub branch: String,
    pub depends_on: Vec<String>,
    pub image_path: String,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<UtcDateTime>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub finished_at: Option<UtcDateTime>,
}

impl JobResponse {
    pub fn from_record(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            workflow_id: record.workflow_id,
            job_type: record.job_type,
            branch: record.branch,
            depends_on: record.depends_on,
            image_path: record.image_path,
            status: record.status,
            progress: record.progress,
            tiles_processed: record.tiles_processed,
            tiles_total: record.tiles_total,
            error_message: record.error_message,
            result_path: record.result_path,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct WorkflowResponse {
    pub workflow_id: String,
    pub tenant_id: String,
    pub name: String,
    pub status: WorkflowStatus,
    /// Arithmetic mean of the jobs' progress, computed on read
    pub progress: f64,
    pub jobs: Vec<JobResponse>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<UtcDateTime>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub finished_at: Option<UtcDateTime>,
}

impl WorkflowResponse {
    pub fn from_record(record: WorkflowRecord) -> Self {
        let progress = record.progress();
        Self {
            workflow_id: record.workflow_id,
            tenant_id: record.tenant_id,
            name: record.name,
            status: record.status,
            progress,
            jobs: record
                .jobs
                .into_iter()
                .map(JobResponse::from_record)
                .collect(),
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct WorkflowListResponse {
    pub workflows: Vec<WorkflowResponse>,
    pub total: usize,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct JobResultsResponse {
    pub workflow_id: String,
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CancelJobResponse {
    pub workflow_id: String,
    pub job_id: String,
    pub status: JobStatus,
}
