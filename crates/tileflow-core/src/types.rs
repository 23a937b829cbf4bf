//! Workflow and job model types
//!
//! The scheduler keys everything on two identities: the global job identity
//! `(workflow_id, job_id)` and the serialization key `(tenant_id, branch)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Standard UTC DateTime type used across all Tileflow crates
///
/// Serializes as ISO 8601 with timezone suffix in API responses and events.
pub type UtcDateTime = DateTime<Utc>;

/// Job execution status
///
/// `Succeeded`, `Failed` and `Cancelled` are absorbing: once a job reaches
/// one of them, no further transition is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is waiting for dependencies or a worker slot
    Pending,
    /// Job is currently executing
    Running,
    /// Job completed successfully
    Succeeded,
    /// Job failed (executor failure or upstream cascade)
    Failed,
    /// Job was cancelled before it started
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Workflow status, derived from the statuses of its jobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Succeeded | WorkflowStatus::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "PENDING"),
            WorkflowStatus::Running => write!(f, "RUNNING"),
            WorkflowStatus::Succeeded => write!(f, "SUCCEEDED"),
            WorkflowStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// The closed set of job types the scheduler can dispatch
///
/// Opaque to the scheduler except for selecting an executor from the
/// dispatch table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CellSegmentation,
    TissueMask,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::CellSegmentation => write!(f, "cell_segmentation"),
            JobType::TissueMask => write!(f, "tissue_mask"),
        }
    }
}

/// Global job identity: job ids are only unique within their workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub workflow_id: String,
    pub job_id: String,
}

impl JobKey {
    pub fn new(workflow_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            job_id: job_id.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.job_id)
    }
}

/// Scheduling key: at most one job runs per (tenant, branch) at a time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchKey {
    pub tenant_id: String,
    pub branch: String,
}

impl BranchKey {
    pub fn new(tenant_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.branch)
    }
}

/// One job of a workflow submission
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobSpec {
    /// Identifier unique within the workflow
    pub job_id: String,
    pub job_type: JobType,
    /// Input image path, passed through to the executor untouched
    pub image_path: String,
    /// Serialization key within the tenant
    pub branch: String,
    /// Job ids within the same workflow that must succeed first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A workflow submission: a named DAG of jobs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowSpec {
    /// Caller-pinned workflow id; generated server-side when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub name: String,
    pub jobs: Vec<JobSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Succeeded).unwrap(),
            r#""SUCCEEDED""#
        );
        let parsed: JobStatus = serde_json::from_str(r#""CANCELLED""#).unwrap();
        assert_eq!(parsed, JobStatus::Cancelled);
    }

    #[test]
    fn test_job_status_display_matches_wire() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let wire = serde_json::to_string(&status).unwrap();
            assert_eq!(wire, format!("\"{}\"", status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&JobType::CellSegmentation).unwrap(),
            r#""cell_segmentation""#
        );
        let parsed: JobType = serde_json::from_str(r#""tissue_mask""#).unwrap();
        assert_eq!(parsed, JobType::TissueMask);
    }

    #[test]
    fn test_unknown_job_type_rejected() {
        let result: Result<JobType, _> = serde_json::from_str(r#""nuclei_count""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_job_spec_depends_on_defaults_empty() {
        let spec: JobSpec = serde_json::from_str(
            r#"{"job_id":"a","job_type":"tissue_mask","image_path":"/data/s.tiff","branch":"main"}"#,
        )
        .unwrap();
        assert!(spec.depends_on.is_empty());
    }
}
