//! Job and workflow registry
//!
//! Single source of truth for workflow and job records, indexed by
//! workflow id, `(workflow_id, job_id)` and tenant. All mutations funnel
//! through the scheduler loop; readers receive deep-cloned snapshots.

use std::collections::HashMap;

use chrono::Utc;
use tileflow_core::{
    BranchKey, ControlError, JobAssignment, JobKey, JobSpec, JobStatus, JobType, UtcDateTime,
    WorkflowStatus,
};

/// Registry-owned state of a single job
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub workflow_id: String,
    pub tenant_id: String,
    pub job_type: JobType,
    pub branch: String,
    pub depends_on: Vec<String>,
    pub image_path: String,
    pub status: JobStatus,
    pub progress: f64,
    pub tiles_processed: Option<u64>,
    pub tiles_total: Option<u64>,
    pub error_message: Option<String>,
    pub result_path: Option<String>,
    pub created_at: UtcDateTime,
    pub started_at: Option<UtcDateTime>,
    pub finished_at: Option<UtcDateTime>,
}

impl JobRecord {
    pub fn from_spec(spec: &JobSpec, workflow_id: &str, tenant_id: &str) -> Self {
        Self {
            job_id: spec.job_id.clone(),
            workflow_id: workflow_id.to_string(),
            tenant_id: tenant_id.to_string(),
            job_type: spec.job_type,
            branch: spec.branch.clone(),
            depends_on: spec.depends_on.clone(),
            image_path: spec.image_path.clone(),
            status: JobStatus::Pending,
            progress: 0.0,
            tiles_processed: None,
            tiles_total: None,
            error_message: None,
            result_path: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.workflow_id, &self.job_id)
    }

    pub fn branch_key(&self) -> BranchKey {
        BranchKey::new(&self.tenant_id, &self.branch)
    }

    pub fn assignment(&self) -> JobAssignment {
        JobAssignment {
            workflow_id: self.workflow_id.clone(),
            job_id: self.job_id.clone(),
            tenant_id: self.tenant_id.clone(),
            job_type: self.job_type,
            branch: self.branch.clone(),
            image_path: self.image_path.clone(),
        }
    }
}

/// Registry-owned state of a workflow and its jobs
///
/// Job order is preserved for display only; scheduling never depends on it.
#[derive(Debug, Clone)]
pub struct WorkflowRecord {
    pub workflow_id: String,
    pub tenant_id: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub jobs: Vec<JobRecord>,
    pub created_at: UtcDateTime,
    pub started_at: Option<UtcDateTime>,
    pub finished_at: Option<UtcDateTime>,
}

impl WorkflowRecord {
    pub fn job(&self, job_id: &str) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    pub fn job_mut(&mut self, job_id: &str) -> Option<&mut JobRecord> {
        self.jobs.iter_mut().find(|j| j.job_id == job_id)
    }

    /// Aggregate progress: the arithmetic mean over the workflow's jobs
    pub fn progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        self.jobs.iter().map(|j| j.progress).sum::<f64>() / self.jobs.len() as f64
    }

    /// True while the workflow still holds admission-relevant work
    pub fn has_live_jobs(&self) -> bool {
        self.jobs
            .iter()
            .any(|j| matches!(j.status, JobStatus::Pending | JobStatus::Running))
    }
}

/// Typed patch applied to a job record
///
/// Only the fields a completion or progress callback may change. The
/// registry enforces the absorbing-terminal and monotonic-progress rules.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub tiles_processed: Option<u64>,
    pub tiles_total: Option<u64>,
    pub error_message: Option<String>,
    pub result_path: Option<String>,
    pub started_at: Option<UtcDateTime>,
    pub finished_at: Option<UtcDateTime>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("workflow '{0}' not found")]
    UnknownWorkflow(String),

    #[error("job '{0}' not found")]
    UnknownJob(String),

    #[error("job '{0}' is terminal and cannot be patched")]
    TerminalJob(String),
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    workflows: HashMap<String, WorkflowRecord>,
    /// Tenant -> workflow ids, in submission order
    tenants: HashMap<String, Vec<String>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_workflow(&self, workflow_id: &str) -> bool {
        self.workflows.contains_key(workflow_id)
    }

    /// Insert a workflow, failing on id collision
    pub fn create_workflow(&mut self, record: WorkflowRecord) -> Result<(), ControlError> {
        if self.workflows.contains_key(&record.workflow_id) {
            return Err(ControlError::DuplicateWorkflowId(record.workflow_id));
        }
        self.tenants
            .entry(record.tenant_id.clone())
            .or_default()
            .push(record.workflow_id.clone());
        self.workflows.insert(record.workflow_id.clone(), record);
        Ok(())
    }

    pub fn workflow(&self, workflow_id: &str) -> Option<&WorkflowRecord> {
        self.workflows.get(workflow_id)
    }

    pub fn workflow_mut(&mut self, workflow_id: &str) -> Option<&mut WorkflowRecord> {
        self.workflows.get_mut(workflow_id)
    }

    pub fn job(&self, key: &JobKey) -> Option<&JobRecord> {
        self.workflows.get(&key.workflow_id)?.job(&key.job_id)
    }

    /// Deep-immutable snapshot of a workflow
    pub fn snapshot_workflow(&self, workflow_id: &str) -> Option<WorkflowRecord> {
        self.workflows.get(workflow_id).cloned()
    }

    /// All workflows of a tenant, in submission order
    pub fn tenant_workflows(&self, tenant_id: &str) -> Vec<&WorkflowRecord> {
        self.tenants
            .get(tenant_id)
            .map(|ids| ids.iter().filter_map(|id| self.workflows.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn tenant_has_live_jobs(&self, tenant_id: &str) -> bool {
        self.tenant_workflows(tenant_id)
            .iter()
            .any(|w| w.has_live_jobs())
    }

    /// Iterate every workflow in the registry
    pub fn workflows(&self) -> impl Iterator<Item = &WorkflowRecord> {
        self.workflows.values()
    }

    /// Apply a typed patch, enforcing the absorbing-terminal rule and
    /// monotonic progress
    pub fn apply_patch(&mut self, key: &JobKey, patch: JobPatch) -> Result<(), RegistryError> {
        let workflow = self
            .workflows
            .get_mut(&key.workflow_id)
            .ok_or_else(|| RegistryError::UnknownWorkflow(key.workflow_id.clone()))?;
        let job = workflow
            .job_mut(&key.job_id)
            .ok_or_else(|| RegistryError::UnknownJob(key.to_string()))?;

        if job.status.is_terminal() {
            return Err(RegistryError::TerminalJob(key.to_string()));
        }

        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(progress) = patch.progress {
            let clamped = progress.clamp(0.0, 1.0);
            if clamped > job.progress {
                job.progress = clamped;
            }
        }
        if patch.tiles_processed.is_some() {
            job.tiles_processed = patch.tiles_processed;
        }
        if patch.tiles_total.is_some() {
            job.tiles_total = patch.tiles_total;
        }
        if patch.error_message.is_some() {
            job.error_message = patch.error_message;
        }
        if patch.result_path.is_some() {
            job.result_path = patch.result_path;
        }
        if patch.started_at.is_some() {
            job.started_at = patch.started_at;
        }
        if patch.finished_at.is_some() {
            job.finished_at = patch.finished_at;
        }
        Ok(())
    }

    /// Resolve a single-string job reference within one tenant's view
    ///
    /// The canonical identity is the `(workflow_id, job_id)` pair; a bare
    /// reference resolves only when unambiguous. Resolution order:
    /// 1. a unique `job_id` match across the tenant's workflows;
    /// 2. a `{workflow_id}_{job_id}` composite, split at the last
    ///    underscore, naming one of the tenant's workflows and jobs.
    /// Anything else, including ambiguous matches, is `not_found`.
    pub fn resolve_job(&self, tenant_id: &str, reference: &str) -> Result<JobKey, ControlError> {
        let mut candidates = Vec::new();
        for workflow in self.tenant_workflows(tenant_id) {
            if workflow.job(reference).is_some() {
                candidates.push(JobKey::new(&workflow.workflow_id, reference));
            }
        }
        match candidates.len() {
            1 => return Ok(candidates.remove(0)),
            n if n > 1 => {
                return Err(ControlError::NotFound(format!(
                    "job reference '{}' is ambiguous",
                    reference
                )))
            }
            _ => {}
        }

        if let Some(split) = reference.rfind('_') {
            let (workflow_id, job_id) = (&reference[..split], &reference[split + 1..]);
            if let Some(workflow) = self.workflows.get(workflow_id) {
                if workflow.tenant_id == tenant_id && workflow.job(job_id).is_some() {
                    return Ok(JobKey::new(workflow_id, job_id));
                }
            }
        }

        Err(ControlError::NotFound(format!("job '{}'", reference)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileflow_core::WorkflowSpec;

    fn workflow(tenant: &str, workflow_id: &str, job_ids: &[&str]) -> WorkflowRecord {
        let spec = WorkflowSpec {
            workflow_id: Some(workflow_id.to_string()),
            name: format!("{} workflow", workflow_id),
            jobs: job_ids
                .iter()
                .map(|id| JobSpec {
                    job_id: id.to_string(),
                    job_type: JobType::CellSegmentation,
                    image_path: "/data/slide.tiff".to_string(),
                    branch: "main".to_string(),
                    depends_on: vec![],
                })
                .collect(),
        };
        WorkflowRecord {
            workflow_id: workflow_id.to_string(),
            tenant_id: tenant.to_string(),
            name: spec.name.clone(),
            status: WorkflowStatus::Pending,
            jobs: spec
                .jobs
                .iter()
                .map(|j| JobRecord::from_spec(j, workflow_id, tenant))
                .collect(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_duplicate_workflow_id_rejected() {
        let mut registry = JobRegistry::new();
        registry.create_workflow(workflow("t1", "wf-1", &["a"])).unwrap();
        let err = registry
            .create_workflow(workflow("t1", "wf-1", &["b"]))
            .unwrap_err();
        assert_eq!(err, ControlError::DuplicateWorkflowId("wf-1".to_string()));
    }

    #[test]
    fn test_terminal_status_is_absorbing() {
        let mut registry = JobRegistry::new();
        registry.create_workflow(workflow("t1", "wf-1", &["a"])).unwrap();
        let key = JobKey::new("wf-1", "a");

        registry
            .apply_patch(
                &key,
                JobPatch {
                    status: Some(JobStatus::Succeeded),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = registry
            .apply_patch(
                &key,
                JobPatch {
                    status: Some(JobStatus::Failed),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::TerminalJob(_)));
        assert_eq!(registry.job(&key).unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut registry = JobRegistry::new();
        registry.create_workflow(workflow("t1", "wf-1", &["a"])).unwrap();
        let key = JobKey::new("wf-1", "a");

        let patch = |p: f64| JobPatch {
            progress: Some(p),
            ..Default::default()
        };
        registry.apply_patch(&key, patch(0.5)).unwrap();
        assert_eq!(registry.job(&key).unwrap().progress, 0.5);

        // Regression is ignored, not an error
        registry.apply_patch(&key, patch(0.2)).unwrap();
        assert_eq!(registry.job(&key).unwrap().progress, 0.5);

        // Out-of-range values clamp
        registry.apply_patch(&key, patch(7.0)).unwrap();
        assert_eq!(registry.job(&key).unwrap().progress, 1.0);
    }

    #[test]
    fn test_tenant_index_and_isolation() {
        let mut registry = JobRegistry::new();
        registry.create_workflow(workflow("t1", "wf-1", &["a"])).unwrap();
        registry.create_workflow(workflow("t2", "wf-2", &["a"])).unwrap();

        let t1 = registry.tenant_workflows("t1");
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].workflow_id, "wf-1");
        assert!(registry.tenant_workflows("t3").is_empty());
    }

    #[test]
    fn test_resolve_job_unique_bare_id() {
        let mut registry = JobRegistry::new();
        registry.create_workflow(workflow("t1", "wf-1", &["seg"])).unwrap();
        let key = registry.resolve_job("t1", "seg").unwrap();
        assert_eq!(key, JobKey::new("wf-1", "seg"));
    }

    #[test]
    fn test_resolve_job_ambiguous_is_not_found() {
        let mut registry = JobRegistry::new();
        registry.create_workflow(workflow("t1", "wf-1", &["seg"])).unwrap();
        registry.create_workflow(workflow("t1", "wf-2", &["seg"])).unwrap();
        let err = registry.resolve_job("t1", "seg").unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
    }

    #[test]
    fn test_resolve_job_composite_splits_at_last_underscore() {
        let mut registry = JobRegistry::new();
        registry
            .create_workflow(workflow("t1", "wf_alpha", &["seg"]))
            .unwrap();
        let key = registry.resolve_job("t1", "wf_alpha_seg").unwrap();
        assert_eq!(key, JobKey::new("wf_alpha", "seg"));
    }

    #[test]
    fn test_resolve_job_respects_tenant_boundary() {
        let mut registry = JobRegistry::new();
        registry.create_workflow(workflow("t1", "wf-1", &["seg"])).unwrap();
        let err = registry.resolve_job("t2", "seg").unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
        let err = registry.resolve_job("t2", "wf-1_seg").unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
    }

    #[test]
    fn test_workflow_progress_is_mean_of_jobs() {
        let mut registry = JobRegistry::new();
        registry
            .create_workflow(workflow("t1", "wf-1", &["a", "b"]))
            .unwrap();
        registry
            .apply_patch(
                &JobKey::new("wf-1", "a"),
                JobPatch {
                    progress: Some(1.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let snapshot = registry.snapshot_workflow("wf-1").unwrap();
        assert!((snapshot.progress() - 0.5).abs() < 1e-9);
    }
}
