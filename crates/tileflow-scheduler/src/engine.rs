//! Scheduler engine and loop
//!
//! The loop is the single writer over the registry, branch queues, admission
//! set and resolver. Control commands (submit, cancel) and worker callbacks
//! (progress, completion) arrive on one unbounded input channel and are
//! drained in arrival order: one write-locked mutation per event, then a
//! dispatch pass, then yield. Event publication happens after the lock is
//! released. Reads are served concurrently from snapshots under a read
//! lock.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tileflow_core::{
    ControlError, ExecutionOutcome, ExecutorRegistry, JobKey, JobStatus, ProgressEvent,
    SchedulerSettings, WorkflowSpec, WorkflowStatus,
};
use tileflow_events::EventBus;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::admission::{AdmissionDecision, TenantAdmission};
use crate::branches::BranchQueues;
use crate::latency::LatencyWindow;
use crate::metrics::{self, DashboardSnapshot};
use crate::pool::WorkerPool;
use crate::registry::{JobPatch, JobRecord, JobRegistry, WorkflowRecord};
use crate::resolver::DependencyResolver;
use crate::validate;

/// Events drained by the scheduler loop, in arrival order
#[derive(Debug)]
pub(crate) enum SchedulerInput {
    Submit {
        tenant_id: String,
        spec: WorkflowSpec,
        reply: oneshot::Sender<Result<WorkflowRecord, ControlError>>,
    },
    Cancel {
        tenant_id: String,
        job_reference: String,
        reply: oneshot::Sender<Result<JobRecord, ControlError>>,
    },
    Progress {
        key: JobKey,
        progress: f64,
        tiles_processed: Option<u64>,
        tiles_total: Option<u64>,
    },
    Finished {
        key: JobKey,
        outcome: ExecutionOutcome,
    },
}

/// Why a cascade reaches a dependent job
#[derive(Debug, Clone, Copy)]
enum CascadeReason {
    UpstreamFailure,
    UpstreamCancelled,
}

/// All mutable scheduler state, guarded by one lock with a single writer
pub(crate) struct SchedulerCore {
    pub(crate) settings: SchedulerSettings,
    pub(crate) registry: JobRegistry,
    pub(crate) admission: TenantAdmission,
    pub(crate) branches: BranchQueues,
    pub(crate) resolver: DependencyResolver,
    pub(crate) latency: LatencyWindow,
    /// Jobs currently RUNNING across the system
    pub(crate) running: usize,
    /// Cleared when a structural invariant violation is detected
    pub(crate) healthy: bool,
    /// Workflows refusing further transitions after a violation
    pub(crate) poisoned: HashSet<String>,
}

impl SchedulerCore {
    fn new(settings: SchedulerSettings) -> Self {
        Self {
            registry: JobRegistry::new(),
            admission: TenantAdmission::new(settings.max_active_users),
            branches: BranchQueues::new(),
            resolver: DependencyResolver::new(),
            latency: LatencyWindow::new(settings.latency_window_seconds),
            running: 0,
            healthy: true,
            poisoned: HashSet::new(),
            settings,
        }
    }

    /// Record an internal invariant violation: the affected workflow stops
    /// transitioning, the process keeps serving everything else
    fn record_violation(&mut self, workflow_id: &str, message: &str) {
        error!(workflow_id, message, "scheduler invariant violation");
        self.healthy = false;
        self.poisoned.insert(workflow_id.to_string());
    }
}

/// Handle to a running scheduler
///
/// Constructed once at startup and passed by reference to transport
/// handlers. Cloning is cheap; all clones drive the same loop.
#[derive(Clone)]
pub struct SchedulerEngine {
    core: Arc<RwLock<SchedulerCore>>,
    bus: Arc<EventBus>,
    input: mpsc::UnboundedSender<SchedulerInput>,
}

impl SchedulerEngine {
    /// Build the engine and spawn its loop on the current runtime
    pub fn start(
        settings: SchedulerSettings,
        executors: ExecutorRegistry,
        bus: Arc<EventBus>,
    ) -> Self {
        let executors = Arc::new(executors);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let core = Arc::new(RwLock::new(SchedulerCore::new(settings.clone())));

        let pool = WorkerPool::new(settings.max_workers, Arc::clone(&executors), input_tx.clone());
        let scheduler_loop = SchedulerLoop {
            core: Arc::clone(&core),
            bus: Arc::clone(&bus),
            pool,
            executors,
            receiver: input_rx,
        };
        tokio::spawn(scheduler_loop.run());
        info!(
            max_workers = settings.max_workers,
            max_active_users = settings.max_active_users,
            "scheduler engine started"
        );

        Self {
            core,
            bus,
            input: input_tx,
        }
    }

    /// Validate and submit a workflow; returns its snapshot after the first
    /// dispatch pass
    pub async fn submit_workflow(
        &self,
        tenant_id: &str,
        spec: WorkflowSpec,
    ) -> Result<WorkflowRecord, ControlError> {
        if tenant_id.is_empty() {
            return Err(ControlError::TenantMissing);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.input
            .send(SchedulerInput::Submit {
                tenant_id: tenant_id.to_string(),
                spec,
                reply: reply_tx,
            })
            .map_err(|_| ControlError::SchedulerUnavailable("input channel closed".into()))?;
        reply_rx
            .await
            .map_err(|_| ControlError::SchedulerUnavailable("scheduler loop stopped".into()))?
    }

    /// Cancel a PENDING job by single-string reference
    pub async fn cancel_job(
        &self,
        tenant_id: &str,
        job_reference: &str,
    ) -> Result<JobRecord, ControlError> {
        if tenant_id.is_empty() {
            return Err(ControlError::TenantMissing);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.input
            .send(SchedulerInput::Cancel {
                tenant_id: tenant_id.to_string(),
                job_reference: job_reference.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| ControlError::SchedulerUnavailable("input channel closed".into()))?;
        reply_rx
            .await
            .map_err(|_| ControlError::SchedulerUnavailable("scheduler loop stopped".into()))?
    }

    /// Snapshots of the tenant's workflows, in submission order
    pub fn list_workflows(&self, tenant_id: &str) -> Vec<WorkflowRecord> {
        let core = self.core.read().unwrap();
        core.registry
            .tenant_workflows(tenant_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Snapshot of one workflow; tenant isolation is absolute
    pub fn get_workflow(
        &self,
        tenant_id: &str,
        workflow_id: &str,
    ) -> Result<WorkflowRecord, ControlError> {
        let core = self.core.read().unwrap();
        core.registry
            .workflow(workflow_id)
            .filter(|w| w.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("workflow '{}'", workflow_id)))
    }

    /// Snapshot of one job by single-string reference within the tenant
    pub fn get_job(&self, tenant_id: &str, job_reference: &str) -> Result<JobRecord, ControlError> {
        let core = self.core.read().unwrap();
        let key = core.registry.resolve_job(tenant_id, job_reference)?;
        core.registry
            .job(&key)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(format!("job '{}'", job_reference)))
    }

    /// Point-in-time dashboard snapshot
    pub fn dashboard(&self) -> DashboardSnapshot {
        let core = self.core.read().unwrap();
        metrics::collect(&core, Utc::now())
    }

    /// Subscribe to a tenant's progress events
    pub fn subscribe(&self, tenant_id: &str) -> broadcast::Receiver<ProgressEvent> {
        self.bus.subscribe(tenant_id)
    }
}

/// The single-writer loop; owns the input receiver
struct SchedulerLoop {
    core: Arc<RwLock<SchedulerCore>>,
    bus: Arc<EventBus>,
    pool: WorkerPool,
    executors: Arc<ExecutorRegistry>,
    receiver: mpsc::UnboundedReceiver<SchedulerInput>,
}

/// Events to publish and jobs to hand to the pool, collected under the
/// write lock and acted on after it is released
#[derive(Default)]
struct TickEffects {
    events: Vec<(String, ProgressEvent)>,
    dispatches: Vec<tileflow_core::JobAssignment>,
}

impl TickEffects {
    fn publish_job_status(&mut self, job: &JobRecord) {
        self.events.push((
            job.tenant_id.clone(),
            ProgressEvent::JobStatus {
                job_id: job.job_id.clone(),
                workflow_id: job.workflow_id.clone(),
                status: job.status,
                error_message: job.error_message.clone(),
                timestamp: Utc::now(),
            },
        ));
    }
}

impl SchedulerLoop {
    async fn run(mut self) {
        debug!("scheduler loop ready");
        while let Some(input) = self.receiver.recv().await {
            let mut effects = TickEffects::default();
            match input {
                SchedulerInput::Submit {
                    tenant_id,
                    spec,
                    reply,
                } => {
                    let result = {
                        let mut core = self.core.write().unwrap();
                        self.submit_locked(&mut core, &tenant_id, spec, &mut effects)
                    };
                    self.apply_effects(effects);
                    let _ = reply.send(result);
                }
                SchedulerInput::Cancel {
                    tenant_id,
                    job_reference,
                    reply,
                } => {
                    let result = {
                        let mut core = self.core.write().unwrap();
                        self.cancel_locked(&mut core, &tenant_id, &job_reference, &mut effects)
                    };
                    self.apply_effects(effects);
                    let _ = reply.send(result);
                }
                SchedulerInput::Progress {
                    key,
                    progress,
                    tiles_processed,
                    tiles_total,
                } => {
                    {
                        let mut core = self.core.write().unwrap();
                        Self::progress_locked(
                            &mut core,
                            &key,
                            progress,
                            tiles_processed,
                            tiles_total,
                            &mut effects,
                        );
                    }
                    self.apply_effects(effects);
                }
                SchedulerInput::Finished { key, outcome } => {
                    {
                        let mut core = self.core.write().unwrap();
                        Self::finish_locked(&mut core, &key, outcome, &mut effects);
                    }
                    self.apply_effects(effects);
                }
            }
        }
        debug!("scheduler loop stopped: input channel closed");
    }

    fn apply_effects(&self, effects: TickEffects) {
        for job in effects.dispatches {
            self.pool.submit(job);
        }
        for (tenant_id, event) in effects.events {
            self.bus.publish(&tenant_id, event);
        }
    }

    /// Submission: validate, admit, insert, enqueue ready jobs, dispatch
    fn submit_locked(
        &self,
        core: &mut SchedulerCore,
        tenant_id: &str,
        spec: WorkflowSpec,
        effects: &mut TickEffects,
    ) -> Result<WorkflowRecord, ControlError> {
        let workflow_id = spec
            .workflow_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if workflow_id.is_empty() {
            return Err(ControlError::validation("workflow id must be non-empty"));
        }
        if core.registry.contains_workflow(&workflow_id) {
            return Err(ControlError::DuplicateWorkflowId(workflow_id));
        }
        validate::validate_submission(&spec, &self.executors)?;

        if core.admission.try_admit(tenant_id) == AdmissionDecision::Rejected {
            return Err(ControlError::TenantRejected);
        }

        let record = WorkflowRecord {
            workflow_id: workflow_id.clone(),
            tenant_id: tenant_id.to_string(),
            name: spec.name.clone(),
            status: WorkflowStatus::Pending,
            jobs: spec
                .jobs
                .iter()
                .map(|job| JobRecord::from_spec(job, &workflow_id, tenant_id))
                .collect(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        core.registry.create_workflow(record)?;
        core.resolver.register_workflow(
            &workflow_id,
            spec.jobs
                .iter()
                .map(|job| (job.job_id.as_str(), job.depends_on.as_slice())),
        );

        for job_id in core.resolver.initially_ready(&workflow_id) {
            let key = JobKey::new(&workflow_id, &job_id);
            if let Some(job) = core.registry.job(&key) {
                core.branches.enqueue(job.branch_key(), key);
            }
        }
        info!(
            workflow_id,
            tenant_id,
            jobs = spec.jobs.len(),
            "workflow submitted"
        );

        Self::dispatch_locked(core, effects);
        Ok(core
            .registry
            .snapshot_workflow(&workflow_id)
            .expect("workflow inserted above"))
    }

    /// One dispatch pass: start jobs on idle branches while worker capacity
    /// remains, sweeping keys fairly
    fn dispatch_locked(core: &mut SchedulerCore, effects: &mut TickEffects) {
        for branch_key in core.branches.rotation() {
            if core.running >= core.settings.max_workers {
                break;
            }
            let Some(job_key) = core.branches.take_if_idle(&branch_key) else {
                continue;
            };
            core.branches.note_served(&branch_key);

            if core.poisoned.contains(&job_key.workflow_id) {
                core.branches.mark_done(&branch_key);
                continue;
            }
            let patch = JobPatch {
                status: Some(JobStatus::Running),
                started_at: Some(Utc::now()),
                ..Default::default()
            };
            if let Err(err) = core.registry.apply_patch(&job_key, patch) {
                core.branches.mark_done(&branch_key);
                core.record_violation(
                    &job_key.workflow_id,
                    &format!("queued job could not start: {}", err),
                );
                continue;
            }
            core.running += 1;

            let job = core
                .registry
                .job(&job_key)
                .expect("patched job exists")
                .clone();
            debug!(job = %job_key, branch = %branch_key, "job dispatched");
            effects.publish_job_status(&job);
            effects.dispatches.push(job.assignment());

            Self::finalize_workflow(core, &job_key.workflow_id, effects);
        }
        core.branches.gc();
    }

    /// Completion: apply the outcome, free the branch, promote or cascade,
    /// recompute workflow status, dispatch
    fn finish_locked(
        core: &mut SchedulerCore,
        key: &JobKey,
        outcome: ExecutionOutcome,
        effects: &mut TickEffects,
    ) {
        if core.poisoned.contains(&key.workflow_id) {
            return;
        }
        let Some(job) = core.registry.job(key) else {
            warn!(job = %key, "completion for unknown job dropped");
            return;
        };
        if job.status != JobStatus::Running {
            core.record_violation(
                &key.workflow_id,
                &format!("completion for job '{}' in state {}", key, job.status),
            );
            return;
        }
        let branch_key = job.branch_key();
        let started_at = job.started_at;

        let now = Utc::now();
        let patch = match outcome {
            ExecutionOutcome::Succeeded { result_path } => JobPatch {
                status: Some(JobStatus::Succeeded),
                result_path: Some(result_path),
                progress: Some(1.0),
                finished_at: Some(now),
                ..Default::default()
            },
            ExecutionOutcome::Failed { error_message } => JobPatch {
                status: Some(JobStatus::Failed),
                error_message: Some(error_message),
                finished_at: Some(now),
                ..Default::default()
            },
        };
        if let Err(err) = core.registry.apply_patch(key, patch) {
            core.record_violation(&key.workflow_id, &format!("completion rejected: {}", err));
            return;
        }
        core.running = core.running.saturating_sub(1);
        core.branches.mark_done(&branch_key);
        if let Some(started_at) = started_at {
            core.latency.record(started_at, now);
        }

        let job = core.registry.job(key).expect("patched job exists").clone();
        effects.publish_job_status(&job);

        match job.status {
            JobStatus::Succeeded => {
                for ready_id in core.resolver.on_succeeded(&key.workflow_id, &key.job_id) {
                    let ready_key = JobKey::new(&key.workflow_id, &ready_id);
                    // A dependent cancelled while waiting must not start
                    if let Some(ready) = core.registry.job(&ready_key) {
                        if ready.status == JobStatus::Pending {
                            core.branches.enqueue(ready.branch_key(), ready_key);
                        }
                    }
                }
            }
            JobStatus::Failed => {
                Self::cascade_locked(
                    core,
                    &key.workflow_id,
                    &key.job_id,
                    CascadeReason::UpstreamFailure,
                    effects,
                );
            }
            _ => {}
        }

        Self::finalize_workflow(core, &key.workflow_id, effects);
        Self::dispatch_locked(core, effects);
    }

    /// Fail every transitive dependent of a failed or cancelled job
    fn cascade_locked(
        core: &mut SchedulerCore,
        workflow_id: &str,
        from_job_id: &str,
        reason: CascadeReason,
        effects: &mut TickEffects,
    ) {
        let now = Utc::now();
        let mut stack = vec![from_job_id.to_string()];
        while let Some(upstream) = stack.pop() {
            for dependent_id in core.resolver.successors(workflow_id, &upstream) {
                let dependent_key = JobKey::new(workflow_id, &dependent_id);
                let Some(dependent) = core.registry.job(&dependent_key) else {
                    continue;
                };
                if dependent.status.is_terminal() {
                    continue;
                }
                core.branches.remove(&dependent.branch_key(), &dependent_key);
                let error_message = match reason {
                    CascadeReason::UpstreamFailure => {
                        format!("upstream failure: {}", upstream)
                    }
                    CascadeReason::UpstreamCancelled => "upstream cancelled".to_string(),
                };
                let patch = JobPatch {
                    status: Some(JobStatus::Failed),
                    error_message: Some(error_message),
                    finished_at: Some(now),
                    ..Default::default()
                };
                if core.registry.apply_patch(&dependent_key, patch).is_ok() {
                    let dependent = core
                        .registry
                        .job(&dependent_key)
                        .expect("patched job exists")
                        .clone();
                    effects.publish_job_status(&dependent);
                    stack.push(dependent_id);
                }
            }
        }
    }

    /// Cancellation: PENDING -> CANCELLED only, with cascade to dependents
    fn cancel_locked(
        &self,
        core: &mut SchedulerCore,
        tenant_id: &str,
        job_reference: &str,
        effects: &mut TickEffects,
    ) -> Result<JobRecord, ControlError> {
        let key = core.registry.resolve_job(tenant_id, job_reference)?;
        let job = core
            .registry
            .job(&key)
            .ok_or_else(|| ControlError::NotFound(format!("job '{}'", job_reference)))?;
        if job.status != JobStatus::Pending {
            return Err(ControlError::NotCancellable(job_reference.to_string()));
        }
        let branch_key = job.branch_key();
        core.branches.remove(&branch_key, &key);

        let patch = JobPatch {
            status: Some(JobStatus::Cancelled),
            finished_at: Some(Utc::now()),
            ..Default::default()
        };
        core.registry
            .apply_patch(&key, patch)
            .map_err(|_| ControlError::NotCancellable(job_reference.to_string()))?;

        let job = core.registry.job(&key).expect("patched job exists").clone();
        info!(job = %key, tenant_id, "job cancelled");
        effects.publish_job_status(&job);

        Self::cascade_locked(
            core,
            &key.workflow_id,
            &key.job_id,
            CascadeReason::UpstreamCancelled,
            effects,
        );
        Self::finalize_workflow(core, &key.workflow_id, effects);
        Self::dispatch_locked(core, effects);
        Ok(job)
    }

    /// Forward a progress report: clamped, monotonic, terminal-safe
    fn progress_locked(
        core: &mut SchedulerCore,
        key: &JobKey,
        progress: f64,
        tiles_processed: Option<u64>,
        tiles_total: Option<u64>,
        effects: &mut TickEffects,
    ) {
        if core.poisoned.contains(&key.workflow_id) || !progress.is_finite() {
            return;
        }
        let Some(job) = core.registry.job(key) else {
            return;
        };
        // Late reports after a terminal transition are dropped silently
        if job.status != JobStatus::Running {
            return;
        }
        let clamped = progress.clamp(0.0, 1.0);
        if clamped < job.progress {
            return;
        }
        let tenant_id = job.tenant_id.clone();

        let patch = JobPatch {
            progress: Some(clamped),
            tiles_processed,
            tiles_total,
            ..Default::default()
        };
        if core.registry.apply_patch(key, patch).is_err() {
            return;
        }
        let job = core.registry.job(key).expect("patched job exists");
        effects.events.push((
            tenant_id.clone(),
            ProgressEvent::JobProgress {
                job_id: job.job_id.clone(),
                workflow_id: job.workflow_id.clone(),
                progress: job.progress,
                tiles_processed: job.tiles_processed,
                tiles_total: job.tiles_total,
                timestamp: Utc::now(),
            },
        ));
        if let Some(workflow) = core.registry.workflow(&key.workflow_id) {
            effects.events.push((
                tenant_id,
                ProgressEvent::WorkflowProgress {
                    workflow_id: key.workflow_id.clone(),
                    progress: workflow.progress(),
                    timestamp: Utc::now(),
                },
            ));
        }
    }

    /// Recompute a workflow's derived status and release its tenant once
    /// the tenant has no live jobs anywhere
    fn finalize_workflow(
        core: &mut SchedulerCore,
        workflow_id: &str,
        effects: &mut TickEffects,
    ) {
        let Some(workflow) = core.registry.workflow(workflow_id) else {
            return;
        };
        let tenant_id = workflow.tenant_id.clone();
        let old_status = workflow.status;
        let all_terminal = workflow.jobs.iter().all(|j| j.status.is_terminal());
        let all_succeeded = workflow
            .jobs
            .iter()
            .all(|j| j.status == JobStatus::Succeeded);
        let any_running = workflow.jobs.iter().any(|j| j.status == JobStatus::Running);
        let has_started = workflow.started_at.is_some() || any_running;

        let new_status = if all_terminal {
            if all_succeeded {
                WorkflowStatus::Succeeded
            } else {
                WorkflowStatus::Failed
            }
        } else if has_started {
            WorkflowStatus::Running
        } else {
            WorkflowStatus::Pending
        };

        if new_status != old_status {
            let now = Utc::now();
            let workflow = core
                .registry
                .workflow_mut(workflow_id)
                .expect("workflow exists");
            workflow.status = new_status;
            if new_status == WorkflowStatus::Running && workflow.started_at.is_none() {
                workflow.started_at = Some(now);
            }
            if new_status.is_terminal() {
                workflow.finished_at = Some(now);
            }
            effects.events.push((
                tenant_id.clone(),
                ProgressEvent::WorkflowStatus {
                    workflow_id: workflow_id.to_string(),
                    status: new_status,
                    timestamp: now,
                },
            ));
            if new_status.is_terminal() {
                info!(workflow_id, status = %new_status, "workflow finished");
                core.resolver.remove_workflow(workflow_id);
            }
        }

        if !core.registry.tenant_has_live_jobs(&tenant_id) {
            core.admission.release(&tenant_id);
        }
    }
}
