//! Shared helpers for scheduler integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tileflow_core::{
    async_trait::async_trait, ExecutionOutcome, ExecutorRegistry, JobAssignment, JobExecutor,
    JobSpec, JobType, ProgressSink, SchedulerSettings, WorkflowSpec, WorkflowStatus,
};
use tileflow_events::EventBus;
use tileflow_scheduler::{SchedulerEngine, SystemHealth};
use tokio::sync::{mpsc, Barrier, Semaphore};

/// Succeeds immediately with a deterministic result path
pub struct InstantExecutor;

#[async_trait]
impl JobExecutor for InstantExecutor {
    async fn execute(&self, job: &JobAssignment, _progress: &ProgressSink) -> ExecutionOutcome {
        ExecutionOutcome::Succeeded {
            result_path: format!("/results/{}/{}.json", job.workflow_id, job.job_id),
        }
    }
}

/// Fails immediately with a fixed message
pub struct FailingExecutor {
    pub message: String,
}

#[async_trait]
impl JobExecutor for FailingExecutor {
    async fn execute(&self, _job: &JobAssignment, _progress: &ProgressSink) -> ExecutionOutcome {
        ExecutionOutcome::failed(self.message.clone())
    }
}

/// Announces each started job, then blocks until the test grants a permit
pub struct GateExecutor {
    pub started: mpsc::UnboundedSender<String>,
    pub gate: Arc<Semaphore>,
}

#[async_trait]
impl JobExecutor for GateExecutor {
    async fn execute(&self, job: &JobAssignment, _progress: &ProgressSink) -> ExecutionOutcome {
        let _ = self.started.send(job.job_id.clone());
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        ExecutionOutcome::Succeeded {
            result_path: format!("/results/{}/{}.json", job.workflow_id, job.job_id),
        }
    }
}

/// Completes only once all participants are running simultaneously
pub struct BarrierExecutor {
    pub barrier: Arc<Barrier>,
}

#[async_trait]
impl JobExecutor for BarrierExecutor {
    async fn execute(&self, job: &JobAssignment, _progress: &ProgressSink) -> ExecutionOutcome {
        self.barrier.wait().await;
        ExecutionOutcome::Succeeded {
            result_path: format!("/results/{}/{}.json", job.workflow_id, job.job_id),
        }
    }
}

/// Tracks the maximum number of concurrently running executions
pub struct CountingExecutor {
    pub current: Arc<AtomicUsize>,
    pub max_seen: Arc<AtomicUsize>,
}

#[async_trait]
impl JobExecutor for CountingExecutor {
    async fn execute(&self, job: &JobAssignment, _progress: &ProgressSink) -> ExecutionOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ExecutionOutcome::Succeeded {
            result_path: format!("/results/{}/{}.json", job.workflow_id, job.job_id),
        }
    }
}

/// Emits a burst of progress reports before succeeding
pub struct ChattyExecutor {
    pub reports: usize,
}

#[async_trait]
impl JobExecutor for ChattyExecutor {
    async fn execute(&self, job: &JobAssignment, progress: &ProgressSink) -> ExecutionOutcome {
        for i in 1..=self.reports {
            progress.report(
                i as f64 / self.reports as f64,
                Some(i as u64),
                Some(self.reports as u64),
            );
        }
        ExecutionOutcome::Succeeded {
            result_path: format!("/results/{}/{}.json", job.workflow_id, job.job_id),
        }
    }
}

/// Replays a fixed sequence of progress values, then succeeds
pub struct ScriptedProgressExecutor {
    pub script: Vec<f64>,
}

#[async_trait]
impl JobExecutor for ScriptedProgressExecutor {
    async fn execute(&self, job: &JobAssignment, progress: &ProgressSink) -> ExecutionOutcome {
        for value in &self.script {
            progress.report(*value, None, None);
            tokio::task::yield_now().await;
        }
        ExecutionOutcome::Succeeded {
            result_path: format!("/results/{}/{}.json", job.workflow_id, job.job_id),
        }
    }
}

/// Register one executor for both job types
pub fn registry_with(executor: Arc<dyn JobExecutor>) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(JobType::CellSegmentation, Arc::clone(&executor));
    registry.register(JobType::TissueMask, executor);
    registry
}

pub fn settings(max_workers: usize, max_active_users: usize) -> SchedulerSettings {
    SchedulerSettings {
        max_workers,
        max_active_users,
        ..Default::default()
    }
}

pub fn start_engine(
    settings: SchedulerSettings,
    executors: ExecutorRegistry,
) -> (SchedulerEngine, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new(settings.event_mailbox_size));
    let engine = SchedulerEngine::start(settings, executors, Arc::clone(&bus));
    (engine, bus)
}

pub fn job(id: &str, branch: &str, deps: &[&str]) -> JobSpec {
    JobSpec {
        job_id: id.to_string(),
        job_type: JobType::CellSegmentation,
        image_path: format!("/data/{}.tiff", id),
        branch: branch.to_string(),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
    }
}

pub fn workflow(workflow_id: &str, jobs: Vec<JobSpec>) -> WorkflowSpec {
    WorkflowSpec {
        workflow_id: Some(workflow_id.to_string()),
        name: format!("{} workflow", workflow_id),
        jobs,
    }
}

/// Poll until the workflow reaches the expected status
pub async fn wait_for_workflow_status(
    engine: &SchedulerEngine,
    tenant_id: &str,
    workflow_id: &str,
    expected: WorkflowStatus,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(snapshot) = engine.get_workflow(tenant_id, workflow_id) {
            if snapshot.status == expected {
                return;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "workflow '{}' did not reach {} in time",
                workflow_id, expected
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// The structural self-test must hold at every quiescent point
pub fn assert_healthy(engine: &SchedulerEngine) {
    assert_eq!(engine.dashboard().system_health, SystemHealth::Healthy);
}

/// Receive events until the workflow-terminal event arrives, returning
/// everything seen in order. Lag markers are skipped, like a real consumer.
pub async fn collect_until_workflow_terminal(
    rx: &mut tokio::sync::broadcast::Receiver<tileflow_core::ProgressEvent>,
) -> Vec<tileflow_core::ProgressEvent> {
    use tileflow_core::ProgressEvent;
    use tokio::sync::broadcast::error::RecvError;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(event)) => {
                let terminal = matches!(
                    &event,
                    ProgressEvent::WorkflowStatus { status, .. } if status.is_terminal()
                );
                events.push(event);
                if terminal {
                    return events;
                }
            }
            Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) => panic!("event bus closed before terminal event"),
            Err(_) => panic!("timed out waiting for the workflow terminal event"),
        }
    }
}
