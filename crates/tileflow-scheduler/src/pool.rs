//! Bounded worker pool
//!
//! Executes dispatched jobs on spawned tasks gated by a semaphore sized to
//! the worker limit. The pool knows nothing about tenants or branches; the
//! scheduler loop gates dispatch so at most one job per (tenant, branch) is
//! in flight. Progress and completion flow back to the loop as input
//! events, never as direct state mutation.

use std::sync::Arc;

use tileflow_core::{ExecutionOutcome, ExecutorRegistry, JobAssignment, JobKey, ProgressSink};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error};

use crate::engine::SchedulerInput;

pub(crate) struct WorkerPool {
    semaphore: Arc<Semaphore>,
    executors: Arc<ExecutorRegistry>,
    feedback: mpsc::UnboundedSender<SchedulerInput>,
}

impl WorkerPool {
    pub(crate) fn new(
        max_workers: usize,
        executors: Arc<ExecutorRegistry>,
        feedback: mpsc::UnboundedSender<SchedulerInput>,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            executors,
            feedback,
        }
    }

    /// Spawn one execution; the outcome is reported back on the feedback
    /// channel once the executor returns
    pub(crate) fn submit(&self, job: JobAssignment) {
        let semaphore = Arc::clone(&self.semaphore);
        let executors = Arc::clone(&self.executors);
        let feedback = self.feedback.clone();
        let key = JobKey::new(job.workflow_id.clone(), job.job_id.clone());

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // pool shut down
            };

            debug!(job = %key, job_type = %job.job_type, "worker picked up job");

            let outcome = match executors.get(job.job_type) {
                Some(executor) => {
                    let progress_key = key.clone();
                    let progress_feedback = feedback.clone();
                    let sink = ProgressSink::new(move |progress, tiles_processed, tiles_total| {
                        let _ = progress_feedback.send(SchedulerInput::Progress {
                            key: progress_key.clone(),
                            progress,
                            tiles_processed,
                            tiles_total,
                        });
                    });
                    executor.execute(&job, &sink).await
                }
                None => {
                    // Unreachable after submission validation; reported as a
                    // job failure rather than a crash
                    error!(job = %key, job_type = %job.job_type, "no executor for dispatched job");
                    ExecutionOutcome::failed(format!(
                        "no executor registered for job type '{}'",
                        job.job_type
                    ))
                }
            };

            let _ = feedback.send(SchedulerInput::Finished { key, outcome });
        });
    }
}
