//! Executor contract
//!
//! The scheduler never interprets the work a job performs; it hands a job
//! snapshot to the executor registered for the job's type and consumes the
//! outcome. Executors report progress through a [`ProgressSink`] that is
//! safe to call from any concurrency context.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::JobType;

/// The immutable view of a job handed to an executor
#[derive(Debug, Clone)]
pub struct JobAssignment {
    pub workflow_id: String,
    pub job_id: String,
    pub tenant_id: String,
    pub job_type: JobType,
    pub branch: String,
    pub image_path: String,
}

/// Terminal outcome of an execution
///
/// Failures are data, not errors: the scheduler records the message and
/// cascades to dependents.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Succeeded { result_path: String },
    Failed { error_message: String },
}

impl ExecutionOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        ExecutionOutcome::Failed {
            error_message: message.into(),
        }
    }
}

/// Callback handle for executor progress reports
///
/// `report(progress, tiles_processed, tiles_total)` may be invoked from any
/// thread; values are clamped and made monotonic by the scheduler, so
/// executors do not need to be careful about ordering.
#[derive(Clone)]
pub struct ProgressSink {
    report: Arc<dyn Fn(f64, Option<u64>, Option<u64>) + Send + Sync>,
}

impl ProgressSink {
    pub fn new<F>(report: F) -> Self
    where
        F: Fn(f64, Option<u64>, Option<u64>) + Send + Sync + 'static,
    {
        Self {
            report: Arc::new(report),
        }
    }

    /// A sink that drops every report, for tests and detached executions
    pub fn discard() -> Self {
        Self::new(|_, _, _| {})
    }

    pub fn report(&self, progress: f64, tiles_processed: Option<u64>, tiles_total: Option<u64>) {
        (self.report)(progress, tiles_processed, tiles_total);
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}

/// A job-type-specific executor
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &JobAssignment, progress: &ProgressSink) -> ExecutionOutcome;
}

/// Dispatch table mapping each job type to its executor
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) {
        self.executors.insert(job_type, executor);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(&job_type).cloned()
    }

    pub fn supports(&self, job_type: JobType) -> bool {
        self.executors.contains_key(&job_type)
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("job_types", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
