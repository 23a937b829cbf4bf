//! Branch-aware workflow scheduling engine
//!
//! A single scheduler loop owns all mutable state (registry, admission set,
//! branch queues, dependency resolver) and drains an input channel of
//! control commands and worker callbacks. Reads are served concurrently
//! from immutable snapshots. Workers execute on a semaphore-bounded pool.

pub mod admission;
pub mod branches;
pub mod engine;
pub mod latency;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod validate;

mod pool;

pub use engine::SchedulerEngine;
pub use metrics::{
    ActiveUserStats, DashboardSnapshot, QueueDepthStats, SystemHealth, WorkerStats,
};
pub use registry::{JobPatch, JobRecord, JobRegistry, WorkflowRecord};
