//! Progress event fan-out
//!
//! Best-effort, lossy pub/sub of job and workflow events to subscribers
//! keyed by tenant.

mod bus;

pub use bus::EventBus;

// Re-export for convenience - consumer modules can just subscribe directly
pub use tileflow_core::ProgressEvent;
pub use tokio::sync::broadcast;
