//! Progress events fanned out to subscribers
//!
//! Each event is a self-describing JSON object with a `type` discriminator,
//! matching what the WebSocket stream delivers to clients.

use crate::types::{JobStatus, UtcDateTime, WorkflowStatus};
use serde::{Deserialize, Serialize};

/// Event published on the per-tenant event bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    JobProgress {
        job_id: String,
        workflow_id: String,
        progress: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        tiles_processed: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tiles_total: Option<u64>,
        timestamp: UtcDateTime,
    },
    JobStatus {
        job_id: String,
        workflow_id: String,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        timestamp: UtcDateTime,
    },
    WorkflowProgress {
        workflow_id: String,
        progress: f64,
        timestamp: UtcDateTime,
    },
    WorkflowStatus {
        workflow_id: String,
        status: WorkflowStatus,
        timestamp: UtcDateTime,
    },
    /// Reply to a client `{"type":"ping"}` on the subscribe stream
    Pong,
}

impl ProgressEvent {
    /// The workflow this event belongs to, if any
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            ProgressEvent::JobProgress { workflow_id, .. }
            | ProgressEvent::JobStatus { workflow_id, .. }
            | ProgressEvent::WorkflowProgress { workflow_id, .. }
            | ProgressEvent::WorkflowStatus { workflow_id, .. } => Some(workflow_id),
            ProgressEvent::Pong => None,
        }
    }
}
