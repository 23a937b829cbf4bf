//! Core types and contracts shared across all Tileflow crates

pub mod error;
pub mod events;
pub mod executor;
pub mod problem;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use error::*;
pub use events::*;
pub use executor::*;
pub use settings::*;
pub use types::*;

// Re-export external dependencies
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
pub use uuid;
