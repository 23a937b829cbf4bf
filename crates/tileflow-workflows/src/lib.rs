//! Control-plane HTTP API
//!
//! Exposes workflow submission, query, cancellation, the dashboard
//! snapshot and the WebSocket progress stream over axum. Tenant identity
//! arrives in the `X-User-ID` header; isolation is enforced on every read.

pub mod handlers;
pub mod tenant;

pub use handlers::types::AppState;
pub use handlers::{configure_routes, WorkflowsApiDoc};
pub use tenant::Tenant;
