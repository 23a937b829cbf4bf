use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use clap::Args;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tileflow_core::SchedulerSettings;
use tileflow_events::EventBus;
use tileflow_inference::{executor_registry, InferenceConfig};
use tileflow_scheduler::SchedulerEngine;
use tileflow_workflows::{configure_routes, AppState, WorkflowsApiDoc};

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:8000", env = "TILEFLOW_ADDRESS")]
    pub address: String,

    /// Maximum concurrently executing jobs across the system
    #[arg(long, default_value_t = 10, env = "TILEFLOW_MAX_WORKERS")]
    pub max_workers: usize,

    /// Maximum tenants with pending or running work
    #[arg(long, default_value_t = 3, env = "TILEFLOW_MAX_ACTIVE_USERS")]
    pub max_active_users: usize,

    /// Bounded mailbox size per progress subscriber
    #[arg(long, default_value_t = 64, env = "TILEFLOW_EVENT_MAILBOX_SIZE")]
    pub event_mailbox_size: usize,

    /// Sliding window for the dashboard latency average, in seconds
    #[arg(long, default_value_t = 60, env = "TILEFLOW_LATENCY_WINDOW_SECONDS")]
    pub latency_window_seconds: u64,

    /// Directory executors write result descriptors under
    #[arg(long, default_value = "./data/results", env = "TILEFLOW_RESULTS_DIR")]
    pub results_dir: PathBuf,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.serve())
    }

    async fn serve(self) -> anyhow::Result<()> {
        let settings = SchedulerSettings {
            max_workers: self.max_workers,
            max_active_users: self.max_active_users,
            event_mailbox_size: self.event_mailbox_size,
            latency_window_seconds: self.latency_window_seconds,
        };

        std::fs::create_dir_all(&self.results_dir)?;
        let executors = executor_registry(InferenceConfig::new(&self.results_dir));
        let bus = Arc::new(EventBus::new(settings.event_mailbox_size));
        let engine = SchedulerEngine::start(settings.clone(), executors, bus);
        let state = Arc::new(AppState { engine, settings });

        let app = Router::new()
            .nest("/api", configure_routes().with_state(state))
            .route("/health", get(health))
            .merge(
                SwaggerUi::new("/swagger-ui")
                    .url("/api-docs/openapi.json", WorkflowsApiDoc::openapi()),
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let listener = TcpListener::bind(&self.address).await?;
        info!(
            address = %self.address,
            results_dir = %self.results_dir.display(),
            "Tileflow server listening"
        );
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
