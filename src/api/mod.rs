//! Local HTTP control API.
//!
//! Provides HTTP endpoints for:
//! - Joining, leaving and creating meetings
//! - Reading meeting state, participants, transcripts and reports
//! - In-call controls for the extension backend
//! - Running agent actions by name

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

use crate::actions::MeetActions;
use crate::meeting::MeetingBackend;

/// Shared state for every route.
#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<dyn MeetingBackend>,
    pub actions: Arc<MeetActions>,
    pub display_name: String,
}

pub struct ApiServer {
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(state: ApiState, port: u16) -> Self {
        Self { port, state }
    }

    pub fn router(state: ApiState) -> Router {
        Router::new()
            .route("/", get(status))
            .route("/version", get(version))
            .with_state(state.clone())
            .nest("/meetings", routes::meetings::router(state.clone()))
            .nest("/controls", routes::controls::router(state.clone()))
            .nest("/actions", routes::actions::router(state))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let backend = self.state.backend.name();
        let app = Self::router(self.state);

        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server on {}", addr))?;

        info!("API server listening on http://{} ({} backend)", addr, backend);
        info!("Endpoints:");
        info!("  GET  /                               - Service info");
        info!("  GET  /version                        - Get version info");
        info!("  POST /meetings/join                  - Join a meeting");
        info!("  POST /meetings/leave                 - Leave the current meeting");
        info!("  POST /meetings/create                - Create a meeting space");
        info!("  GET  /meetings                       - List meetings this session");
        info!("  GET  /meetings/current               - Current meeting");
        info!("  GET  /meetings/current/participants  - Current participants");
        info!("  GET  /meetings/current/transcripts   - Current transcript");
        info!("  GET  /meetings/current/report        - Current meeting report");
        info!("  POST /controls/:control              - Mic, camera and recording controls");
        info!("  POST /actions/:name                  - Run an agent action");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn status(State(state): State<ApiState>) -> Json<Value> {
    let current = state.backend.current_meeting().await;
    Json(json!({
        "service": "meet-agent",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "backend": state.backend.name(),
        "in_meeting": current.is_some(),
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "meet-agent"
    }))
}
