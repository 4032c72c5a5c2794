//! Agent action endpoint (POST /actions/:name).
//!
//! Failures inside an action come back as `{"success": false, ...}` with a
//! 200 status; only an unknown action name is an HTTP error.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::actions::{meeting_context, ActionKind, ActionRequest, ActionResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(list_actions))
        .route("/context", get(context))
        .route("/:name", post(run_action))
        .with_state(state)
}

async fn list_actions() -> Json<Value> {
    let names: Vec<_> = ActionKind::ALL.iter().map(|kind| kind.as_str()).collect();
    Json(json!({ "actions": names }))
}

async fn context(State(state): State<ApiState>) -> Json<Value> {
    let current = state.backend.current_meeting().await;
    Json(json!({ "text": meeting_context(current.as_ref(), Utc::now()) }))
}

async fn run_action(
    Path(name): Path<String>,
    State(state): State<ApiState>,
    body: Option<Json<ActionRequest>>,
) -> ApiResult<Json<ActionResponse>> {
    let kind: ActionKind = name.parse().map_err(ApiError::not_found)?;
    let request = body.map(|Json(req)| req).unwrap_or_default();
    Ok(Json(state.actions.dispatch(kind, request).await))
}
