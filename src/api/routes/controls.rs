//! In-call control endpoints (POST /controls/:control).

use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;
use crate::meeting::MeetingControl;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/:control", post(apply_control))
        .with_state(state)
}

async fn apply_control(
    Path(name): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let control: MeetingControl = name.parse().map_err(ApiError::bad_request)?;
    info!("Control command received via API: {}", control.as_str());

    state.backend.control(control).await?;

    Ok(Json(json!({
        "success": true,
        "control": control.as_str(),
    })))
}
