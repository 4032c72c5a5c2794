//! Meeting lifecycle and state endpoints.
//!
//! Provides HTTP endpoints for:
//! - Joining a meeting (POST /meetings/join)
//! - Leaving the current meeting (POST /meetings/leave)
//! - Creating a meeting space (POST /meetings/create)
//! - Listing meetings seen this session (GET /meetings)
//! - Reading the current meeting and its participants, transcript and report
//! - Getting a specific meeting (GET /meetings/:id, id URL-encoded)

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;
use crate::error::MeetError;
use crate::google::AccessType;
use crate::meeting::report::transcript_text;
use crate::meeting::MeetingReport;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub access_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub include_transcript: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptQuery {
    #[serde(default)]
    pub format: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(list_meetings))
        .route("/join", post(join_meeting))
        .route("/leave", post(leave_meeting))
        .route("/create", post(create_meeting))
        .route("/current", get(current_meeting))
        .route("/current/participants", get(current_participants))
        .route("/current/transcripts", get(current_transcripts))
        .route("/current/report", get(current_report))
        .route("/:id", get(get_meeting))
        .with_state(state)
}

async fn join_meeting(
    State(state): State<ApiState>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<Json<Value>> {
    info!("Join command received via API: {}", req.url);

    let display_name = req.display_name.unwrap_or(state.display_name);
    let meeting = state
        .backend
        .join_meeting(&req.url, Some(&display_name))
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Joined meeting {}", meeting.meeting_code),
        "meeting": meeting,
    })))
}

async fn leave_meeting(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Leave command received via API");

    let meeting = state.backend.leave_meeting().await?;
    let minutes = meeting.duration_minutes(Utc::now());

    Ok(Json(json!({
        "success": true,
        "message": format!("Left meeting after {} minutes", minutes),
        "duration_minutes": minutes,
        "meeting": meeting,
    })))
}

async fn create_meeting(
    State(state): State<ApiState>,
    body: Option<Json<CreateRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let access = req
        .access_type
        .as_deref()
        .map(str::parse::<AccessType>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    info!("Create command received via API ({:?})", access);
    let meeting = state.backend.create_meeting(req.title, access).await?;

    Ok(Json(json!({
        "success": true,
        "access_type": meeting.access_type.or(access),
        "meeting": meeting,
    })))
}

async fn list_meetings(State(state): State<ApiState>) -> Json<Value> {
    let current_id = state.backend.current_meeting().await.map(|m| m.id);
    let entries: Vec<Value> = state
        .backend
        .meetings()
        .await
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "meeting_code": m.meeting_code,
                "meeting_uri": m.meeting_uri,
                "title": m.title,
                "status": m.status,
                "started_at": m.started_at,
                "ended_at": m.ended_at,
                "participants": m.participants.len(),
                "transcript_segments": m.transcripts.len(),
                "current": current_id.as_deref() == Some(m.id.as_str()),
            })
        })
        .collect();

    Json(json!({ "meetings": entries }))
}

async fn current_meeting(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let meeting = state
        .backend
        .current_meeting()
        .await
        .ok_or(MeetError::NotInMeeting)?;

    Ok(Json(json!({
        "meeting": meeting,
        "duration_minutes": meeting.duration_minutes(Utc::now()),
    })))
}

async fn current_participants(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let participants = state.backend.participants().await?;
    let active = participants.iter().filter(|p| p.is_active).count();

    Ok(Json(json!({
        "participants": participants,
        "total": participants.len(),
        "active": active,
    })))
}

async fn current_transcripts(
    Query(query): Query<TranscriptQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let entries = state.backend.transcripts().await?;

    if query.format.as_deref() == Some("text") {
        return Ok(Json(json!({ "text": transcript_text(&entries) })));
    }

    Ok(Json(json!({
        "count": entries.len(),
        "transcripts": entries,
    })))
}

async fn current_report(
    Query(query): Query<ReportQuery>,
    State(state): State<ApiState>,
) -> ApiResult<Json<MeetingReport>> {
    let meeting = state
        .backend
        .current_meeting()
        .await
        .ok_or(MeetError::NotInMeeting)?;
    let recordings = state.backend.recording_links(&meeting).await?;

    Ok(Json(
        MeetingReport::build(&meeting, Utc::now(), query.include_transcript)
            .with_recordings(recordings),
    ))
}

async fn get_meeting(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let meeting = state
        .backend
        .meeting(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Meeting {} not found", id)))?;

    Ok(Json(json!({ "meeting": meeting })))
}
