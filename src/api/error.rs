//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::MeetError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<MeetError> for ApiError {
    fn from(err: MeetError) -> Self {
        let status = match &err {
            MeetError::InvalidMeetUrl(_) => StatusCode::BAD_REQUEST,
            MeetError::NotAuthenticated | MeetError::Authentication(_) => StatusCode::UNAUTHORIZED,
            MeetError::AlreadyInMeeting(_) | MeetError::NotInMeeting => StatusCode::CONFLICT,
            MeetError::JoinTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MeetError::ExtensionNotConnected => StatusCode::SERVICE_UNAVAILABLE,
            MeetError::Api { .. } => StatusCode::BAD_GATEWAY,
            MeetError::Unsupported(..) => StatusCode::NOT_IMPLEMENTED,
            MeetError::Http(_) | MeetError::Transcription(_) | MeetError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
