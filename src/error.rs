//! Error type shared by the meeting backends.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeetError {
    #[error("Invalid Google Meet URL '{0}'. URL should be like: https://meet.google.com/abc-defg-hij")]
    InvalidMeetUrl(String),

    #[error("Not authenticated with Google. Configure a refresh token or authenticate first.")]
    NotAuthenticated,

    #[error("Google authentication failed: {0}")]
    Authentication(String),

    #[error("Google Meet API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Already in a meeting ({0}). Please leave the current meeting first.")]
    AlreadyInMeeting(String),

    #[error("Not currently in a meeting")]
    NotInMeeting,

    #[error("Timeout waiting for meeting to join after {}s", .0.as_secs())]
    JoinTimeout(Duration),

    #[error("No browser extension is connected to the bridge")]
    ExtensionNotConnected,

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("{0} is not supported by the {1} backend")]
    Unsupported(&'static str, &'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MeetError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::Authentication(_))
    }
}

pub type MeetResult<T> = Result<T, MeetError>;
