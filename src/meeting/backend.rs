use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::model::{Meeting, Participant, TranscriptEntry};
use crate::error::{MeetError, MeetResult};
use crate::google::AccessType;

/// In-call controls the extension can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeetingControl {
    Mute,
    Unmute,
    CameraOn,
    CameraOff,
    StartRecording,
    StopRecording,
    Participants,
}

impl MeetingControl {
    pub const ALL: [MeetingControl; 7] = [
        Self::Mute,
        Self::Unmute,
        Self::CameraOn,
        Self::CameraOff,
        Self::StartRecording,
        Self::StopRecording,
        Self::Participants,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::CameraOn => "camera-on",
            Self::CameraOff => "camera-off",
            Self::StartRecording => "start-recording",
            Self::StopRecording => "stop-recording",
            Self::Participants => "participants",
        }
    }
}

impl FromStr for MeetingControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|control| control.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|c| c.as_str()).collect();
                format!("Unknown control '{}'. Expected one of: {}", s, names.join(", "))
            })
    }
}

/// Contract shared by the REST API and extension bridge backends.
#[async_trait]
pub trait MeetingBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validate `url`, then join or attach to that meeting.
    async fn join_meeting(&self, url: &str, display_name: Option<&str>) -> MeetResult<Meeting>;

    /// Best-effort leave. The returned meeting is `ended`.
    async fn leave_meeting(&self) -> MeetResult<Meeting>;

    async fn current_meeting(&self) -> Option<Meeting>;

    async fn participants(&self) -> MeetResult<Vec<Participant>>;

    async fn transcripts(&self) -> MeetResult<Vec<TranscriptEntry>>;

    /// Every meeting seen during this session.
    async fn meetings(&self) -> Vec<Meeting>;

    async fn meeting(&self, id: &str) -> Option<Meeting>;

    /// Create a meeting space. `None` leaves the access type to the backend's default.
    async fn create_meeting(
        &self,
        _title: Option<String>,
        _access_type: Option<AccessType>,
    ) -> MeetResult<Meeting> {
        Err(MeetError::Unsupported("Creating meetings", self.name()))
    }

    async fn control(&self, _control: MeetingControl) -> MeetResult<()> {
        Err(MeetError::Unsupported("Meeting controls", self.name()))
    }

    /// Links to recordings made of `meeting`, where the backend can see them.
    async fn recording_links(&self, _meeting: &Meeting) -> MeetResult<Vec<String>> {
        Ok(Vec::new())
    }
}
