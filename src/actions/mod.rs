//! Agent-facing operations over whichever meeting backend is active.
//!
//! Every action answers with an [`ActionResponse`]; failures are logged and
//! reported as `success: false` rather than returned as errors.

pub mod provider;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::MeetError;
use crate::google::{AccessType, GoogleAuth};
use crate::meeting::report::{recent_lines, speaker_contributions};
use crate::meeting::{Meeting, MeetingBackend, MeetingReport, MeetUrlParser};

pub use provider::meeting_context;

const SUMMARY_RECENT_SEGMENTS: usize = 20;
const SUMMARY_LISTED: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Inputs an agent runtime may attach to an action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub include_transcript: bool,
    #[serde(default)]
    pub access_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    JoinMeeting,
    LeaveMeeting,
    CreateMeeting,
    GetMeetingInfo,
    GetParticipants,
    SummarizeMeeting,
    GenerateReport,
    Authenticate,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        Self::JoinMeeting,
        Self::LeaveMeeting,
        Self::CreateMeeting,
        Self::GetMeetingInfo,
        Self::GetParticipants,
        Self::SummarizeMeeting,
        Self::GenerateReport,
        Self::Authenticate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JoinMeeting => "join_meeting",
            Self::LeaveMeeting => "leave_meeting",
            Self::CreateMeeting => "create_meeting",
            Self::GetMeetingInfo => "get_meeting_info",
            Self::GetParticipants => "get_participants",
            Self::SummarizeMeeting => "summarize_meeting",
            Self::GenerateReport => "generate_report",
            Self::Authenticate => "authenticate",
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("Unknown action '{}'", s))
    }
}

pub struct MeetActions {
    backend: Arc<dyn MeetingBackend>,
    auth: Option<Arc<GoogleAuth>>,
    urls: MeetUrlParser,
    display_name: String,
    join_verbs: Regex,
    leave_verbs: Regex,
    meeting_nouns: Regex,
}

impl MeetActions {
    pub fn new(
        backend: Arc<dyn MeetingBackend>,
        auth: Option<Arc<GoogleAuth>>,
        urls: MeetUrlParser,
        display_name: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            backend,
            auth,
            urls,
            display_name: display_name.into(),
            join_verbs: Regex::new(r"(?i)join|enter|attend|go to")?,
            leave_verbs: Regex::new(r"(?i)leave|exit|quit|end|stop|disconnect")?,
            meeting_nouns: Regex::new(r"(?i)meet|meeting|call")?,
        })
    }

    /// True when `text` asks to join and carries a Meet link.
    pub fn wants_join(&self, text: &str) -> bool {
        self.join_verbs.is_match(text) && self.urls.contains_url(text)
    }

    pub fn wants_leave(&self, text: &str) -> bool {
        self.leave_verbs.is_match(text) && self.meeting_nouns.is_match(text)
    }

    pub async fn dispatch(&self, kind: ActionKind, request: ActionRequest) -> ActionResponse {
        let text = request.text.as_deref().unwrap_or_default();
        match kind {
            ActionKind::JoinMeeting => self.join_meeting(text).await,
            ActionKind::LeaveMeeting => self.leave_meeting().await,
            ActionKind::CreateMeeting => {
                let access = request
                    .access_type
                    .as_deref()
                    .and_then(|a| a.parse::<AccessType>().ok());
                self.create_meeting(text, access).await
            }
            ActionKind::GetMeetingInfo => {
                self.get_meeting_info(text, request.meeting_id.as_deref()).await
            }
            ActionKind::GetParticipants => self.get_participants().await,
            ActionKind::SummarizeMeeting => self.summarize_meeting().await,
            ActionKind::GenerateReport => {
                self.generate_report(request.meeting_id.as_deref(), request.include_transcript)
                    .await
            }
            ActionKind::Authenticate => self.authenticate(),
        }
    }

    pub async fn join_meeting(&self, text: &str) -> ActionResponse {
        let meet_url = match self.urls.extract(text) {
            Ok(url) => url,
            Err(_) if !self.urls.contains_url(text) => {
                return ActionResponse::failed("Could not extract Google Meet URL from message")
            }
            Err(_) => {
                return ActionResponse::failed(
                    "Invalid Google Meet URL - missing meeting code. URL should be like: https://meet.google.com/abc-defg-hij",
                )
            }
        };

        match self
            .backend
            .join_meeting(&meet_url.url, Some(&self.display_name))
            .await
        {
            Ok(meeting) => {
                info!("Successfully joined meeting: {}", meeting.id);
                ActionResponse::ok(
                    format!(
                        "Successfully joined Google Meet at {}. I'm now listening and transcribing the conversation.",
                        meeting.meeting_uri
                    ),
                    json!({
                        "meetingId": meeting.id,
                        "meetingUrl": meeting.meeting_uri,
                        "status": meeting.status.as_str(),
                    }),
                )
            }
            Err(e) => fail("join meeting", e),
        }
    }

    pub async fn leave_meeting(&self) -> ActionResponse {
        if self.backend.current_meeting().await.is_none() {
            return ActionResponse::failed("Not currently in a meeting");
        }

        match self.backend.leave_meeting().await {
            Ok(meeting) => {
                let minutes = meeting.duration_minutes(Utc::now());
                info!("Successfully left meeting {}", meeting.id);
                ActionResponse::ok(
                    format!(
                        "Left the Google Meet successfully. Meeting lasted {} minutes.",
                        minutes
                    ),
                    json!({ "meetingId": meeting.id, "durationMinutes": minutes }),
                )
            }
            Err(e) => fail("leave meeting", e),
        }
    }

    /// Create a meeting space. `access` wins over wording in `text`; with
    /// neither, the backend's configured default applies.
    pub async fn create_meeting(&self, text: &str, access: Option<AccessType>) -> ActionResponse {
        let access = access.or_else(|| AccessType::mentioned_in(text));
        match self.backend.create_meeting(None, access).await {
            Ok(meeting) => ActionResponse::ok(
                format!(
                    "Meeting created successfully!\n\nMeeting Details:\n- Meeting Link: {}\n- Meeting Code: {}\n- Access Type: {}\n- Status: {}\n\nYou can share this link with participants to join the meeting.",
                    meeting.meeting_uri,
                    meeting.meeting_code,
                    meeting
                        .access_type
                        .or(access)
                        .map(|a| a.as_str())
                        .unwrap_or("default"),
                    meeting.status.as_str()
                ),
                json!({
                    "meetingId": meeting.id,
                    "meetingUri": meeting.meeting_uri,
                    "meetingCode": meeting.meeting_code,
                }),
            ),
            Err(e) => fail("create meeting", e),
        }
    }

    pub async fn get_meeting_info(&self, text: &str, meeting_id: Option<&str>) -> ActionResponse {
        let mut meeting = self.backend.current_meeting().await;

        if meeting.is_none() {
            if self.urls.find_meeting_code(text).is_some() {
                return ActionResponse::failed(
                    "Please provide the full meeting space ID (not just the meeting code) to retrieve meeting information",
                );
            }
            if let Some(id) = meeting_id {
                meeting = self.backend.meeting(id).await;
            }
        }

        let Some(meeting) = meeting else {
            return ActionResponse::failed(
                "No active meeting found. Please create a meeting first or provide a meeting ID.",
            );
        };

        ActionResponse::ok(
            meeting_info_text(&meeting),
            json!({
                "meetingId": meeting.id,
                "meetingUri": meeting.meeting_uri,
                "meetingCode": meeting.meeting_code,
                "participantCount": meeting.participants.len(),
            }),
        )
    }

    pub async fn get_participants(&self) -> ActionResponse {
        let Some(meeting) = self.backend.current_meeting().await else {
            return ActionResponse::failed(
                "No active meeting found. Please create or join a meeting first.",
            );
        };

        let participants = match self.backend.participants().await {
            Ok(participants) => participants,
            Err(e) => return fail("get participants", e),
        };

        let listing = if participants.is_empty() {
            "No participants have joined yet.".to_string()
        } else {
            participants
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let state = if p.is_active { "active" } else { "left" };
                    let presence = match p.minutes_present() {
                        Some(minutes) => format!("({} min)", minutes),
                        None => "(active)".to_string(),
                    };
                    format!(
                        "{}. [{}] {} - Joined at {} {}",
                        i + 1,
                        state,
                        p.name,
                        p.joined_at.format("%H:%M:%S"),
                        presence
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let active = participants.iter().filter(|p| p.is_active).count();
        ActionResponse::ok(
            format!(
                "Meeting Participants:\n\n{}\n\nTotal participants: {}\nCurrently active: {}",
                listing,
                participants.len(),
                active
            ),
            json!({
                "meetingId": meeting.id,
                "participants": participants,
            }),
        )
    }

    pub async fn summarize_meeting(&self) -> ActionResponse {
        let Some(meeting) = self.backend.current_meeting().await else {
            return ActionResponse::failed("No active meeting to summarize. Join a meeting first.");
        };

        let transcripts = match self.backend.transcripts().await {
            Ok(transcripts) => transcripts,
            Err(e) => return fail("summarize meeting", e),
        };
        if transcripts.is_empty() {
            return ActionResponse::failed(
                "No transcripts available yet. Enable closed captions in Google Meet or wait for audio transcription.",
            );
        }

        let participants = self.backend.participants().await.unwrap_or_default();
        let duration = meeting.duration_minutes(Utc::now());
        let speakers = speaker_contributions(&transcripts);

        let mut message = format!(
            "Meeting Summary\n\nMeeting URL: {}\nDuration: {} minutes\nParticipants: {} people\n",
            meeting.meeting_uri,
            duration,
            participants.len()
        );
        for p in participants.iter().take(SUMMARY_LISTED) {
            message.push_str(&format!("  - {}\n", p.name));
        }
        if participants.len() > SUMMARY_LISTED {
            message.push_str(&format!(
                "  - ... and {} more\n",
                participants.len() - SUMMARY_LISTED
            ));
        }

        message.push_str(&format!(
            "\nTranscript Summary:\n- Total segments captured: {}\n- Speakers identified: {}\n\nSpeaker Contributions:\n",
            transcripts.len(),
            speakers.len()
        ));
        for speaker in speakers.iter().take(SUMMARY_LISTED) {
            message.push_str(&format!("  - {}: {} segments\n", speaker.speaker, speaker.segments));
        }
        message.push_str(&format!(
            "\nRecent Discussion (last {} segments):\n{}",
            SUMMARY_RECENT_SEGMENTS,
            recent_lines(&transcripts, SUMMARY_RECENT_SEGMENTS)
        ));

        info!(
            "Generated meeting summary: {} minutes, {} participants, {} transcripts",
            duration,
            participants.len(),
            transcripts.len()
        );

        ActionResponse::ok(
            message,
            json!({
                "meetingId": meeting.id,
                "duration": duration,
                "participantCount": participants.len(),
                "transcriptCount": transcripts.len(),
                "speakerCount": speakers.len(),
            }),
        )
    }

    pub async fn generate_report(
        &self,
        meeting_id: Option<&str>,
        include_transcript: bool,
    ) -> ActionResponse {
        let meeting = match meeting_id {
            Some(id) => self.backend.meeting(id).await,
            None => self.backend.current_meeting().await,
        };
        let Some(meeting) = meeting else {
            return ActionResponse::failed(
                "No meeting specified. Please provide a meeting ID or ensure there's an active meeting.",
            );
        };

        let recordings = match self.backend.recording_links(&meeting).await {
            Ok(links) => links,
            Err(e) => {
                error!("Failed to list recordings for {}: {}", meeting.id, e);
                Vec::new()
            }
        };

        let report = MeetingReport::build(&meeting, Utc::now(), include_transcript)
            .with_recordings(recordings);
        let message = format!("Meeting report generated successfully!\n\n{}", report.to_text());

        match serde_json::to_value(&report) {
            Ok(data) => ActionResponse::ok(message, data),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                ActionResponse::message(message)
            }
        }
    }

    pub fn authenticate(&self) -> ActionResponse {
        let Some(auth) = &self.auth else {
            return ActionResponse::failed(format!(
                "Google Meet API authentication is not used by the {} backend",
                self.backend.name()
            ));
        };

        if auth.is_authenticated() {
            return ActionResponse::message(
                "Already authenticated with Google Meet API. You can now create meetings, get participant info, and access meeting artifacts.",
            );
        }

        match auth.authorization_url() {
            Ok(url) => ActionResponse::ok(
                format!(
                    "To authenticate with Google Meet API:\n\n1. Visit this URL: {}\n2. Sign in with your Google account\n3. Grant the requested permissions\n4. Save the refresh token you receive as GOOGLE_REFRESH_TOKEN and restart",
                    url
                ),
                json!({ "authUrl": url }),
            ),
            Err(e) => fail("authenticate", e),
        }
    }
}

fn meeting_info_text(meeting: &Meeting) -> String {
    let mut text = format!(
        "Meeting Information:\n- Meeting Link: {}\n- Meeting Code: {}\n- Status: {}\n- Started: {}\n",
        meeting.meeting_uri,
        meeting.meeting_code,
        meeting.status.as_str(),
        meeting.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    match meeting.ended_at {
        Some(ended) => text.push_str(&format!("- Ended: {}\n", ended.format("%Y-%m-%d %H:%M:%S UTC"))),
        None => text.push_str("- Duration: Ongoing\n"),
    }
    text.push_str(&format!("- Participants: {}", meeting.participants.len()));

    if !meeting.participants.is_empty() {
        text.push_str("\n\nActive Participants:");
        for p in meeting.active_participants() {
            text.push_str(&format!("\n  - {} (joined {})", p.name, p.joined_at.format("%H:%M:%S")));
        }
    }
    text
}

fn fail(action: &str, err: MeetError) -> ActionResponse {
    error!("Failed to {}: {}", action, err);
    ActionResponse::failed(err.to_string())
}
