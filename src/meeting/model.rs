//! Meeting, participant and transcript records.
//!
//! Every mutation goes through a method here so timestamps stay ordered:
//! transcript timestamps never go backwards, and leave/end times never
//! precede the matching join/start time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::google::AccessType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Waiting,
    Active,
    Ended,
    Error,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            joined_at,
            left_at: None,
            is_active: true,
        }
    }

    /// Mark the participant as gone. The leave time is clamped to the join time.
    pub fn mark_left(&mut self, at: DateTime<Utc>) {
        self.left_at = Some(at.max(self.joined_at));
        self.is_active = false;
    }

    /// Minutes between joining and leaving, or `None` while still present.
    pub fn minutes_present(&self) -> Option<i64> {
        self.left_at
            .map(|left| (left - self.joined_at).num_seconds().max(0) / 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: String,
    pub speaker_name: String,
    pub speaker_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
    /// Offset in seconds within the audio the entry was transcribed from.
    pub start_offset: Option<f64>,
    pub end_offset: Option<f64>,
}

impl TranscriptEntry {
    pub fn new(
        speaker_name: impl Into<String>,
        speaker_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
        confidence: f32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            speaker_name: speaker_name.into(),
            speaker_id: speaker_id.into(),
            text: text.into(),
            timestamp,
            confidence: confidence.clamp(0.0, 1.0),
            start_offset: None,
            end_offset: None,
        }
    }

    pub fn with_offsets(mut self, start: f64, end: f64) -> Self {
        self.start_offset = Some(start);
        self.end_offset = Some(end.max(start));
        self
    }

    pub fn line(&self) -> String {
        format!("{}: {}", self.speaker_name, self.text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    /// Space resource name for API meetings, extension-assigned id otherwise.
    pub id: String,
    pub meeting_code: String,
    pub meeting_uri: String,
    pub title: Option<String>,
    /// Who may join without knocking; only known for API-created spaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_type: Option<AccessType>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub participants: Vec<Participant>,
    pub transcripts: Vec<TranscriptEntry>,
    pub status: MeetingStatus,
}

impl Meeting {
    pub fn new(
        id: impl Into<String>,
        meeting_code: impl Into<String>,
        meeting_uri: impl Into<String>,
        started_at: DateTime<Utc>,
        status: MeetingStatus,
    ) -> Self {
        Self {
            id: id.into(),
            meeting_code: meeting_code.into(),
            meeting_uri: meeting_uri.into(),
            title: None,
            access_type: None,
            started_at,
            ended_at: None,
            participants: Vec::new(),
            transcripts: Vec::new(),
            status,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Append a transcript entry, pulling its timestamp forward to the
    /// previous entry's if it arrived out of order.
    pub fn push_transcript(&mut self, mut entry: TranscriptEntry) {
        if let Some(last) = self.transcripts.last() {
            if entry.timestamp < last.timestamp {
                entry.timestamp = last.timestamp;
            }
        }
        self.transcripts.push(entry);
    }

    pub fn extend_transcripts(&mut self, entries: impl IntoIterator<Item = TranscriptEntry>) {
        for entry in entries {
            self.push_transcript(entry);
        }
    }

    /// Record a participant joining. A known id is reactivated rather than duplicated.
    pub fn participant_joined(&mut self, id: &str, name: &str, at: DateTime<Utc>) {
        match self.participants.iter_mut().find(|p| p.id == id) {
            Some(existing) => {
                existing.name = name.to_string();
                existing.joined_at = at;
                existing.left_at = None;
                existing.is_active = true;
            }
            None => self.participants.push(Participant::new(id, name, at)),
        }
    }

    /// Returns false when the participant is unknown.
    pub fn participant_left(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        match self.participants.iter_mut().find(|p| p.id == id) {
            Some(participant) => {
                participant.mark_left(at);
                true
            }
            None => false,
        }
    }

    pub fn end(&mut self, at: DateTime<Utc>) {
        self.ended_at = Some(at.max(self.started_at));
        self.status = MeetingStatus::Ended;
    }

    pub fn is_ended(&self) -> bool {
        self.status == MeetingStatus::Ended
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_active)
    }

    /// Whole minutes from start to end, or to `now` while the meeting runs.
    pub fn duration_minutes(&self, now: DateTime<Utc>) -> i64 {
        let until = self.ended_at.unwrap_or(now);
        (until - self.started_at).num_seconds().max(0) / 60
    }
}
