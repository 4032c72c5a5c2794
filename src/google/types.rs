//! Meet REST v2 resources, as they appear on the wire.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    #[default]
    Open,
    Trusted,
    Restricted,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Trusted => "TRUSTED",
            Self::Restricted => "RESTRICTED",
        }
    }

    /// Case-insensitive; anything unrecognised is `Open`.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    /// Access type asked for in a request like "start a private meeting",
    /// if the wording names one.
    pub fn mentioned_in(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        if text.contains("restricted") || text.contains("private") {
            Some(Self::Restricted)
        } else if text.contains("trusted") || text.contains("organization") {
            Some(Self::Trusted)
        } else if text.contains("open") || text.contains("public") {
            Some(Self::Open)
        } else {
            None
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "TRUSTED" => Ok(Self::Trusted),
            "RESTRICTED" => Ok(Self::Restricted),
            other => Err(format!("Unknown access type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_type: Option<AccessType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_point_access: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConference {
    pub conference_record: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub name: String,
    pub meeting_uri: Option<String>,
    pub meeting_code: Option<String>,
    pub config: Option<SpaceConfig>,
    pub active_conference: Option<ActiveConference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSpaceRequest {
    pub config: SpaceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceRecord {
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub expire_time: Option<DateTime<Utc>>,
    pub space: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedinUser {
    pub user: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedUser {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceParticipant {
    pub name: String,
    pub earliest_start_time: Option<DateTime<Utc>>,
    pub latest_end_time: Option<DateTime<Utc>>,
    pub signedin_user: Option<SignedinUser>,
    pub anonymous_user: Option<NamedUser>,
    pub phone_user: Option<NamedUser>,
}

impl ConferenceParticipant {
    pub fn display_name(&self) -> String {
        if let Some(user) = &self.signedin_user {
            return user
                .display_name
                .clone()
                .or_else(|| user.user.clone())
                .unwrap_or_else(|| "Signed-in User".to_string());
        }
        if let Some(user) = &self.anonymous_user {
            return user
                .display_name
                .clone()
                .unwrap_or_else(|| "Anonymous User".to_string());
        }
        if let Some(user) = &self.phone_user {
            return user
                .display_name
                .clone()
                .unwrap_or_else(|| "Phone User".to_string());
        }
        "Unknown".to_string()
    }

    pub fn is_active(&self) -> bool {
        self.latest_end_time.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsDestination {
    pub document: Option<String>,
    pub export_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub name: String,
    pub state: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub docs_destination: Option<DocsDestination>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntryResource {
    pub name: String,
    /// Participant resource name of the speaker.
    pub participant: Option<String>,
    #[serde(default)]
    pub text: String,
    pub language_code: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveDestination {
    pub file: Option<String>,
    pub export_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub name: String,
    pub state: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub drive_destination: Option<DriveDestination>,
}

impl Recording {
    pub fn export_uri(&self) -> Option<&str> {
        self.drive_destination
            .as_ref()
            .and_then(|d| d.export_uri.as_deref())
    }
}

/// One page of a `list` call.
pub trait Page: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

macro_rules! list_page {
    ($page:ident, $field:ident, $item:ty) => {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $page {
            #[serde(default)]
            pub $field: Vec<$item>,
            pub next_page_token: Option<String>,
        }

        impl Page for $page {
            type Item = $item;

            fn into_parts(self) -> (Vec<$item>, Option<String>) {
                (self.$field, self.next_page_token)
            }
        }
    };
}

list_page!(ConferenceRecordPage, conference_records, ConferenceRecord);
list_page!(ParticipantPage, participants, ConferenceParticipant);
list_page!(TranscriptPage, transcripts, Transcript);
list_page!(TranscriptEntryPage, transcript_entries, TranscriptEntryResource);
list_page!(RecordingPage, recordings, Recording);

#[derive(Debug, Deserialize)]
pub struct GoogleErrorResponse {
    pub error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct GoogleErrorBody {
    pub code: Option<u16>,
    pub message: String,
    pub status: Option<String>,
}
