use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::GoogleAuth;
use super::client::MeetApiClient;
use super::types::{AccessType, ConferenceRecord, Recording, Space, SpaceConfig};
use crate::config::GoogleConfig;
use crate::error::{MeetError, MeetResult};
use crate::meeting::{
    Meeting, MeetingBackend, MeetingStatus, MeetingStatusHandle, MeetUrl, MeetUrlParser,
    Participant, TranscriptEntry,
};

/// Meeting backend that talks to the Meet REST API directly.
pub struct ApiMeetService {
    client: MeetApiClient,
    auth: Arc<GoogleAuth>,
    status: MeetingStatusHandle,
    urls: MeetUrlParser,
    default_access: AccessType,
}

impl ApiMeetService {
    pub fn new(config: &GoogleConfig, urls: MeetUrlParser) -> Self {
        let auth = Arc::new(GoogleAuth::from_config(config));
        let client = MeetApiClient::new(auth.clone(), config.api_endpoint.clone());
        Self {
            client,
            auth,
            status: MeetingStatusHandle::default(),
            urls,
            default_access: AccessType::parse_lenient(&config.default_access_type),
        }
    }

    pub fn auth(&self) -> Arc<GoogleAuth> {
        self.auth.clone()
    }

    /// End the active conference in `space_name`. The current meeting is
    /// marked ended when it is that space.
    pub async fn end_meeting(&self, space_name: &str) -> MeetResult<()> {
        self.client.end_active_conference(space_name).await?;
        self.status.end_if_current(space_name, Utc::now()).await;
        info!("Ended active conference in {}", space_name);
        Ok(())
    }

    /// The space's active conference, else its most recent record.
    pub async fn conference_record_for(
        &self,
        space_name: &str,
    ) -> MeetResult<Option<ConferenceRecord>> {
        let space = self.client.get_space(space_name).await?;
        if let Some(active) = space.active_conference {
            return self
                .client
                .get_conference_record(&active.conference_record)
                .await
                .map(Some);
        }

        let filter = format!("space.name = \"{}\"", space.name);
        let records = self.client.list_conference_records(Some(&filter)).await?;
        Ok(records.into_iter().max_by_key(|r| r.start_time))
    }

    pub async fn list_participants(&self, record_name: &str) -> MeetResult<Vec<Participant>> {
        let participants = self.client.list_participants(record_name).await?;
        Ok(participants
            .into_iter()
            .map(|p| {
                let mut participant = Participant::new(
                    p.name.clone(),
                    p.display_name(),
                    p.earliest_start_time.unwrap_or_else(Utc::now),
                );
                if let Some(left) = p.latest_end_time {
                    participant.mark_left(left);
                }
                participant
            })
            .collect())
    }

    /// Entries of one transcript rendered as `speaker: text` lines.
    pub async fn transcript_text(&self, transcript_name: &str) -> MeetResult<String> {
        let entries = self.client.list_transcript_entries(transcript_name).await?;
        Ok(entries
            .iter()
            .map(|entry| {
                format!(
                    "{}: {}\n",
                    entry.participant.as_deref().unwrap_or("Unknown"),
                    entry.text
                )
            })
            .collect())
    }

    pub async fn recordings(&self, record_name: &str) -> MeetResult<Vec<Recording>> {
        self.client.list_recordings(record_name).await
    }

    /// Drive export link of a recording, or `None` when it cannot be fetched.
    pub async fn recording_url(&self, recording_name: &str) -> Option<String> {
        match self.client.get_recording(recording_name).await {
            Ok(recording) => recording.export_uri().map(str::to_string),
            Err(e) => {
                warn!("Failed to get recording {}: {}", recording_name, e);
                None
            }
        }
    }

    async fn require_current(&self) -> MeetResult<Meeting> {
        self.status.current().await.ok_or(MeetError::NotInMeeting)
    }

    fn meeting_from_space(&self, space: Space, fallback: Option<&MeetUrl>) -> Meeting {
        let code = space
            .meeting_code
            .clone()
            .or_else(|| fallback.map(|u| u.code.clone()))
            .unwrap_or_default();
        let uri = space
            .meeting_uri
            .clone()
            .unwrap_or_else(|| MeetUrl::from_code(&code).url);
        let status = if space.active_conference.is_some() {
            MeetingStatus::Active
        } else {
            MeetingStatus::Waiting
        };
        let mut meeting = Meeting::new(space.name, code, uri, Utc::now(), status);
        meeting.access_type = space.config.and_then(|c| c.access_type);
        meeting
    }
}

#[async_trait]
impl MeetingBackend for ApiMeetService {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn join_meeting(&self, url: &str, _display_name: Option<&str>) -> MeetResult<Meeting> {
        let meet_url = self.urls.parse(url)?;
        self.status.ensure_idle().await?;

        let space = self
            .client
            .get_space(&format!("spaces/{}", meet_url.code))
            .await?;
        let meeting = self.meeting_from_space(space, Some(&meet_url));

        info!(
            "Tracking meeting {} ({}) with status {}",
            meeting.id,
            meeting.meeting_code,
            meeting.status.as_str()
        );
        self.status.set_current(meeting.clone()).await;
        Ok(meeting)
    }

    async fn leave_meeting(&self) -> MeetResult<Meeting> {
        let current = self.require_current().await?;

        if let Err(e) = self.client.end_active_conference(&current.id).await {
            warn!("Failed to end conference in {}: {}", current.id, e);
        }

        let ended = self
            .status
            .end_current(Utc::now())
            .await
            .ok_or(MeetError::NotInMeeting)?;
        info!("Left meeting {}", ended.id);
        Ok(ended)
    }

    async fn current_meeting(&self) -> Option<Meeting> {
        self.status.current().await
    }

    async fn participants(&self) -> MeetResult<Vec<Participant>> {
        let current = self.require_current().await?;
        let Some(record) = self.conference_record_for(&current.id).await? else {
            return Ok(current.participants);
        };

        let participants = self.list_participants(&record.name).await?;
        let snapshot = participants.clone();
        self.status
            .with_current(move |meeting| {
                if meeting.status == MeetingStatus::Waiting {
                    meeting.status = MeetingStatus::Active;
                }
                meeting.participants = snapshot;
            })
            .await;
        Ok(participants)
    }

    async fn transcripts(&self) -> MeetResult<Vec<TranscriptEntry>> {
        let current = self.require_current().await?;
        let Some(record) = self.conference_record_for(&current.id).await? else {
            return Ok(current.transcripts);
        };

        let speakers: HashMap<String, String> = self
            .list_participants(&record.name)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let known: HashSet<String> = current.transcripts.iter().map(|t| t.id.clone()).collect();
        let mut fresh = Vec::new();
        for transcript in self.client.list_transcripts(&record.name).await? {
            for entry in self.client.list_transcript_entries(&transcript.name).await? {
                if known.contains(&entry.name) {
                    continue;
                }
                let speaker_id = entry.participant.clone().unwrap_or_default();
                let speaker_name = speakers
                    .get(&speaker_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string());
                let mut converted = TranscriptEntry::new(
                    speaker_name,
                    speaker_id,
                    entry.text.clone(),
                    entry.start_time.unwrap_or_else(Utc::now),
                    1.0,
                );
                converted.id = entry.name.clone();
                fresh.push(converted);
            }
        }

        if !fresh.is_empty() {
            info!("Fetched {} new transcript entries", fresh.len());
        }

        self.status
            .with_current(move |meeting| {
                meeting.extend_transcripts(fresh);
                meeting.transcripts.clone()
            })
            .await
            .ok_or(MeetError::NotInMeeting)
    }

    async fn meetings(&self) -> Vec<Meeting> {
        self.status.meetings().await
    }

    async fn meeting(&self, id: &str) -> Option<Meeting> {
        self.status.meeting(id).await
    }

    async fn create_meeting(
        &self,
        title: Option<String>,
        access_type: Option<AccessType>,
    ) -> MeetResult<Meeting> {
        self.status.ensure_idle().await?;
        let access_type = access_type.unwrap_or(self.default_access);

        let space = self
            .client
            .create_space(SpaceConfig {
                access_type: Some(access_type),
                entry_point_access: None,
            })
            .await?;

        let mut meeting = self
            .meeting_from_space(space, None)
            .with_title(Some(title.unwrap_or_else(|| "Meeting".to_string())));
        meeting.status = MeetingStatus::Waiting;
        meeting.access_type.get_or_insert(access_type);

        info!(
            "Created meeting space {} ({}) with {} access",
            meeting.id, meeting.meeting_uri, access_type
        );
        self.status.set_current(meeting.clone()).await;
        Ok(meeting)
    }

    async fn recording_links(&self, meeting: &Meeting) -> MeetResult<Vec<String>> {
        let Some(record) = self.conference_record_for(&meeting.id).await? else {
            return Ok(Vec::new());
        };
        Ok(self
            .recordings(&record.name)
            .await?
            .iter()
            .filter_map(|r| r.export_uri().map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ApiMeetService {
        let config = GoogleConfig {
            api_endpoint: Some("http://127.0.0.1:9/v2".into()),
            token_endpoint: Some("http://127.0.0.1:9/token".into()),
            default_access_type: "trusted".into(),
            ..GoogleConfig::default()
        };
        ApiMeetService::new(&config, MeetUrlParser::new().unwrap())
    }

    #[tokio::test]
    async fn test_join_rejects_malformed_url_first() {
        let svc = service();
        let err = svc
            .join_meeting("https://meet.google.com/x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::InvalidMeetUrl(_)));
    }

    #[tokio::test]
    async fn test_join_unauthenticated() {
        let svc = service();
        let err = svc
            .join_meeting("https://meet.google.com/abc-defg-hij", None)
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(svc.current_meeting().await.is_none());
    }

    #[tokio::test]
    async fn test_create_unauthenticated() {
        let svc = service();
        assert_eq!(svc.default_access, AccessType::Trusted);
        let err = svc
            .create_meeting(None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_leave_without_meeting() {
        let svc = service();
        assert!(matches!(
            svc.leave_meeting().await,
            Err(MeetError::NotInMeeting)
        ));
        assert!(matches!(
            svc.participants().await,
            Err(MeetError::NotInMeeting)
        ));
    }
}
