use serde::de::{DeserializeOwned, IgnoredAny};
use std::sync::Arc;
use tracing::{debug, error};

use super::auth::GoogleAuth;
use super::types::{
    ConferenceParticipant, ConferenceRecord, ConferenceRecordPage, CreateSpaceRequest,
    GoogleErrorResponse, Page, ParticipantPage, Recording, RecordingPage, Space, SpaceConfig,
    Transcript, TranscriptEntryPage, TranscriptEntryResource, TranscriptPage,
};
use crate::error::{MeetError, MeetResult};

const DEFAULT_BASE_URL: &str = "https://meet.googleapis.com/v2";
const PAGE_SIZE: u32 = 100;

/// Thin client over the Meet REST v2 resources this crate uses.
#[derive(Clone)]
pub struct MeetApiClient {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    base_url: String,
}

impl MeetApiClient {
    pub fn new(auth: Arc<GoogleAuth>, endpoint: Option<String>) -> Self {
        let base_url = endpoint
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            http: reqwest::Client::new(),
            auth,
            base_url,
        }
    }

    pub async fn create_space(&self, config: SpaceConfig) -> MeetResult<Space> {
        let request = self
            .http
            .post(self.url("spaces"))
            .json(&CreateSpaceRequest { config });
        self.send(request).await
    }

    /// `name` is `spaces/{id}` or `spaces/{meetingCode}`.
    pub async fn get_space(&self, name: &str) -> MeetResult<Space> {
        self.send(self.http.get(self.url(name))).await
    }

    pub async fn end_active_conference(&self, space_name: &str) -> MeetResult<()> {
        let request = self
            .http
            .post(self.url(&format!("{}:endActiveConference", space_name)))
            .json(&serde_json::json!({}));
        let _: IgnoredAny = self.send(request).await?;
        Ok(())
    }

    pub async fn get_conference_record(&self, name: &str) -> MeetResult<ConferenceRecord> {
        self.send(self.http.get(self.url(name))).await
    }

    pub async fn list_conference_records(
        &self,
        filter: Option<&str>,
    ) -> MeetResult<Vec<ConferenceRecord>> {
        self.list_all::<ConferenceRecordPage>("conferenceRecords", filter)
            .await
    }

    pub async fn list_participants(
        &self,
        conference_record: &str,
    ) -> MeetResult<Vec<ConferenceParticipant>> {
        self.list_all::<ParticipantPage>(&format!("{}/participants", conference_record), None)
            .await
    }

    pub async fn list_transcripts(&self, conference_record: &str) -> MeetResult<Vec<Transcript>> {
        self.list_all::<TranscriptPage>(&format!("{}/transcripts", conference_record), None)
            .await
    }

    pub async fn list_transcript_entries(
        &self,
        transcript: &str,
    ) -> MeetResult<Vec<TranscriptEntryResource>> {
        self.list_all::<TranscriptEntryPage>(&format!("{}/entries", transcript), None)
            .await
    }

    pub async fn list_recordings(&self, conference_record: &str) -> MeetResult<Vec<Recording>> {
        self.list_all::<RecordingPage>(&format!("{}/recordings", conference_record), None)
            .await
    }

    pub async fn get_recording(&self, name: &str) -> MeetResult<Recording> {
        self.send(self.http.get(self.url(name))).await
    }

    /// Follow `nextPageToken` until the listing is exhausted.
    async fn list_all<P: Page>(&self, path: &str, filter: Option<&str>) -> MeetResult<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(filter) = filter {
                query.push(("filter", filter.to_string()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: P = self
                .send(self.http.get(self.url(path)).query(&query))
                .await?;
            let (mut batch, next) = page.into_parts();
            items.append(&mut batch);

            match next.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} items from {}", items.len(), path);
        Ok(items)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> MeetResult<T> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GoogleErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.clone());
            error!("Meet API request failed with status {}: {}", status, message);

            return Err(match status.as_u16() {
                401 | 403 => MeetError::Authentication(message),
                code => MeetError::Api {
                    status: code,
                    message,
                },
            });
        }

        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| MeetError::Api {
            status: status.as_u16(),
            message: format!("Unexpected response body: {}", e),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
