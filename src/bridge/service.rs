use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::hub::BridgeHub;
use super::protocol::{decode_data_url, BridgeCommand, ExtensionEvent};
use crate::config::Config;
use crate::error::{MeetError, MeetResult};
use crate::meeting::{
    report, Meeting, MeetingBackend, MeetingControl, MeetingStatus, MeetingStatusHandle,
    MeetUrlParser, Participant, TranscriptEntry,
};
use crate::transcription::{AudioBatch, AudioBuffer, BufferSettings, Transcriber};

/// Confidence assigned to caption text scraped by the extension.
const CAPTION_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct ExtensionSettings {
    pub join_timeout: Duration,
    pub buffer: BufferSettings,
}

impl From<&Config> for ExtensionSettings {
    fn from(config: &Config) -> Self {
        Self {
            join_timeout: Duration::from_secs(config.extension.join_timeout_seconds),
            buffer: BufferSettings::from(&config.transcription),
        }
    }
}

/// Meeting backend driven by the browser extension over the bridge hub.
pub struct ExtensionMeetService {
    hub: BridgeHub,
    status: MeetingStatusHandle,
    urls: MeetUrlParser,
    transcriber: Option<Arc<Transcriber>>,
    audio: Option<AudioBuffer>,
    batches: Mutex<Option<mpsc::UnboundedReceiver<AudioBatch>>>,
    join_timeout: Duration,
}

impl ExtensionMeetService {
    pub fn new(
        hub: BridgeHub,
        urls: MeetUrlParser,
        transcriber: Option<Transcriber>,
        settings: ExtensionSettings,
    ) -> Self {
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let transcriber = transcriber.map(Arc::new);
        let audio = transcriber
            .as_ref()
            .map(|_| AudioBuffer::new(settings.buffer, batch_tx));

        Self {
            hub,
            status: MeetingStatusHandle::default(),
            urls,
            transcriber,
            audio,
            batches: Mutex::new(Some(batch_rx)),
            join_timeout: settings.join_timeout,
        }
    }

    /// Apply extension events and transcribe flushed audio until `shutdown`.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ExtensionEvent>,
        shutdown: CancellationToken,
    ) {
        let mut batches = self.batches.lock().await.take();
        info!("Extension meeting service running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = events.recv() => self.apply_event(event).await,
                Some(batch) = next_batch(&mut batches) => self.spawn_batch(batch),
                else => break,
            }
        }

        if let Some(audio) = &self.audio {
            audio.stop().await;
        }
        info!("Extension meeting service stopped");
    }

    /// Fold one extension event into session state.
    pub async fn apply_event(self: &Arc<Self>, event: ExtensionEvent) {
        match event {
            ExtensionEvent::MeetingJoined {
                meeting_id,
                meeting_url,
                timestamp,
            } => {
                let code = self
                    .urls
                    .code_of(&meeting_url)
                    .unwrap_or_else(|| meeting_id.clone());
                let meeting = Meeting::new(
                    meeting_id.clone(),
                    code,
                    meeting_url,
                    timestamp,
                    MeetingStatus::Active,
                );

                if let Some(previous) = self.status.current().await {
                    if previous.id != meeting_id {
                        warn!("Meeting {} replaced by {}", previous.id, meeting_id);
                        self.status.end_current(timestamp).await;
                    }
                }

                // Audio queued so far belongs to whatever meeting came before.
                if let Some(audio) = &self.audio {
                    audio.retarget(Some(meeting_id.clone())).await;
                }
                self.status.set_current(meeting).await;
                info!("Joined meeting: {}", meeting_id);
            }
            ExtensionEvent::MeetingLeft {
                meeting_id,
                timestamp,
            } => {
                if self
                    .status
                    .end_if_current(&meeting_id, timestamp)
                    .await
                    .is_some()
                {
                    self.stop_audio().await;
                    info!("Left meeting: {}", meeting_id);
                } else {
                    debug!("Ignoring MEETING_LEFT for non-current meeting {}", meeting_id);
                }
            }
            ExtensionEvent::ParticipantJoined {
                participant,
                timestamp,
            } => {
                let name = participant.name.clone();
                if self
                    .status
                    .with_current(|m| m.participant_joined(&participant.id, &participant.name, timestamp))
                    .await
                    .is_some()
                {
                    info!("Participant joined: {}", name);
                }
            }
            ExtensionEvent::ParticipantLeft {
                participant,
                timestamp,
            } => {
                let known = self
                    .status
                    .with_current(|m| m.participant_left(&participant.id, timestamp))
                    .await;
                if known == Some(true) {
                    info!("Participant left: {}", participant.name);
                }
            }
            ExtensionEvent::Transcript {
                speaker,
                text,
                timestamp,
            } => {
                debug!("Transcript: {}: {}", speaker, text);
                let entry =
                    TranscriptEntry::new(speaker.clone(), speaker, text, timestamp, CAPTION_CONFIDENCE);
                self.status.with_current(|m| m.push_transcript(entry)).await;
            }
            ExtensionEvent::AudioChunk {
                data, sample_rate, ..
            } => {
                debug!(
                    "Received audio chunk: {} samples at {}Hz",
                    data.len(),
                    sample_rate
                );
                if let Some(audio) = &self.audio {
                    if self.status.current().await.is_some() {
                        audio.push(&data, sample_rate).await;
                    }
                }
            }
            ExtensionEvent::RecordingComplete { data, mime_type } => {
                info!("Recording complete: {}", mime_type);
                self.spawn_recording(data, mime_type).await;
            }
            ExtensionEvent::StatusUpdate { details } => {
                debug!("Status update: {:?}", details);
            }
            ExtensionEvent::TabClosed { tab_id } => {
                info!("Meeting tab {} closed", tab_id);
            }
        }
    }

    /// Plain-text digest of the current meeting.
    pub async fn meeting_summary(&self) -> String {
        match self.status.current().await {
            Some(meeting) => report::summary_text(&meeting, Utc::now()),
            None => "No active meeting.".to_string(),
        }
    }

    async fn require_extension(&self) -> MeetResult<()> {
        if self.hub.connected_clients().await == 0 {
            return Err(MeetError::ExtensionNotConnected);
        }
        Ok(())
    }

    async fn start_audio(&self) {
        match &self.audio {
            Some(audio) => {
                audio
                    .retarget(self.status.current().await.map(|m| m.id))
                    .await;
                audio.start().await
            }
            None => warn!("Cannot start transcription - no transcription provider configured"),
        }
    }

    async fn stop_audio(&self) {
        if let Some(audio) = &self.audio {
            audio.stop().await;
        }
    }

    fn spawn_batch(self: &Arc<Self>, batch: AudioBatch) {
        let Some(transcriber) = self.transcriber.clone() else {
            return;
        };
        let service = self.clone();
        tokio::spawn(async move {
            match transcriber
                .transcribe_samples(&batch.samples, batch.sample_rate)
                .await
            {
                Ok(entries) => service.append_transcripts(batch.meeting_id, entries).await,
                Err(e) => error!("Failed to transcribe audio: {}", e),
            }
        });
    }

    async fn spawn_recording(self: &Arc<Self>, data: String, mime_type: String) {
        let Some(target) = self.status.current().await.map(|m| m.id) else {
            debug!("Ignoring recording received outside a meeting");
            return;
        };
        let Some(transcriber) = self.transcriber.clone() else {
            warn!("Cannot transcribe recording - no transcription provider configured");
            return;
        };

        let bytes = match decode_data_url(&data) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to process recording: {}", e);
                return;
            }
        };

        let service = self.clone();
        tokio::spawn(async move {
            match transcriber.transcribe_recording(bytes, &mime_type).await {
                Ok(entries) => service.append_transcripts(Some(target), entries).await,
                Err(e) => error!("Failed to transcribe recording: {}", e),
            }
        });
    }

    async fn append_transcripts(&self, target: Option<String>, entries: Vec<TranscriptEntry>) {
        if entries.is_empty() {
            return;
        }
        let Some(target) = target else {
            warn!("Dropping {} transcript segments with no meeting", entries.len());
            return;
        };
        let count = entries.len();
        match self
            .status
            .with_meeting(&target, |m| m.extend_transcripts(entries))
            .await
        {
            Some(()) => info!("Added {} transcript segments to meeting {}", count, target),
            None => warn!("Meeting {} vanished before transcripts arrived", target),
        }
    }
}

async fn next_batch(batches: &mut Option<mpsc::UnboundedReceiver<AudioBatch>>) -> Option<AudioBatch> {
    match batches {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl MeetingBackend for ExtensionMeetService {
    fn name(&self) -> &'static str {
        "extension"
    }

    async fn join_meeting(&self, url: &str, display_name: Option<&str>) -> MeetResult<Meeting> {
        let meet_url = self.urls.parse(url)?;
        self.status.ensure_idle().await?;
        self.require_extension().await?;

        info!("Asking extension to join {}", meet_url.url);
        self.hub.broadcast(BridgeCommand::JoinMeeting {
            meeting_url: meet_url.url.clone(),
            display_name: display_name.map(str::to_string),
        });
        self.start_audio().await;

        let code = meet_url.code.to_ascii_lowercase();
        let joined = self
            .status
            .wait_for_current(self.join_timeout, |m| {
                m.meeting_code.eq_ignore_ascii_case(&code) || m.id.eq_ignore_ascii_case(&code)
            })
            .await;

        match joined {
            Ok(meeting) => Ok(meeting),
            Err(e) => {
                warn!("Join of {} failed: {}", meet_url.url, e);
                self.stop_audio().await;
                Err(e)
            }
        }
    }

    async fn leave_meeting(&self) -> MeetResult<Meeting> {
        if self.status.current().await.is_none() {
            return Err(MeetError::NotInMeeting);
        }

        self.stop_audio().await;
        self.hub.broadcast(BridgeCommand::LeaveMeeting);

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
        Ok(self
            .status
            .current()
            .await
            .map(|m| m.participants)
            .unwrap_or_default())
    }

    async fn transcripts(&self) -> MeetResult<Vec<TranscriptEntry>> {
        Ok(self
            .status
            .current()
            .await
            .map(|m| m.transcripts)
            .unwrap_or_default())
    }

    async fn meetings(&self) -> Vec<Meeting> {
        self.status.meetings().await
    }

    async fn meeting(&self, id: &str) -> Option<Meeting> {
        self.status.meeting(id).await
    }

    async fn control(&self, control: MeetingControl) -> MeetResult<()> {
        self.require_extension().await?;
        let command = BridgeCommand::from(control);
        info!("Sending {:?} to extension", command);
        self.hub.broadcast(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::ParticipantInfo;
    use crate::transcription::{AudioPayload, TranscribedSegment, TranscriptionProvider};
    use chrono::Duration as ChronoDuration;
    use std::future::Future;
    use std::pin::Pin;

    fn service() -> Arc<ExtensionMeetService> {
        service_with(None)
    }

    struct Echo;

    impl TranscriptionProvider for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn transcribe<'a>(
            &'a self,
            _audio: &'a AudioPayload,
            _language: &'a str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<TranscribedSegment>>> + Send + 'a>>
        {
            Box::pin(async {
                Ok(vec![TranscribedSegment {
                    text: "heard".into(),
                    start: 0.0,
                    end: 1.0,
                    avg_logprob: None,
                }])
            })
        }
    }

    fn transcribing_service() -> Arc<ExtensionMeetService> {
        service_with(Some(Transcriber::from_provider(Box::new(Echo), "en")))
    }

    /// Transcribe every flushed batch and wait for the entries to land.
    async fn drain_batches(svc: &Arc<ExtensionMeetService>) {
        let mut rx = svc.batches.lock().await.take().unwrap();
        let mut expected = 0;
        while let Ok(batch) = rx.try_recv() {
            expected += 1;
            svc.spawn_batch(batch);
        }
        for _ in 0..200 {
            let landed: usize = svc.meetings().await.iter().map(|m| m.transcripts.len()).sum();
            if landed >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        *svc.batches.lock().await = Some(rx);
    }

    async fn chunk(svc: &Arc<ExtensionMeetService>) {
        svc.apply_event(ExtensionEvent::AudioChunk {
            data: vec![0.1; 160],
            sample_rate: 16_000,
            timestamp: Utc::now(),
        })
        .await;
    }

    fn texts(meeting: &Meeting) -> Vec<&str> {
        meeting.transcripts.iter().map(|t| t.text.as_str()).collect()
    }

    fn service_with(transcriber: Option<Transcriber>) -> Arc<ExtensionMeetService> {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let hub = BridgeHub::new(events_tx);
        let settings = ExtensionSettings {
            join_timeout: Duration::from_millis(100),
            buffer: BufferSettings {
                flush_interval: Duration::from_secs(30),
                max_buffered_seconds: 60,
            },
        };
        Arc::new(ExtensionMeetService::new(
            hub,
            MeetUrlParser::new().unwrap(),
            transcriber,
            settings,
        ))
    }

    fn joined(id: &str) -> ExtensionEvent {
        ExtensionEvent::MeetingJoined {
            meeting_id: id.to_string(),
            meeting_url: format!("https://meet.google.com/{}?authuser=0", id),
            timestamp: Utc::now(),
        }
    }

    fn person(id: &str, name: &str) -> ParticipantInfo {
        ParticipantInfo {
            id: id.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn test_join_validates_url_before_anything_else() {
        let svc = service();
        let err = svc.join_meeting("https://example.com/abc", None).await.unwrap_err();
        assert!(matches!(err, MeetError::InvalidMeetUrl(_)));
    }

    #[tokio::test]
    async fn test_join_without_extension_fails_fast() {
        let svc = service();
        let err = svc
            .join_meeting("https://meet.google.com/abc-defg-hij", Some("Agent"))
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::ExtensionNotConnected));
        assert!(matches!(
            svc.control(MeetingControl::Mute).await,
            Err(MeetError::ExtensionNotConnected)
        ));
    }

    #[tokio::test]
    async fn test_event_lifecycle() {
        let svc = service();
        let t0 = Utc::now();
        svc.apply_event(joined("abc-defg-hij")).await;

        let current = svc.current_meeting().await.unwrap();
        assert_eq!(current.status, MeetingStatus::Active);
        assert_eq!(current.meeting_code, "abc-defg-hij");

        svc.apply_event(ExtensionEvent::ParticipantJoined {
            participant: person("p1", "Ann"),
            timestamp: t0,
        })
        .await;
        svc.apply_event(ExtensionEvent::Transcript {
            speaker: "Ann".into(),
            text: "Morning all".into(),
            timestamp: t0 + ChronoDuration::seconds(5),
        })
        .await;
        svc.apply_event(ExtensionEvent::Transcript {
            speaker: "Ann".into(),
            text: "Out of order".into(),
            timestamp: t0,
        })
        .await;
        svc.apply_event(ExtensionEvent::ParticipantLeft {
            participant: person("p1", "Ann"),
            timestamp: t0 - ChronoDuration::seconds(10),
        })
        .await;

        let transcripts = svc.transcripts().await.unwrap();
        assert_eq!(transcripts.len(), 2);
        assert_eq!(transcripts[0].confidence, 1.0);
        assert!(transcripts[1].timestamp >= transcripts[0].timestamp);

        let participants = svc.participants().await.unwrap();
        assert_eq!(participants[0].left_at, Some(t0));

        let summary = svc.meeting_summary().await;
        assert!(summary.contains("- Participants: 1"));
        assert!(summary.contains("Ann: Morning all"));

        svc.apply_event(ExtensionEvent::MeetingLeft {
            meeting_id: "other".into(),
            timestamp: Utc::now(),
        })
        .await;
        assert!(svc.current_meeting().await.is_some());

        svc.apply_event(ExtensionEvent::MeetingLeft {
            meeting_id: "abc-defg-hij".into(),
            timestamp: Utc::now(),
        })
        .await;
        assert!(svc.current_meeting().await.is_none());
        assert_eq!(svc.meeting_summary().await, "No active meeting.");

        let all = svc.meetings().await;
        assert_eq!(all.len(), 1);
        assert!(all[0].ended_at.unwrap() >= all[0].started_at);
    }

    #[tokio::test]
    async fn test_events_without_meeting_are_ignored() {
        let svc = service();
        svc.apply_event(ExtensionEvent::Transcript {
            speaker: "Ghost".into(),
            text: "hello?".into(),
            timestamp: Utc::now(),
        })
        .await;
        svc.apply_event(ExtensionEvent::AudioChunk {
            data: vec![0.0; 4],
            sample_rate: 16_000,
            timestamp: Utc::now(),
        })
        .await;
        assert!(svc.meetings().await.is_empty());
        assert!(svc.transcripts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leave_ends_meeting_locally() {
        let svc = service();
        assert!(matches!(
            svc.leave_meeting().await,
            Err(MeetError::NotInMeeting)
        ));

        svc.apply_event(joined("abc-defg-hij")).await;
        let ended = svc.leave_meeting().await.unwrap();
        assert_eq!(ended.status, MeetingStatus::Ended);
        assert!(ended.ended_at.unwrap() >= ended.started_at);

        // A late MEETING_LEFT from the extension changes nothing.
        svc.apply_event(ExtensionEvent::MeetingLeft {
            meeting_id: "abc-defg-hij".into(),
            timestamp: Utc::now(),
        })
        .await;
        assert_eq!(svc.meetings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_is_unsupported() {
        let svc = service();
        let err = svc
            .create_meeting(None, Some(crate::google::AccessType::Open))
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::Unsupported(_, "extension")));
    }

    #[tokio::test]
    async fn test_audio_buffered_before_leave_stays_with_that_meeting() {
        let svc = transcribing_service();
        svc.apply_event(joined("aaa-bbbb-ccc")).await;
        svc.start_audio().await;
        chunk(&svc).await;

        svc.apply_event(ExtensionEvent::MeetingLeft {
            meeting_id: "aaa-bbbb-ccc".into(),
            timestamp: Utc::now(),
        })
        .await;
        svc.start_audio().await;
        svc.apply_event(joined("ddd-eeee-fff")).await;

        drain_batches(&svc).await;

        let first = svc.meeting("aaa-bbbb-ccc").await.unwrap();
        let second = svc.meeting("ddd-eeee-fff").await.unwrap();
        assert_eq!(texts(&first), vec!["heard"]);
        assert!(second.transcripts.is_empty());
    }

    #[tokio::test]
    async fn test_replacing_meeting_flushes_audio_to_the_old_one() {
        let svc = transcribing_service();
        svc.apply_event(joined("aaa-bbbb-ccc")).await;
        svc.start_audio().await;
        chunk(&svc).await;

        // Second MEETING_JOINED with no MEETING_LEFT in between.
        svc.apply_event(joined("ddd-eeee-fff")).await;
        chunk(&svc).await;
        svc.stop_audio().await;

        drain_batches(&svc).await;

        let first = svc.meeting("aaa-bbbb-ccc").await.unwrap();
        let second = svc.meeting("ddd-eeee-fff").await.unwrap();
        assert_eq!(first.status, MeetingStatus::Ended);
        assert_eq!(texts(&first), vec!["heard"]);
        assert_eq!(texts(&second), vec!["heard"]);
    }
}
