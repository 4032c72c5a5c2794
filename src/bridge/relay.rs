//! Background-worker side of the extension bridge.
//!
//! The relay sits next to the browser. It holds a WebSocket connection to
//! the hub, turns hub commands into tab requests for the browser, and turns
//! content-script messages into hub envelopes. The browser end is a pair of
//! channels: [`BrowserEvent`]s in, [`TabRequest`]s out.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{BridgeCommand, ExtensionEvent, HubFrame, HubNotice, ParticipantInfo};
use crate::meeting::url::MEET_HOST;

pub type TabId = i64;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub hub_url: String,
    pub reconnect_delay: Duration,
    /// Wait after a tab finishes loading before touching the page.
    pub page_ready_delay: Duration,
    /// Wait between setting the display name and clicking join.
    pub join_click_delay: Duration,
}

impl RelaySettings {
    pub fn for_port(port: u16) -> Self {
        Self {
            hub_url: format!("ws://127.0.0.1:{}", port),
            ..Self::default()
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            hub_url: "ws://127.0.0.1:8765".to_string(),
            reconnect_delay: Duration::from_secs(5),
            page_ready_delay: Duration::from_secs(3),
            join_click_delay: Duration::from_secs(1),
        }
    }
}

/// A meeting tab the relay opened.
#[derive(Debug, Clone, PartialEq)]
pub struct TabSession {
    pub meeting_url: String,
    pub opened_at: DateTime<Utc>,
    pub auto_join: bool,
    pub display_name: Option<String>,
}

/// Messages the content script in a meeting tab sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentMessage {
    #[serde(rename_all = "camelCase")]
    MeetingJoined { meeting_id: String },
    #[serde(rename_all = "camelCase")]
    MeetingLeft { meeting_id: String },
    ParticipantJoined { participant: ParticipantInfo },
    ParticipantLeft { participant: ParticipantInfo },
    TranscriptUpdate { speaker: String, text: String },
    #[serde(rename_all = "camelCase")]
    AudioData { data: Vec<f32>, sample_rate: u32 },
    #[serde(rename_all = "camelCase")]
    RecordingComplete { data: String, mime_type: String },
}

/// What the browser reports to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BrowserEvent {
    #[serde(rename_all = "camelCase")]
    TabOpened { tab_id: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    TabLoaded { tab_id: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    Content {
        tab_id: TabId,
        tab_url: String,
        message: ContentMessage,
    },
}

/// Instructions for the browser or a content script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabDirective {
    OpenTab { url: String },
    CloseTab,
    HubConnected,
    ToggleMic { mute: bool },
    ToggleCamera { enable: bool },
    GetParticipants,
    StartCapture,
    StopCapture,
    #[serde(rename_all = "camelCase")]
    SetDisplayName { display_name: String },
    ClickJoinButton,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TabTarget {
    /// The browser itself, for opening tabs.
    Browser,
    /// The focused meeting tab.
    Active,
    /// Every open meeting tab.
    MeetTabs,
    Tab(TabId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRequest {
    pub target: TabTarget,
    pub directive: TabDirective,
}

impl TabRequest {
    fn new(target: TabTarget, directive: TabDirective) -> Self {
        Self { target, directive }
    }
}

#[derive(Default)]
struct RelayState {
    tabs: HashMap<TabId, TabSession>,
    /// Joins requested by the hub whose tab the browser has not reported yet.
    pending_joins: VecDeque<(String, Option<String>)>,
}

pub struct Relay {
    settings: RelaySettings,
    state: Mutex<RelayState>,
    tabs: mpsc::UnboundedSender<TabRequest>,
    dropped: AtomicU64,
}

type HubStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type HubSink = SplitSink<HubStream, Message>;

impl Relay {
    pub fn new(settings: RelaySettings, tabs: mpsc::UnboundedSender<TabRequest>) -> Arc<Self> {
        Arc::new(Self {
            settings,
            state: Mutex::new(RelayState::default()),
            tabs,
            dropped: AtomicU64::new(0),
        })
    }

    /// Envelopes discarded because the hub was unreachable.
    pub fn dropped_envelopes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn tab_session(&self, tab_id: TabId) -> Option<TabSession> {
        self.state.lock().await.tabs.get(&tab_id).cloned()
    }

    /// Stay connected to the hub until `shutdown`, reconnecting after each drop.
    pub async fn run(
        self: Arc<Self>,
        mut browser: mpsc::UnboundedReceiver<BrowserEvent>,
        shutdown: CancellationToken,
    ) {
        info!("Relay starting, hub at {}", self.settings.hub_url);

        while !shutdown.is_cancelled() {
            match connect_async(self.settings.hub_url.as_str()).await {
                Ok((stream, _)) => {
                    info!("Connected to hub");
                    self.send_tab(TabTarget::MeetTabs, TabDirective::HubConnected);
                    if let Err(e) = self.connected(stream, &mut browser, &shutdown).await {
                        warn!("Hub connection lost: {}", e);
                    } else {
                        info!("Disconnected from hub");
                    }
                }
                Err(e) => warn!("Failed to connect to hub: {}", e),
            }

            if shutdown.is_cancelled() {
                break;
            }

            debug!("Reconnecting in {:?}", self.settings.reconnect_delay);
            let retry = tokio::time::sleep(self.settings.reconnect_delay);
            tokio::pin!(retry);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = &mut retry => break,
                    event = browser.recv() => match event {
                        Some(event) => {
                            if let Some(envelope) = self.handle_browser(event).await {
                                self.dropped.fetch_add(1, Ordering::Relaxed);
                                debug!("Hub unreachable, dropped {}", envelope.kind());
                            }
                        }
                        None => {
                            info!("Browser channel closed, relay exiting");
                            return;
                        }
                    },
                }
            }
        }

        info!("Relay stopped");
    }

    async fn connected(
        &self,
        stream: HubStream,
        browser: &mut mpsc::UnboundedReceiver<BrowserEvent>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let (mut sink, mut hub) = stream.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = hub.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_hub_text(&text).await,
                    Some(Ok(Message::Ping(data))) => sink.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                event = browser.recv() => match event {
                    Some(event) => {
                        if let Some(envelope) = self.handle_browser(event).await {
                            send_envelope(&mut sink, &envelope).await?;
                        }
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        shutdown.cancel();
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn handle_hub_text(&self, text: &str) {
        match serde_json::from_str::<HubFrame>(text) {
            Ok(HubFrame::Command(command)) => self.apply_command(command).await,
            Ok(HubFrame::Notice(HubNotice::ConnectionEstablished { client_id })) => {
                info!(%client_id, "Hub accepted connection");
            }
            Err(e) => warn!("Ignoring unrecognized hub frame: {}", e),
        }
    }

    /// Turn a hub command into tab requests.
    pub async fn apply_command(&self, command: BridgeCommand) {
        debug!("Hub command: {:?}", command);
        match command {
            BridgeCommand::JoinMeeting {
                meeting_url,
                display_name,
            } => {
                self.state
                    .lock()
                    .await
                    .pending_joins
                    .push_back((meeting_url.clone(), display_name));
                self.send_tab(TabTarget::Browser, TabDirective::OpenTab { url: meeting_url });
            }
            BridgeCommand::LeaveMeeting => self.send_tab(TabTarget::Active, TabDirective::CloseTab),
            BridgeCommand::MuteMicrophone => {
                self.send_tab(TabTarget::Active, TabDirective::ToggleMic { mute: true })
            }
            BridgeCommand::UnmuteMicrophone => {
                self.send_tab(TabTarget::Active, TabDirective::ToggleMic { mute: false })
            }
            BridgeCommand::TurnOffCamera => {
                self.send_tab(TabTarget::Active, TabDirective::ToggleCamera { enable: false })
            }
            BridgeCommand::TurnOnCamera => {
                self.send_tab(TabTarget::Active, TabDirective::ToggleCamera { enable: true })
            }
            BridgeCommand::GetParticipants => {
                self.send_tab(TabTarget::Active, TabDirective::GetParticipants)
            }
            BridgeCommand::StartRecording => {
                self.send_tab(TabTarget::Active, TabDirective::StartCapture)
            }
            BridgeCommand::StopRecording => self.send_tab(TabTarget::Active, TabDirective::StopCapture),
        }
    }

    /// Apply a browser event. Returns the envelope to forward to the hub, if any.
    pub async fn handle_browser(&self, event: BrowserEvent) -> Option<ExtensionEvent> {
        match event {
            BrowserEvent::TabOpened { tab_id, url } => {
                let mut state = self.state.lock().await;
                let position = state.pending_joins.iter().position(|(u, _)| *u == url);
                if let Some((meeting_url, display_name)) =
                    position.and_then(|i| state.pending_joins.remove(i))
                {
                    info!(tab_id, "Tracking meeting tab for {}", meeting_url);
                    state.tabs.insert(
                        tab_id,
                        TabSession {
                            meeting_url,
                            opened_at: Utc::now(),
                            auto_join: true,
                            display_name,
                        },
                    );
                }
                None
            }
            BrowserEvent::TabLoaded { tab_id, url } => {
                if url.contains(MEET_HOST) {
                    self.maybe_auto_join(tab_id).await;
                }
                None
            }
            BrowserEvent::TabRemoved { tab_id } => {
                let removed = self.state.lock().await.tabs.remove(&tab_id);
                removed.map(|_| ExtensionEvent::TabClosed { tab_id })
            }
            BrowserEvent::Content {
                tab_url, message, ..
            } => Some(envelope_for(message, tab_url, Utc::now())),
        }
    }

    async fn maybe_auto_join(&self, tab_id: TabId) {
        let display_name = {
            let mut state = self.state.lock().await;
            match state.tabs.get_mut(&tab_id) {
                Some(session) if session.auto_join => {
                    session.auto_join = false;
                    session.display_name.clone()
                }
                _ => return,
            }
        };

        let tabs = self.tabs.clone();
        let page_ready = self.settings.page_ready_delay;
        let join_click = self.settings.join_click_delay;
        tokio::spawn(async move {
            tokio::time::sleep(page_ready).await;
            if let Some(display_name) = display_name {
                let _ = tabs.send(TabRequest::new(
                    TabTarget::Tab(tab_id),
                    TabDirective::SetDisplayName { display_name },
                ));
            }
            tokio::time::sleep(join_click).await;
            info!(tab_id, "Clicking join");
            let _ = tabs.send(TabRequest::new(TabTarget::Tab(tab_id), TabDirective::ClickJoinButton));
        });
    }

    fn send_tab(&self, target: TabTarget, directive: TabDirective) {
        if self.tabs.send(TabRequest::new(target, directive)).is_err() {
            error!("Browser side gone, dropping tab request");
        }
    }
}

fn envelope_for(message: ContentMessage, tab_url: String, now: DateTime<Utc>) -> ExtensionEvent {
    match message {
        ContentMessage::MeetingJoined { meeting_id } => ExtensionEvent::MeetingJoined {
            meeting_id,
            meeting_url: tab_url,
            timestamp: now,
        },
        ContentMessage::MeetingLeft { meeting_id } => ExtensionEvent::MeetingLeft {
            meeting_id,
            timestamp: now,
        },
        ContentMessage::ParticipantJoined { participant } => ExtensionEvent::ParticipantJoined {
            participant,
            timestamp: now,
        },
        ContentMessage::ParticipantLeft { participant } => ExtensionEvent::ParticipantLeft {
            participant,
            timestamp: now,
        },
        ContentMessage::TranscriptUpdate { speaker, text } => ExtensionEvent::Transcript {
            speaker,
            text,
            timestamp: now,
        },
        ContentMessage::AudioData { data, sample_rate } => ExtensionEvent::AudioChunk {
            data,
            sample_rate,
            timestamp: now,
        },
        ContentMessage::RecordingComplete { data, mime_type } => {
            ExtensionEvent::RecordingComplete { data, mime_type }
        }
    }
}

async fn send_envelope(sink: &mut HubSink, envelope: &ExtensionEvent) -> Result<()> {
    let json = serde_json::to_string(envelope)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

/// Serve the relay over line-delimited JSON on stdin and stdout.
///
/// Each stdin line is a [`BrowserEvent`]; each stdout line is a [`TabRequest`].
pub async fn run_stdio(settings: RelaySettings, shutdown: CancellationToken) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let (tab_tx, mut tab_rx) = mpsc::unbounded_channel::<TabRequest>();
    let (browser_tx, browser_rx) = mpsc::unbounded_channel::<BrowserEvent>();
    let relay = Relay::new(settings, tab_tx);
    let relay_task = tokio::spawn(relay.run(browser_rx, shutdown.clone()));

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(request) = tab_rx.recv().await {
            let mut line = match serde_json::to_string(&request) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize tab request: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str::<BrowserEvent>(&line) {
                    Ok(event) => {
                        if browser_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed browser event: {}", e),
                },
                None => break,
            },
        }
    }

    drop(browser_tx);
    shutdown.cancel();
    let _ = relay_task.await;
    writer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(page_ready_ms: u64) -> (Arc<Relay>, mpsc::UnboundedReceiver<TabRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = RelaySettings {
            hub_url: "ws://127.0.0.1:9".into(),
            reconnect_delay: Duration::from_millis(50),
            page_ready_delay: Duration::from_millis(page_ready_ms),
            join_click_delay: Duration::from_millis(10),
        };
        (Relay::new(settings, tx), rx)
    }

    const URL: &str = "https://meet.google.com/abc-defg-hij";

    #[tokio::test]
    async fn test_commands_become_tab_requests() {
        let (relay, mut rx) = relay(10);
        relay.apply_command(BridgeCommand::MuteMicrophone).await;
        relay.apply_command(BridgeCommand::TurnOnCamera).await;
        relay.apply_command(BridgeCommand::StopRecording).await;
        relay.apply_command(BridgeCommand::LeaveMeeting).await;

        let got: Vec<_> = (0..4).map(|_| rx.try_recv().unwrap()).collect();
        assert_eq!(got[0], TabRequest::new(TabTarget::Active, TabDirective::ToggleMic { mute: true }));
        assert_eq!(got[1].directive, TabDirective::ToggleCamera { enable: true });
        assert_eq!(got[2].directive, TabDirective::StopCapture);
        assert_eq!(got[3].directive, TabDirective::CloseTab);
    }

    #[tokio::test]
    async fn test_auto_join_fires_once_per_tab() {
        let (relay, mut rx) = relay(10);
        relay
            .apply_command(BridgeCommand::JoinMeeting {
                meeting_url: URL.into(),
                display_name: Some("Agent".into()),
            })
            .await;
        assert_eq!(
            rx.recv().await.unwrap(),
            TabRequest::new(TabTarget::Browser, TabDirective::OpenTab { url: URL.into() })
        );

        relay
            .handle_browser(BrowserEvent::TabOpened {
                tab_id: 7,
                url: URL.into(),
            })
            .await;
        let session = relay.tab_session(7).await.unwrap();
        assert!(session.auto_join);
        assert_eq!(session.display_name.as_deref(), Some("Agent"));

        for _ in 0..3 {
            relay
                .handle_browser(BrowserEvent::TabLoaded {
                    tab_id: 7,
                    url: URL.into(),
                })
                .await;
        }
        assert!(!relay.tab_session(7).await.unwrap().auto_join);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            TabRequest::new(
                TabTarget::Tab(7),
                TabDirective::SetDisplayName {
                    display_name: "Agent".into()
                }
            )
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(second.directive, TabDirective::ClickJoinButton);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_untracked_tabs_are_left_alone() {
        let (relay, mut rx) = relay(0);
        relay
            .handle_browser(BrowserEvent::TabLoaded {
                tab_id: 3,
                url: URL.into(),
            })
            .await;
        assert!(relay
            .handle_browser(BrowserEvent::TabRemoved { tab_id: 3 })
            .await
            .is_none());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removing_tracked_tab_emits_tab_closed() {
        let (relay, _rx) = relay(10);
        relay
            .apply_command(BridgeCommand::JoinMeeting {
                meeting_url: URL.into(),
                display_name: None,
            })
            .await;
        relay
            .handle_browser(BrowserEvent::TabOpened {
                tab_id: 11,
                url: URL.into(),
            })
            .await;
        let closed = relay
            .handle_browser(BrowserEvent::TabRemoved { tab_id: 11 })
            .await;
        assert_eq!(closed, Some(ExtensionEvent::TabClosed { tab_id: 11 }));
        assert!(relay.tab_session(11).await.is_none());
    }

    #[tokio::test]
    async fn test_content_messages_are_stamped() {
        let (relay, _rx) = relay(10);
        let before = Utc::now();
        let envelope = relay
            .handle_browser(BrowserEvent::Content {
                tab_id: 1,
                tab_url: format!("{}?authuser=0", URL),
                message: ContentMessage::MeetingJoined {
                    meeting_id: "abc-defg-hij".into(),
                },
            })
            .await
            .unwrap();
        match envelope {
            ExtensionEvent::MeetingJoined {
                meeting_url,
                timestamp,
                ..
            } => {
                assert!(meeting_url.ends_with("?authuser=0"));
                assert!(timestamp >= before);
            }
            other => panic!("unexpected {:?}", other),
        }

        let transcript = relay
            .handle_browser(BrowserEvent::Content {
                tab_id: 1,
                tab_url: URL.into(),
                message: serde_json::from_str(
                    r#"{"type":"TRANSCRIPT_UPDATE","speaker":"Ann","text":"hi"}"#,
                )
                .unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(transcript.kind(), "TRANSCRIPT");
    }

    #[tokio::test]
    async fn test_envelopes_dropped_while_disconnected() {
        let (relay, _rx) = relay(10);
        let (browser_tx, browser_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(relay.clone().run(browser_rx, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        browser_tx
            .send(BrowserEvent::Content {
                tab_id: 1,
                tab_url: URL.into(),
                message: ContentMessage::TranscriptUpdate {
                    speaker: "Ann".into(),
                    text: "anyone there?".into(),
                },
            })
            .unwrap();

        let mut waited = 0;
        while relay.dropped_envelopes() == 0 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(relay.dropped_envelopes(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_browser_event_wire_format() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"event":"content","tabId":4,"tabUrl":"https://meet.google.com/abc-defg-hij",
                "message":{"type":"AUDIO_DATA","data":[0.5],"sampleRate":16000}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            BrowserEvent::Content {
                tab_id: 4,
                message: ContentMessage::AudioData { sample_rate: 16000, .. },
                ..
            }
        ));

        let request = TabRequest::new(TabTarget::Tab(4), TabDirective::ClickJoinButton);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"target": {"tab": 4}, "directive": {"type": "CLICK_JOIN_BUTTON"}})
        );
    }
}
