//! End-to-end run of the extension backend: hub, meeting service and relay on
//! loopback, with a scripted browser answering tab requests.

use std::sync::Arc;
use std::time::Duration;

use meet_agent::bridge::protocol::ParticipantInfo;
use meet_agent::bridge::relay::{BrowserEvent, ContentMessage, TabDirective, TabRequest};
use meet_agent::bridge::{BridgeHub, ExtensionMeetService, ExtensionSettings, Relay, RelaySettings};
use meet_agent::error::MeetError;
use meet_agent::meeting::{MeetingBackend, MeetingControl, MeetingStatus, MeetUrlParser};
use meet_agent::transcription::BufferSettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MEETING_URL: &str = "https://meet.google.com/abc-defg-hij";

struct Harness {
    service: Arc<ExtensionMeetService>,
    hub: BridgeHub,
    browser: mpsc::UnboundedSender<BrowserEvent>,
    requests: mpsc::UnboundedReceiver<TabRequest>,
    shutdown: CancellationToken,
}

async fn start(join_timeout: Duration) -> Harness {
    let shutdown = CancellationToken::new();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let hub = BridgeHub::new(events_tx);
    let listener = BridgeHub::bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(hub.clone().serve(listener, shutdown.clone()));

    let service = Arc::new(ExtensionMeetService::new(
        hub.clone(),
        MeetUrlParser::new().unwrap(),
        None,
        ExtensionSettings {
            join_timeout,
            buffer: BufferSettings {
                flush_interval: Duration::from_secs(30),
                max_buffered_seconds: 60,
            },
        },
    ));
    tokio::spawn(service.clone().run(events_rx, shutdown.clone()));

    let (tab_tx, requests) = mpsc::unbounded_channel();
    let (browser, browser_rx) = mpsc::unbounded_channel();
    let relay = Relay::new(
        RelaySettings {
            hub_url: format!("ws://127.0.0.1:{}", port),
            reconnect_delay: Duration::from_millis(50),
            page_ready_delay: Duration::from_millis(20),
            join_click_delay: Duration::from_millis(10),
        },
        tab_tx,
    );
    tokio::spawn(relay.run(browser_rx, shutdown.clone()));

    for _ in 0..200 {
        if hub.connected_clients().await > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.connected_clients().await, 1, "relay never connected");

    Harness {
        service,
        hub,
        browser,
        requests,
        shutdown,
    }
}

/// Answer tab requests the way a Meet tab would.
fn spawn_browser(
    mut requests: mpsc::UnboundedReceiver<TabRequest>,
    browser: mpsc::UnboundedSender<BrowserEvent>,
) -> mpsc::UnboundedReceiver<TabDirective> {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let _ = seen_tx.send(request.directive.clone());
            match request.directive {
                TabDirective::OpenTab { url } => {
                    let _ = browser.send(BrowserEvent::TabOpened {
                        tab_id: 1,
                        url: url.clone(),
                    });
                    let _ = browser.send(BrowserEvent::TabLoaded { tab_id: 1, url });
                }
                TabDirective::ClickJoinButton => {
                    let _ = browser.send(BrowserEvent::Content {
                        tab_id: 1,
                        tab_url: MEETING_URL.to_string(),
                        message: ContentMessage::MeetingJoined {
                            meeting_id: "abc-defg-hij".to_string(),
                        },
                    });
                }
                TabDirective::CloseTab => {
                    let _ = browser.send(BrowserEvent::TabRemoved { tab_id: 1 });
                }
                _ => {}
            }
        }
    });
    seen_rx
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_join_transcribe_leave_over_loopback() {
    let Harness {
        service,
        hub: _hub,
        browser,
        requests,
        shutdown,
    } = start(Duration::from_secs(5)).await;
    let mut seen = spawn_browser(requests, browser.clone());

    let meeting = service
        .join_meeting(MEETING_URL, Some("Meet Agent"))
        .await
        .unwrap();
    assert_eq!(meeting.status, MeetingStatus::Active);
    assert_eq!(meeting.meeting_code, "abc-defg-hij");

    let mut directives = Vec::new();
    while let Ok(directive) = seen.try_recv() {
        directives.push(directive);
    }
    assert!(directives.contains(&TabDirective::SetDisplayName {
        display_name: "Meet Agent".into()
    }));
    assert_eq!(
        directives
            .iter()
            .filter(|d| **d == TabDirective::ClickJoinButton)
            .count(),
        1
    );

    browser
        .send(BrowserEvent::Content {
            tab_id: 1,
            tab_url: MEETING_URL.into(),
            message: ContentMessage::ParticipantJoined {
                participant: ParticipantInfo {
                    id: "p1".into(),
                    name: "Ann".into(),
                },
            },
        })
        .unwrap();
    browser
        .send(BrowserEvent::Content {
            tab_id: 1,
            tab_url: MEETING_URL.into(),
            message: ContentMessage::TranscriptUpdate {
                speaker: "Ann".into(),
                text: "Shall we start?".into(),
            },
        })
        .unwrap();

    eventually(|| {
        let service = service.clone();
        async move { !service.transcripts().await.unwrap().is_empty() }
    })
    .await;
    assert_eq!(service.participants().await.unwrap()[0].name, "Ann");
    assert!(service.meeting_summary().await.contains("Ann: Shall we start?"));

    service.control(MeetingControl::Mute).await.unwrap();
    eventually(|| {
        let found = std::iter::from_fn(|| seen.try_recv().ok())
            .any(|d| d == TabDirective::ToggleMic { mute: true });
        async move { found }
    })
    .await;

    let ended = service.leave_meeting().await.unwrap();
    assert_eq!(ended.status, MeetingStatus::Ended);
    assert!(ended.ended_at.unwrap() >= ended.started_at);
    assert!(service.current_meeting().await.is_none());
    assert_eq!(service.meetings().await.len(), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn test_join_times_out_without_meeting_joined() {
    let Harness {
        service,
        hub,
        browser: _browser,
        mut requests,
        shutdown,
    } = start(Duration::from_millis(200)).await;

    // Swallow tab requests so the page never reports MEETING_JOINED.
    tokio::spawn(async move { while requests.recv().await.is_some() {} });

    let err = service.join_meeting(MEETING_URL, None).await.unwrap_err();
    assert!(matches!(err, MeetError::JoinTimeout(_)));
    assert!(service.current_meeting().await.is_none());
    assert_eq!(hub.connected_clients().await, 1);

    shutdown.cancel();
}

#[tokio::test]
async fn test_join_without_relay_fails_fast() {
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let hub = BridgeHub::new(events_tx);
    let service = ExtensionMeetService::new(
        hub,
        MeetUrlParser::new().unwrap(),
        None,
        ExtensionSettings {
            join_timeout: Duration::from_secs(5),
            buffer: BufferSettings {
                flush_interval: Duration::from_secs(30),
                max_buffered_seconds: 60,
            },
        },
    );

    let started = std::time::Instant::now();
    let err = service.join_meeting(MEETING_URL, None).await.unwrap_err();
    assert!(matches!(err, MeetError::ExtensionNotConnected));
    assert!(started.elapsed() < Duration::from_secs(1));
}
