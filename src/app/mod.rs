use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::actions::MeetActions;
use crate::api::{ApiServer, ApiState};
use crate::bridge::{BridgeHub, ExtensionMeetService, ExtensionSettings};
use crate::config::{BackendStrategy, Config};
use crate::google::{ApiMeetService, GoogleAuth};
use crate::meeting::{MeetingBackend, MeetUrlParser};
use crate::transcription::Transcriber;

/// The active backend plus the background tasks keeping it alive.
pub struct RunningBackend {
    pub backend: Arc<dyn MeetingBackend>,
    pub auth: Option<Arc<GoogleAuth>>,
    pub tasks: Vec<JoinHandle<()>>,
}

pub async fn run_service() -> Result<()> {
    info!("Starting meet-agent service");

    let config = Config::load()?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let urls = MeetUrlParser::new()?;
    let running = start_backend(&config, urls.clone(), shutdown.clone()).await?;

    let actions = Arc::new(MeetActions::new(
        running.backend.clone(),
        running.auth.clone(),
        urls,
        config.agent.display_name.clone(),
    )?);
    let state = ApiState {
        backend: running.backend.clone(),
        actions,
        display_name: config.agent.display_name.clone(),
    };

    info!(
        "meet-agent is ready ({} backend). Try: meet-agent join https://meet.google.com/abc-defg-hij",
        running.backend.name()
    );

    let api_result = ApiServer::new(state, config.service.api_port)
        .start(shutdown.clone())
        .await;
    if let Err(e) = &api_result {
        error!("API server failed: {}", e);
    }

    shutdown.cancel();
    if let Some(meeting) = running.backend.current_meeting().await {
        info!("Leaving meeting {} before exit", meeting.id);
        if let Err(e) = running.backend.leave_meeting().await {
            warn!("Failed to leave meeting on shutdown: {}", e);
        }
    }
    for task in running.tasks {
        let _ = task.await;
    }

    info!("meet-agent stopped");
    api_result
}

/// Build the configured backend and spawn its background tasks.
pub async fn start_backend(
    config: &Config,
    urls: MeetUrlParser,
    shutdown: CancellationToken,
) -> Result<RunningBackend> {
    match config.service.strategy {
        BackendStrategy::Extension => start_extension(config, urls, shutdown).await,
        BackendStrategy::Api => {
            let service = Arc::new(ApiMeetService::new(&config.google, urls));
            if !service.auth().is_authenticated() {
                warn!("Google Meet API is not authenticated; run the authenticate action first");
            }
            Ok(RunningBackend {
                auth: Some(service.auth()),
                backend: service,
                tasks: Vec::new(),
            })
        }
    }
}

async fn start_extension(
    config: &Config,
    urls: MeetUrlParser,
    shutdown: CancellationToken,
) -> Result<RunningBackend> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let hub = BridgeHub::new(events_tx);
    let listener = BridgeHub::bind(config.extension.ws_port).await?;

    let transcriber = Transcriber::from_config(&config.transcription)?;
    if let Some(t) = &transcriber {
        info!("Audio transcription enabled ({})", t.provider_name());
    }

    let service = Arc::new(ExtensionMeetService::new(
        hub.clone(),
        urls,
        transcriber,
        ExtensionSettings::from(config),
    ));

    let hub_shutdown = shutdown.clone();
    let hub_task = tokio::spawn(async move {
        if let Err(e) = hub.serve(listener, hub_shutdown).await {
            error!("Extension bridge failed: {}", e);
        }
    });
    let service_task = tokio::spawn(service.clone().run(events_rx, shutdown));

    Ok(RunningBackend {
        backend: service,
        auth: None,
        tasks: vec![hub_task, service_task],
    })
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    });
}
