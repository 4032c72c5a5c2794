use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::{BridgeCommand, ExtensionEvent, HubNotice};

struct HubState {
    commands: broadcast::Sender<BridgeCommand>,
    events: mpsc::UnboundedSender<ExtensionEvent>,
    clients: Mutex<HashSet<Uuid>>,
}

/// WebSocket endpoint the browser extension connects to.
///
/// Commands are broadcast to every connected client; events from any client
/// are forwarded to a single channel.
#[derive(Clone)]
pub struct BridgeHub {
    state: Arc<HubState>,
}

impl BridgeHub {
    pub fn new(events: mpsc::UnboundedSender<ExtensionEvent>) -> Self {
        let (commands, _) = broadcast::channel(64);
        Self {
            state: Arc::new(HubState {
                commands,
                events,
                clients: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Send `command` to every connected client. Returns how many were reached.
    pub fn broadcast(&self, command: BridgeCommand) -> usize {
        match self.state.commands.send(command) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(command)) => {
                debug!("No extension connected, dropped {:?}", command);
                0
            }
        }
    }

    pub async fn connected_clients(&self) -> usize {
        self.state.clients.lock().await.len()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
    }

    /// Bind the loopback listener. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<TcpListener> {
        let addr = format!("127.0.0.1:{}", port);
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind extension bridge on {}", addr))
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(%addr, "Extension bridge listening on ws://{}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Extension bridge stopped");
        Ok(())
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<HubState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<HubState>) {
    let client_id = Uuid::new_v4();
    let mut commands = state.commands.subscribe();
    state.clients.lock().await.insert(client_id);
    info!(%client_id, "Browser extension connected");

    let greeting = HubNotice::ConnectionEstablished {
        client_id: client_id.to_string(),
    };
    match serde_json::to_string(&greeting) {
        Ok(json) => {
            if socket.send(Message::Text(json)).await.is_err() {
                warn!(%client_id, "Failed to greet extension");
            }
        }
        Err(e) => error!("Failed to serialize greeting: {}", e),
    }

    loop {
        tokio::select! {
            result = commands.recv() => {
                match result {
                    Ok(command) => {
                        let json = match serde_json::to_string(&command) {
                            Ok(j) => j,
                            Err(e) => {
                                error!("Failed to serialize command: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json)).await.is_err() {
                            info!(%client_id, "Extension disconnected (send failed)");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%client_id, skipped = n, "Extension lagging behind, skipped commands");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => forward_event(&state, client_id, &text),
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%client_id, "Browser extension disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%client_id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    state.clients.lock().await.remove(&client_id);
}

fn forward_event(state: &HubState, client_id: Uuid, text: &str) {
    match serde_json::from_str::<ExtensionEvent>(text) {
        Ok(event) => {
            debug!(%client_id, kind = event.kind(), "Extension event");
            if state.events.send(event).is_err() {
                warn!("Event consumer gone, dropping extension event");
            }
        }
        Err(e) => warn!(%client_id, "Dropping malformed extension message: {}", e),
    }
}
