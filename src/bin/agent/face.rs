use anyhow::{Result, anyhow};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use nlbrowse::ExecutionResult;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

const PORT_ATTEMPTS: u16 = 10;

/// Events streamed to clients via SSE.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Received {
        command: String,
    },
    Step {
        number: usize,
        success: bool,
        message: String,
        artifact: Option<Value>,
    },
    SessionLost {
        message: String,
    },
    Ready,
}

impl EngineEvent {
    pub fn step(number: usize, result: ExecutionResult) -> Self {
        EngineEvent::Step {
            number,
            success: result.success,
            message: result.message,
            artifact: result.artifact,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            EngineEvent::Received { .. } => "received",
            EngineEvent::Step { .. } => "step",
            EngineEvent::SessionLost { .. } => "session_lost",
            EngineEvent::Ready => "ready",
        }
    }

    fn to_sse_event(&self) -> Event {
        let data = match self {
            EngineEvent::Received { command } => serde_json::json!({ "command": command }),
            EngineEvent::Step {
                number,
                success,
                message,
                artifact,
            } => serde_json::json!({
                "number": number,
                "success": success,
                "message": message,
                "artifact": artifact,
            }),
            EngineEvent::SessionLost { message } => serde_json::json!({ "message": message }),
            EngineEvent::Ready => serde_json::json!({}),
        };
        Event::default().event(self.name()).data(data.to_string())
    }
}

#[derive(Clone)]
struct AppState {
    cmd_tx: mpsc::Sender<String>,
    event_tx: broadcast::Sender<EngineEvent>,
}

#[derive(Deserialize)]
struct CommandPayload {
    command: String,
}

/// Bind the first free port from `port` upward and serve in the background.
pub async fn start_server(
    port: u16,
) -> Result<(mpsc::Receiver<String>, broadcast::Sender<EngineEvent>)> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<String>(8);
    let (event_tx, _) = broadcast::channel::<EngineEvent>(64);

    let state = Arc::new(AppState {
        cmd_tx,
        event_tx: event_tx.clone(),
    });

    let app = Router::new()
        .route("/command", post(command_handler))
        .route("/events", get(sse_handler))
        .with_state(state);

    let mut bound = None;
    for p in port..port.saturating_add(PORT_ATTEMPTS) {
        if let Ok(listener) = tokio::net::TcpListener::bind(("127.0.0.1", p)).await {
            bound = Some((listener, p));
            break;
        }
    }
    let (listener, port) = bound.ok_or_else(|| {
        anyhow!(
            "Could not bind to any port {}-{}",
            port,
            port.saturating_add(PORT_ATTEMPTS - 1)
        )
    })?;

    info!("[Web] Listening on http://localhost:{}", port);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("[Web] Server stopped: {}", e);
        }
    });

    Ok((cmd_rx, event_tx))
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CommandPayload>,
) -> StatusCode {
    let command = payload.command.trim().to_string();
    if command.is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    info!("[Web] POST /command: {}", command);
    match state.cmd_tx.send(command).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
