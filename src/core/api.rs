//! HTTP + WebSocket status monitor
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /status - Latest loop status
//! - GET /events?limit=N - Most recent journal lines
//! - WS /ws - Live journal lines

use axum::{
    extract::{ws::{Message, WebSocket}, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::core::journal::MemoryJournal;
use crate::types::{EventRecord, LoopStatus, Phase};

/// Default number of lines returned by /events
const DEFAULT_EVENT_LIMIT: usize = 100;

/// What the monitor reads from
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub status: watch::Receiver<LoopStatus>,
    pub journal: MemoryJournal,
}

impl MonitorState {
    pub fn new(status: watch::Receiver<LoopStatus>, journal: MemoryJournal) -> Self {
        Self { status, journal }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub phase: Phase,
    pub loop_alive: bool,
}

/// Events query
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// Events response
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    /// Records seen since the session started
    pub total: usize,
    pub events: Vec<EventRecord>,
}

/// Create the monitor router
pub fn create_router(state: MonitorState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/events", get(events))
        .route("/ws", get(websocket_handler))
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health(State(state): State<Arc<MonitorState>>) -> Json<HealthResponse> {
    let status = state.status.borrow();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        phase: status.phase,
        loop_alive: status.loop_alive,
    })
}

/// Latest published loop status
async fn status(State(state): State<Arc<MonitorState>>) -> Json<LoopStatus> {
    Json(state.status.borrow().clone())
}

/// Tail of the journal
async fn events(
    State(state): State<Arc<MonitorState>>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Json(EventsResponse {
        total: state.journal.total(),
        events: state.journal.recent(limit),
    })
}

/// WebSocket handler for live journal lines
async fn websocket_handler(
    State(state): State<Arc<MonitorState>>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let rx = state.journal.subscribe().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward journal lines until the client leaves
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<EventRecord>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            record = rx.recv() => match record {
                Ok(record) => {
                    let json = serde_json::to_string(&record).unwrap_or_default();
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                // Slow client: skip what it missed
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Run the monitor server
pub async fn run_server(addr: &str, state: MonitorState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status monitor listening");
    info!("  GET  /health  - Health check");
    info!("  GET  /status  - Loop status");
    info!("  GET  /events  - Recent journal lines");
    info!("  WS   /ws      - Live journal lines");
    axum::serve(listener, router).await?;
    Ok(())
}
