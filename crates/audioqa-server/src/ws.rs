//! WebSocket handler for analysis progress push
//!
//! Clients connect to /api/v1/ws to receive progress events while the
//! analysis thread is busy. Each event is a JSON object
//! `{"percent": 25, "message": "Running SigMOS..."}`.

use crate::AppState;
use audioqa_core::analysis::{Progress, ProgressSink};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Progress fan-out from the analysis thread to WebSocket clients
///
/// Remembers the latest event so late joiners see where the run is.
#[derive(Clone)]
pub struct ProgressFeed {
    tx: broadcast::Sender<String>,
    last: Arc<Mutex<Option<Progress>>>,
}

impl ProgressFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Latest event of the current run, if any
    pub fn last(&self) -> Option<Progress> {
        self.last.lock().ok()?.clone()
    }

    /// Forget the last event (new upload or cleared session)
    pub fn clear(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }
}

impl Default for ProgressFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressFeed {
    fn report(&self, progress: Progress) {
        tracing::debug!(percent = progress.percent, message = %progress.message, "Progress");

        let json = serde_json::to_string(&progress).ok();
        if let Ok(mut last) = self.last.lock() {
            *last = Some(progress);
        }

        if self.tx.receiver_count() == 0 {
            return;
        }
        if let Some(json) = json {
            let _ = self.tx.send(json);
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Subscribe before reading the last event so nothing falls in between
    let mut rx = state.progress.subscribe();

    if let Some(json) = state
        .progress
        .last()
        .and_then(|p| serde_json::to_string(&p).ok())
    {
        let _ = ws_sender.send(Message::Text(json.into())).await;
    }

    // Spawn task to forward broadcast messages to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "WebSocket client lagging, skipped progress events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Spawn task to handle incoming messages (pings, close)
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::debug!("WebSocket client disconnected");
}
