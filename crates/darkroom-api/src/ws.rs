//! WebSocket bridge from the queue event stream to UI clients.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use darkroom_models::QueueEvent;

use crate::metrics;
use crate::state::AppState;

const ENDPOINT: &str = "events";

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 64;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// GET /ws/events
pub async fn ws_events(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    metrics::record_ws_connection(ENDPOINT);
    ws.on_upgrade(move |socket| handle_event_socket(socket, state))
}

async fn handle_event_socket(socket: WebSocket, state: AppState) {
    let active = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(active);
    info!(active, "Event stream client connected");

    // Subscribe before anything else so no event between upgrade and loop is lost.
    let mut events = state.queue.subscribe();
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        last_activity = Instant::now();
                        if !send_event(&tx, &event).await {
                            debug!("Event stream send failed, client disconnected");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event stream client lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_HEARTBEAT_INTERVAL / 2
                    && tx.send(Message::Ping(Vec::new())).await.is_err()
                {
                    warn!("Heartbeat failed, client disconnected");
                    break;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        info!("Event stream client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        last_activity = Instant::now();
                    }
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;

    let active = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
    metrics::set_ws_active_connections(active);
}

async fn send_event(tx: &mpsc::Sender<Message>, event: &QueueEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.event_type(), e);
            return true;
        }
    };
    metrics::record_ws_message_sent(ENDPOINT, event.event_type());
    match tx.try_send(Message::Text(json)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
