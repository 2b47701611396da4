pub mod dispatcher;
pub mod server;
pub mod subscriber;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch};

pub use dispatcher::{Relay, MAX_QUEUED};
pub use server::RelayServer;
pub use subscriber::{ConnectionState, SubscriberId, Subscription};

use crate::vts::{SessionClient, SessionState};

/// State shared by every socket accepted on the relay port.
#[derive(Clone)]
pub struct RelayState {
    pub relay: Relay,
    pub session: SessionClient,
    pub shutdown: watch::Receiver<bool>,
}

/// Display surfaces connect at `/` (or `/ws`) for throws and at `/session`
/// for avatar session state.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/ws", get(ws_upgrade))
        .route("/session", get(session_upgrade))
        .with_state(state)
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

pub async fn session_upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_session_socket(socket, state.session, state.shutdown))
}

async fn handle_socket(socket: WebSocket, relay: Relay) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut subscription = relay.subscribe();
    let id = subscription.id();
    tracing::info!(subscriber = %id, "display surface connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    break;
                };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(subscriber = %id, "failed to encode throw: {e}");
                        continue;
                    }
                };
                if let Err(e) = ws_sink.send(Message::Text(payload.into())).await {
                    tracing::warn!(subscriber = %id, "send failed, closing subscriber: {e}");
                    subscription.close();
                    break;
                }
            }
            // Display surfaces only listen; anything they send is ignored.
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    drop(subscription);
    let _ = ws_sink.close().await;
    tracing::info!(subscriber = %id, "display surface disconnected");
}

fn state_frame(state: SessionState) -> Message {
    Message::Text(serde_json::json!({ "state": state }).to_string().into())
}

async fn handle_session_socket(
    socket: WebSocket,
    session: SessionClient,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut states = session.subscribe();

    if ws_sink.send(state_frame(session.state())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = states.recv() => {
                let state = match changed {
                    Ok(state) => state,
                    // Missed some transitions; the latest state is what matters.
                    Err(broadcast::error::RecvError::Lagged(_)) => session.state(),
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if ws_sink.send(state_frame(state)).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    let _ = ws_sink.close().await;
}
