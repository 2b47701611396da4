use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::handshake::{Handshake, PendingRequest, Step};
use super::messages::{ApiMessage, ApiRequest, PluginInfo};
use super::state::SessionState;
use crate::error::AppError;
use crate::token_store::TokenStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STATE_CHANNEL_CAPACITY: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// One session with the VTube Studio API.
///
/// `connect()` opens the link and drives the handshake on a background
/// task. Every state transition is broadcast exactly once, in order, to
/// receivers obtained from [`subscribe`](Self::subscribe). Reconnecting
/// after a lost link is up to the caller.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    plugin: PluginInfo,
    store: Arc<dyn TokenStore>,
    states: broadcast::Sender<SessionState>,
    session: Mutex<Session>,
}

struct Session {
    state: SessionState,
    /// Bumped by every connect/disconnect; a link task whose generation is
    /// stale can no longer touch the session.
    generation: u64,
    pending: Option<PendingRequest>,
    link: Option<Link>,
}

struct Link {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionClient {
    pub fn new(url: impl Into<String>, plugin: PluginInfo, store: Arc<dyn TokenStore>) -> Self {
        let (states, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                plugin,
                store,
                states,
                session: Mutex::new(Session {
                    state: SessionState::Disconnected,
                    generation: 0,
                    pending: None,
                    link: None,
                }),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.lock().state
    }

    /// Receives every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.inner.states.subscribe()
    }

    /// The request we are currently waiting on, if any.
    pub fn pending_request(&self) -> Option<PendingRequest> {
        self.inner.session.lock().pending.clone()
    }

    /// Opens the link and starts the handshake. A no-op while a session is
    /// already connecting or up. Must be called from within a tokio runtime.
    pub fn connect(&self) -> Result<(), AppError> {
        let request = self
            .inner
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::Configuration(format!("invalid VTube Studio url: {e}")))?;

        let mut session = self.inner.session.lock();
        if session.state.is_active() {
            tracing::debug!("connect ignored, session is {}", session.state);
            return Ok(());
        }

        session.generation += 1;
        let generation = session.generation;
        session.pending = None;
        self.inner.set_state(&mut session, SessionState::Connecting);

        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run_link(
            Arc::downgrade(&self.inner),
            generation,
            request,
            stopped,
        ));
        if let Some(old) = session.link.replace(Link { stop, task }) {
            old.task.abort();
        }
        Ok(())
    }

    /// Tears the link down from any state. Idempotent.
    pub fn disconnect(&self) {
        let mut session = self.inner.session.lock();
        session.generation += 1;
        session.pending = None;
        if let Some(link) = session.link.take() {
            // The link task closes the socket itself; if it is already gone
            // there is nothing left to stop.
            let _ = link.stop.send(());
        }
        self.inner.set_state(&mut session, SessionState::Disconnected);
    }
}

impl Inner {
    fn set_state(&self, session: &mut Session, next: SessionState) {
        if session.state == next {
            return;
        }
        tracing::info!("VTube Studio session: {} -> {next}", session.state);
        session.state = next;
        let _ = self.states.send(next);
    }

    /// Applies `f` only if `generation` is still current.
    fn with_session<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&Inner, &mut Session),
    {
        let mut session = self.session.lock();
        if session.generation != generation {
            return false;
        }
        f(self, &mut session);
        true
    }

    /// The link task is ending on its own; forget it.
    fn finish(&self, generation: u64, next: SessionState) {
        self.with_session(generation, |inner, session| {
            session.link = None;
            session.pending = None;
            inner.set_state(session, next);
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(link) = self.session.get_mut().link.take() {
            link.task.abort();
        }
    }
}

/// Runs `f` against the client if it still exists and `generation` is
/// current. Returns false when the link task should stop.
fn with_client<F>(client: &Weak<Inner>, generation: u64, f: F) -> bool
where
    F: FnOnce(&Inner, &mut Session),
{
    match client.upgrade() {
        Some(inner) => inner.with_session(generation, f),
        None => false,
    }
}

fn finish(client: &Weak<Inner>, generation: u64, next: SessionState) {
    if let Some(inner) = client.upgrade() {
        inner.finish(generation, next);
    }
}

/// How a failed socket operation ends the session.
fn state_after(err: &AppError) -> SessionState {
    match err {
        AppError::Transport(_) => SessionState::Disconnected,
        _ => SessionState::Error,
    }
}

async fn send_request(ws: &mut WsStream, request: &ApiRequest) -> Result<(), AppError> {
    let payload = serde_json::to_string(request)
        .map_err(|e| AppError::Internal(format!("failed to encode {}: {e}", request.message_type)))?;
    tracing::debug!(request_id = %request.request_id, "sending {}", request.message_type);
    ws.send(Message::Text(payload.into())).await?;
    Ok(())
}

async fn close(ws: &mut WsStream) {
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await;
}

async fn run_link(
    client: Weak<Inner>,
    generation: u64,
    request: Request,
    mut stopped: oneshot::Receiver<()>,
) {
    let (url, plugin, store) = match client.upgrade() {
        Some(inner) => (inner.url.clone(), inner.plugin.clone(), Arc::clone(&inner.store)),
        None => return,
    };

    let connected = tokio::select! {
        result = connect_async(request) => result,
        _ = &mut stopped => return,
    };
    let mut ws = match connected {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::warn!("could not reach VTube Studio at {url}: {e}");
            finish(&client, generation, SessionState::Disconnected);
            return;
        }
    };

    if !with_client(&client, generation, |inner, session| {
        inner.set_state(session, SessionState::Connected)
    }) {
        close(&mut ws).await;
        return;
    }

    let mut handshake = Handshake::new(plugin, store);
    let first = match handshake.start().await {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("failed to read stored token: {e}");
            close(&mut ws).await;
            finish(&client, generation, SessionState::Error);
            return;
        }
    };
    if !with_client(&client, generation, |inner, session| {
        session.pending = handshake.pending().cloned();
        inner.set_state(session, SessionState::Authenticating);
    }) {
        close(&mut ws).await;
        return;
    }
    if let Err(e) = send_request(&mut ws, &first).await {
        tracing::warn!("failed to send {}: {e}", first.message_type);
        finish(&client, generation, state_after(&e));
        return;
    }

    loop {
        let frame = tokio::select! {
            frame = ws.next() => frame,
            _ = &mut stopped => {
                close(&mut ws).await;
                return;
            }
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!("VTube Studio closed the connection");
                finish(&client, generation, SessionState::Disconnected);
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                let err = AppError::from(e);
                tracing::warn!("VTube Studio link failed: {err}");
                finish(&client, generation, state_after(&err));
                return;
            }
        };

        let message = match ApiMessage::parse(text.as_str()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("ignoring malformed message from VTube Studio: {e}");
                continue;
            }
        };

        let step = match handshake.handle(message).await {
            Ok(step) => step,
            Err(AppError::Protocol(e)) => {
                tracing::warn!("ignoring malformed message from VTube Studio: {e}");
                continue;
            }
            Err(e) => {
                tracing::error!("handshake failed: {e}");
                close(&mut ws).await;
                finish(&client, generation, SessionState::Error);
                return;
            }
        };

        match step {
            Step::Send(request) => {
                if !with_client(&client, generation, |_, session| {
                    session.pending = handshake.pending().cloned();
                }) {
                    close(&mut ws).await;
                    return;
                }
                if let Err(e) = send_request(&mut ws, &request).await {
                    tracing::warn!("failed to send {}: {e}", request.message_type);
                    finish(&client, generation, state_after(&e));
                    return;
                }
            }
            Step::Authenticated => {
                let current = with_client(&client, generation, |inner, session| {
                    session.pending = None;
                    inner.set_state(session, SessionState::Authenticated);
                });
                if !current {
                    close(&mut ws).await;
                    return;
                }
            }
            Step::Rejected(reason) => {
                let err = AppError::Credential(reason);
                tracing::warn!("VTube Studio rejected the token: {err}");
                close(&mut ws).await;
                finish(&client, generation, state_after(&err));
                return;
            }
            Step::Ignore => {}
        }
    }
}
