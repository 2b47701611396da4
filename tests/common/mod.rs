#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use futures_util::{SinkExt, StreamExt};
use http::{Method, Request};
use kickbonk::reconnect::ReconnectPolicy;
use kickbonk::relay::{Relay, RelayServer};
use kickbonk::routes;
use kickbonk::state::AppState;
use kickbonk::token_store::{MemoryTokenStore, TokenStore};
use kickbonk::vts::{PluginInfo, SessionClient, SessionState};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const WAIT: Duration = Duration::from_secs(5);

pub type Display = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A relay, a session client and the control API state that ties them
/// together. Each instance is isolated and safe for parallel tests.
pub struct TestServer {
    pub state: AppState,
    pub store: Arc<MemoryTokenStore>,
}

impl TestServer {
    /// Relay bound to an ephemeral port; the session points at `vts_url`.
    pub async fn with_vts(vts_url: &str, store: MemoryTokenStore) -> Self {
        let store = Arc::new(store);
        let session = SessionClient::new(
            vts_url,
            PluginInfo::default(),
            Arc::clone(&store) as Arc<dyn TokenStore>,
        );
        let relay = RelayServer::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            Relay::new(),
            session.clone(),
        );
        relay.bind(0).await.expect("failed to bind test relay");

        let state = AppState {
            relay,
            session,
            reconnect: ReconnectPolicy::new(Duration::from_millis(50), false),
        };
        Self { state, store }
    }

    /// Session pointed at a port nobody listens on.
    pub async fn new() -> Self {
        Self::with_vts(&format!("ws://127.0.0.1:{}", dead_port()), MemoryTokenStore::default())
            .await
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    pub fn relay(&self) -> &Relay {
        self.state.relay.relay()
    }

    pub fn session(&self) -> &SessionClient {
        &self.state.session
    }

    pub async fn relay_addr(&self) -> SocketAddr {
        self.state
            .relay
            .local_addr()
            .await
            .expect("relay is not bound")
    }

    pub async fn relay_url(&self) -> String {
        format!("ws://{}", self.relay_addr().await)
    }

    /// Connects a display surface and waits until the relay has registered it.
    pub async fn connect_display(&self) -> Display {
        let before = self.relay().subscriber_count();
        let display = connect_display(&self.relay_url().await).await;
        wait_for_subscribers(self.relay(), before + 1).await;
        display
    }
}

/// A port that was free a moment ago and has nothing listening on it.
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn connect_display(url: &str) -> Display {
    let (ws, _) = connect_async(url).await.expect("display failed to connect");
    ws
}

pub async fn wait_for_subscribers(relay: &Relay, count: usize) {
    tokio::time::timeout(WAIT, async {
        while relay.subscriber_count() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {count} subscriber(s), have {}",
            relay.subscriber_count()
        )
    });
}

/// Next text frame as JSON.
pub async fn next_json(ws: &mut Display) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Waits for the socket to be closed by the other end.
pub async fn expect_closed(ws: &mut Display) {
    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket was not closed");
}

/// Collects state transitions up to and including `target`.
pub async fn states_until(
    rx: &mut broadcast::Receiver<SessionState>,
    target: SessionState,
) -> Vec<SessionState> {
    let mut seen = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            let state = rx.recv().await.expect("state channel closed");
            seen.push(state);
            if state == target {
                return;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {target}, saw {seen:?}"));
    seen
}

/// Stand-in for the VTube Studio API. Each accepted link is handed to the
/// test as a [`VtsPeer`] so the conversation can be scripted step by step.
pub struct FakeVts {
    pub url: String,
    links: mpsc::UnboundedReceiver<VtsPeer>,
}

impl FakeVts {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, links) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if tx.send(VtsPeer { ws }).is_err() {
                    return;
                }
            }
        });
        Self {
            url: format!("ws://{addr}"),
            links,
        }
    }

    pub async fn accept(&mut self) -> VtsPeer {
        tokio::time::timeout(WAIT, self.links.recv())
            .await
            .expect("session never connected")
            .expect("fake VTube Studio stopped")
    }
}

pub struct VtsPeer {
    ws: WebSocketStream<TcpStream>,
}

impl VtsPeer {
    /// Next request sent by the plugin.
    pub async fn next_request(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for a request")
                .expect("plugin closed the link")
                .expect("link error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    pub async fn reply(&mut self, request_id: Option<&str>, message_type: &str, data: Value) {
        let mut body = json!({
            "apiName": "VTubeStudioPublicAPI",
            "apiVersion": "1.0",
            "timestamp": 1_700_000_000_000u64,
            "messageType": message_type,
            "data": data,
        });
        if let Some(id) = request_id {
            body["requestID"] = json!(id);
        }
        self.send_raw(&body.to_string()).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn issue_token(&mut self, token: &str) {
        self.reply(
            None,
            "AuthenticationTokenResponse",
            json!({ "authenticationToken": token }),
        )
        .await;
    }

    pub async fn answer_auth(&mut self, authenticated: bool) {
        let reason = if authenticated {
            "Token valid. The plugin is authenticated for the current session."
        } else {
            "Token invalid."
        };
        self.reply(
            None,
            "AuthenticationResponse",
            json!({ "authenticated": authenticated, "reason": reason }),
        )
        .await;
    }

    pub async fn api_error(&mut self, error_id: i64, message: &str) {
        self.reply(
            None,
            "APIError",
            json!({ "errorID": error_id, "message": message }),
        )
        .await;
    }

    /// Waits until the plugin closes the link.
    pub async fn expect_closed(&mut self) {
        let closed = tokio::time::timeout(WAIT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "plugin did not close the link");
    }

    /// Drops the link without a close handshake.
    pub fn drop_link(self) {
        drop(self.ws);
    }
}

/// Build a request with an optional JSON body.
pub fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Read the body of a response as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
