use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use super::{router, Relay, RelayState};
use crate::error::AppError;
use crate::vts::SessionClient;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the relay's accept point. The listen port can be changed at
/// runtime; sockets already accepted keep their subscriptions across a
/// rebind.
#[derive(Clone)]
pub struct RelayServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    host: IpAddr,
    relay: Relay,
    session: SessionClient,
    shutdown_tx: watch::Sender<bool>,
    bound: Mutex<Option<Bound>>,
}

struct Bound {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RelayServer {
    pub fn new(host: IpAddr, relay: Relay, session: SessionClient) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ServerInner {
                host,
                relay,
                session,
                shutdown_tx,
                bound: Mutex::new(None),
            }),
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.inner.relay
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.bound.lock().await.as_ref().map(|b| b.addr)
    }

    /// Starts accepting on `port`. Same as [`reconfigure`](Self::reconfigure).
    pub async fn bind(&self, port: u16) -> Result<SocketAddr, AppError> {
        self.reconfigure(port).await
    }

    /// Moves the accept point to `port` (0 picks an ephemeral port). The new
    /// port is bound before the old one is released, so a bind failure
    /// leaves the server listening where it was. Rebinding to the port
    /// already in use is a no-op.
    pub async fn reconfigure(&self, port: u16) -> Result<SocketAddr, AppError> {
        if self.inner.relay.is_shut_down() {
            return Err(AppError::Configuration("relay is shut down".to_string()));
        }

        let mut bound = self.inner.bound.lock().await;
        if let Some(current) = bound.as_ref() {
            if port != 0 && current.addr.port() == port {
                return Ok(current.addr);
            }
        }

        let listener = TcpListener::bind((self.inner.host, port))
            .await
            .map_err(|e| {
                AppError::Configuration(format!("failed to bind relay port {port}: {e}"))
            })?;
        let addr = listener
            .local_addr()
            .map_err(|e| AppError::Configuration(format!("failed to read relay address: {e}")))?;

        let app = router(RelayState {
            relay: self.inner.relay.clone(),
            session: self.inner.session.clone(),
            shutdown: self.inner.shutdown_tx.subscribe(),
        });
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("relay server on {addr} failed: {e}");
            }
        });

        if let Some(previous) = bound.replace(Bound { addr, stop, task }) {
            tracing::info!("relay moved from {} to {addr}", previous.addr);
            let _ = previous.stop.send(());
        } else {
            tracing::info!("relay listening on {addr}");
        }
        Ok(addr)
    }

    /// Shuts the relay down, stops accepting and closes every display socket.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.inner.relay.shutdown();
        self.inner.shutdown_tx.send_replace(true);

        let Some(bound) = self.inner.bound.lock().await.take() else {
            return;
        };
        let _ = bound.stop.send(());
        let mut task = bound.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            tracing::warn!("relay server did not stop in time, aborting");
            task.abort();
        }
        tracing::info!("relay on {} stopped", bound.addr);
    }
}
