//! Reconnect policy applied by `serve` on top of the session client:
//! after the link drops, wait a fixed interval and call `connect()` again.
//! A session in Error is left alone until someone reconnects it by hand,
//! so a user who denied the token prompt is not asked again every few
//! seconds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::vts::{SessionClient, SessionState};

#[derive(Clone)]
pub struct ReconnectPolicy {
    interval: Duration,
    enabled: Arc<AtomicBool>,
}

impl ReconnectPolicy {
    pub fn new(interval: Duration, enabled: bool) -> Self {
        Self {
            interval,
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// A manual disconnect should stick.
    pub fn pause(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn resume(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Keeps `session` connected until `shutdown` flips.
    pub async fn run(self, session: SessionClient, mut shutdown: watch::Receiver<bool>) {
        let mut states = session.subscribe();
        if self.is_enabled() {
            if let Err(e) = session.connect() {
                tracing::error!("cannot connect to VTube Studio: {e}");
                return;
            }
        }

        loop {
            let state = tokio::select! {
                changed = states.recv() => match changed {
                    Ok(state) => state,
                    Err(broadcast::error::RecvError::Lagged(_)) => session.state(),
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = shutdown.changed() => return,
            };
            if state != SessionState::Disconnected {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => return,
            }
            if *shutdown.borrow() {
                return;
            }
            if self.is_enabled() && session.state() == SessionState::Disconnected {
                tracing::debug!("retrying VTube Studio connection");
                if let Err(e) = session.connect() {
                    tracing::error!("cannot connect to VTube Studio: {e}");
                    return;
                }
            }
        }
    }
}
