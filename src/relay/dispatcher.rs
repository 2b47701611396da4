use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::subscriber::{
    ConnectionState, StateCell, SubscriberHandle, SubscriberId, Subscription,
};
use crate::models::ThrowEvent;

/// Most events a subscriber may have waiting before it is dropped.
pub const MAX_QUEUED: usize = 1024;

/// Fans throw events out to every connected display surface.
///
/// Each subscriber owns a queue drained by its own transport task, so
/// `publish` never waits on a subscriber and a stalled socket only delays
/// itself. A subscriber that lets [`MAX_QUEUED`] events pile up is
/// unsubscribed, which closes its socket. Cloning a `Relay` yields another
/// handle to the same hub.
#[derive(Clone, Default)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

#[derive(Default)]
pub(crate) struct RelayInner {
    subscribers: DashMap<SubscriberId, SubscriberHandle>,
    shut_down: AtomicBool,
}

impl RelayInner {
    pub(crate) fn unsubscribe(&self, id: SubscriberId) -> bool {
        match self.subscribers.remove(&id) {
            Some((_, handle)) => {
                handle.state.advance(ConnectionState::Closing);
                tracing::debug!(subscriber = %id, "subscriber removed");
                true
            }
            None => false,
        }
    }
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new Open subscriber with an empty queue. After shutdown
    /// the returned subscription is already closed.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(StateCell::open());

        if self.is_shut_down() {
            state.advance(ConnectionState::Closed);
        } else {
            self.inner.subscribers.insert(
                id,
                SubscriberHandle {
                    tx,
                    state: Arc::clone(&state),
                },
            );
            // Lost a race with shutdown(), which may have collected its ids
            // before this insert.
            if self.is_shut_down() {
                self.inner.unsubscribe(id);
                state.advance(ConnectionState::Closed);
            } else {
                tracing::debug!(subscriber = %id, "subscriber registered");
            }
        }

        Subscription::new(id, rx, state, Arc::downgrade(&self.inner))
    }

    /// Removes the subscriber from fan-out and discards its pending queue.
    /// Returns false when it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Enqueues a copy of `event` for every Open subscriber and returns the
    /// number of queues it landed in. Never blocks and never fails; with no
    /// subscribers the event is dropped.
    pub fn publish(&self, event: ThrowEvent) -> usize {
        if self.is_shut_down() {
            tracing::debug!("relay shut down, dropping {:?} throw", event.kind);
            return 0;
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.inner.subscribers.iter() {
            let handle = entry.value();
            if handle.state.get() != ConnectionState::Open {
                continue;
            }
            if handle.state.queued() >= MAX_QUEUED {
                tracing::warn!(subscriber = %entry.key(), "subscriber is not draining, dropping it");
                dead.push(*entry.key());
                continue;
            }
            handle.state.enqueued();
            if handle.tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }
        // Reaped here since the map can't be mutated while iterating.
        for id in dead {
            self.inner.unsubscribe(id);
        }

        if delivered == 0 {
            tracing::debug!("no subscribers connected, dropping {:?} throw", event.kind);
        } else {
            tracing::debug!("queued {:?} throw for {delivered} subscriber(s)", event.kind);
        }
        delivered
    }

    /// Unsubscribes everyone and rejects further publishes.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let ids: Vec<SubscriberId> = self.inner.subscribers.iter().map(|e| *e.key()).collect();
        for id in &ids {
            self.inner.unsubscribe(*id);
        }
        tracing::info!("relay shut down, {} subscriber(s) dropped", ids.len());
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}
