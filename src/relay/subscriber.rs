use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::dispatcher::RelayInner;
use crate::models::ThrowEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

/// Connection state and queue depth shared between the relay's fan-out
/// table and the subscription's owner.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: AtomicU8,
    queued: AtomicUsize,
}

impl StateCell {
    pub(crate) fn open() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Open as u8),
            queued: AtomicUsize::new(0),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    /// Moves forward only: Open -> Closing -> Closed.
    pub(crate) fn advance(&self, to: ConnectionState) {
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }

    /// Events handed to the queue and not yet taken out of it.
    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Must be called before the event is sent, so the receiving side
    /// never decrements past zero.
    pub(crate) fn enqueued(&self) {
        self.queued.fetch_add(1, Ordering::AcqRel);
    }

    fn dequeued(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The relay-side half of a subscriber: where `publish` enqueues.
#[derive(Debug)]
pub(crate) struct SubscriberHandle {
    pub(crate) tx: mpsc::UnboundedSender<ThrowEvent>,
    pub(crate) state: Arc<StateCell>,
}

/// The transport-side half of a subscriber. Yields queued events in publish
/// order until the subscriber is unsubscribed or the relay shuts down.
/// Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<ThrowEvent>,
    state: Arc<StateCell>,
    relay: Weak<RelayInner>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        rx: mpsc::UnboundedReceiver<ThrowEvent>,
        state: Arc<StateCell>,
        relay: Weak<RelayInner>,
    ) -> Self {
        Self {
            id,
            rx,
            state,
            relay,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Next pending event, or `None` once the subscriber is no longer Open.
    /// Events still queued at unsubscribe time are discarded, not delivered.
    pub async fn recv(&mut self) -> Option<ThrowEvent> {
        if self.state.get() != ConnectionState::Open {
            return self.finish();
        }
        match self.rx.recv().await {
            Some(event) => {
                self.state.dequeued();
                if self.state.get() == ConnectionState::Open {
                    Some(event)
                } else {
                    self.finish()
                }
            }
            None => self.finish(),
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<ThrowEvent> {
        if self.state.get() != ConnectionState::Open {
            return self.finish();
        }
        let event = self.rx.try_recv().ok()?;
        self.state.dequeued();
        Some(event)
    }

    /// Marks the subscriber as failed after a transport error. The relay
    /// stops fanning out to it; nothing queued is retried.
    pub fn close(&mut self) {
        if let Some(relay) = self.relay.upgrade() {
            relay.unsubscribe(self.id);
        }
        self.finish();
    }

    fn finish(&mut self) -> Option<ThrowEvent> {
        self.state.advance(ConnectionState::Closing);
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        self.state.advance(ConnectionState::Closed);
        None
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.upgrade() {
            relay.unsubscribe(self.id);
        }
        self.state.advance(ConnectionState::Closed);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}
