//! Client side of the VTube Studio public API: the authentication
//! handshake and the session that drives it over a WebSocket.

pub mod client;
pub mod handshake;
pub mod messages;
pub mod state;

pub use client::SessionClient;
pub use handshake::{Expecting, PendingRequest};
pub use messages::PluginInfo;
pub use state::SessionState;
