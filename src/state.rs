use crate::reconnect::ReconnectPolicy;
use crate::relay::RelayServer;
use crate::vts::SessionClient;

/// Shared by every control API handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayServer,
    pub session: SessionClient,
    pub reconnect: ReconnectPolicy,
}
