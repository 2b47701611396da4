use std::fmt;

use serde::Serialize;

/// Connection and authentication state of the avatar API session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    Error,
}

impl SessionState {
    /// A link is up or on its way up; `connect()` is a no-op here.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::Connected
                | SessionState::Authenticating
                | SessionState::Authenticated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
            SessionState::Authenticating => "Authenticating",
            SessionState::Authenticated => "Authenticated",
            SessionState::Error => "Error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
