use serde::{Deserialize, Serialize};

/// Connection state machine for one tenant's session.
///
/// `Uninitialized` is the implicit state of a tenant with no registry entry.
/// `AwaitingReauth` is terminal: the entry is removed and credentials purged,
/// so the next request starts from scratch with fresh pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
    AwaitingReauth,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::AwaitingReauth => "awaiting_reauth",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
