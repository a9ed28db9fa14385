use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::address::Address;
use crate::events::TransportEvent;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("event channel closed")]
    ChannelClosed,
}

/// A live, authenticated connection: the send handle plus the event stream
/// the session layer drives its state machine from.
pub struct Connection {
    pub handle: Arc<dyn TransportHandle>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Send side of one tenant's connection.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    async fn send_text(&self, to: &Address, text: &str) -> Result<(), TransportError>;

    /// Domain suffix appended to bare numeric recipients.
    fn address_domain(&self) -> &str;

    fn normalize_recipient(&self, raw: &str) -> Option<Address> {
        Address::normalize(raw, self.address_domain())
    }
}

/// Factory for per-tenant connections. `session_dir` holds the persistent
/// pairing credentials; the transport creates or reuses them as needed.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    async fn connect(&self, session_dir: &Path) -> Result<Connection, TransportError>;
}
