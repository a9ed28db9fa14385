//! Scripted in-memory transport.
//!
//! Stands in for the real wire client in tests and in the binary's dry-run
//! mode: connections are opened instantly (or on script command), sends are
//! recorded instead of hitting the network, and tests drive the event stream
//! by hand.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::address::Address;
use crate::events::TransportEvent;
use crate::transport::{ChatTransport, Connection, TransportError, TransportHandle};

const EVENT_BUFFER: usize = 64;
const MEMORY_DOMAIN: &str = "mem.chat";

/// A message recorded by a [`MemoryHandle`] instead of being sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub to: Address,
    pub text: String,
}

/// Send handle that records messages and fails on scripted recipients.
pub struct MemoryHandle {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    /// Make every send to this canonical address fail with a transport error.
    pub fn fail_sends_to(&self, address: &str) {
        self.failing.lock().insert(address.to_owned());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl TransportHandle for MemoryHandle {
    async fn send_text(&self, to: &Address, text: &str) -> Result<(), TransportError> {
        if self.failing.lock().contains(to.as_str()) {
            return Err(TransportError::Send(format!("scripted failure for {to}")));
        }
        self.sent.lock().push(SentMessage {
            to: to.clone(),
            text: text.to_owned(),
        });
        Ok(())
    }

    fn address_domain(&self) -> &str {
        MEMORY_DOMAIN
    }
}

/// Script access to one connection produced by [`MemoryTransport::connect`].
pub struct ConnectionScript {
    pub session_dir: PathBuf,
    pub handle: Arc<MemoryHandle>,
    events: mpsc::Sender<TransportEvent>,
}

impl ConnectionScript {
    /// Inject a transport event into this connection's stream.
    /// Returns false if the session side has already dropped the receiver.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub async fn open(&self) -> bool {
        self.emit(TransportEvent::Open).await
    }
}

/// In-memory [`ChatTransport`] implementation.
pub struct MemoryTransport {
    auto_open: bool,
    connect_delay: Duration,
    connect_calls: AtomicUsize,
    connections: Mutex<Vec<Arc<ConnectionScript>>>,
}

impl MemoryTransport {
    /// A transport whose connections stay in `Connecting` until a test
    /// scripts the open event.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            auto_open: false,
            connect_delay: Duration::ZERO,
            connect_calls: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        })
    }

    /// A transport that emits `Open` as soon as a connection is created.
    pub fn auto_open() -> Arc<Self> {
        Arc::new(Self {
            auto_open: true,
            connect_delay: Duration::ZERO,
            connect_calls: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        })
    }

    /// An auto-opening transport whose `connect` takes `delay` to resolve,
    /// widening the establishment window so tests can pile concurrent
    /// callers onto one in-flight attempt.
    pub fn auto_open_after(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            auto_open: true,
            connect_delay: delay,
            connect_calls: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        })
    }

    /// Number of times `connect` was called, across all tenants.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<Arc<ConnectionScript>> {
        self.connections.lock().clone()
    }

    pub fn last_connection(&self) -> Option<Arc<ConnectionScript>> {
        self.connections.lock().last().cloned()
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn connect(&self, session_dir: &Path) -> Result<Connection, TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = MemoryHandle::new();
        let script = Arc::new(ConnectionScript {
            session_dir: session_dir.to_path_buf(),
            handle: Arc::clone(&handle),
            events: tx.clone(),
        });
        self.connections.lock().push(Arc::clone(&script));

        if self.auto_open {
            // Buffered: the receiver sees Open on its first poll.
            let _ = tx.send(TransportEvent::Open).await;
        }

        Ok(Connection {
            handle,
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends() {
        let handle = MemoryHandle::new();
        let to = handle.normalize_recipient("123").unwrap();
        handle.send_text(&to, "hello").await.unwrap();
        assert_eq!(
            handle.sent(),
            vec![SentMessage {
                to: Address::from_canonical("123@mem.chat"),
                text: "hello".into()
            }]
        );
    }

    #[tokio::test]
    async fn scripted_failures_surface_as_errors() {
        let handle = MemoryHandle::new();
        handle.fail_sends_to("99@mem.chat");
        let to = Address::from_canonical("99@mem.chat");
        assert!(handle.send_text(&to, "x").await.is_err());
        assert_eq!(handle.sent_count(), 0);
    }

    #[tokio::test]
    async fn auto_open_buffers_the_open_event() {
        let transport = MemoryTransport::auto_open();
        let mut conn = transport.connect(Path::new("/tmp/t1")).await.unwrap();
        assert!(matches!(conn.events.recv().await, Some(TransportEvent::Open)));
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn scripts_reach_the_connection() {
        let transport = MemoryTransport::new();
        let mut conn = transport.connect(Path::new("/tmp/t1")).await.unwrap();
        let script = transport.last_connection().unwrap();
        assert!(script.open().await);
        assert!(matches!(conn.events.recv().await, Some(TransportEvent::Open)));
    }
}
