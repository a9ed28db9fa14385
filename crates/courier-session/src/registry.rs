use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use courier_core::{CourierError, TenantDirectory, TenantId};
use courier_transport::{ChatTransport, TransportHandle};

use crate::connection::ConnectionTask;
use crate::state::ConnectionState;
use crate::storage;

/// Registry-wide settings.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Base directory holding one credential directory per tenant.
    pub sessions_dir: PathBuf,
    /// Bounded wait for a connection to resolve before `Timeout` is returned.
    pub connect_timeout: Duration,
    /// Fixed delay between reconnect attempts after a transient loss.
    pub reconnect_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("./sessions"),
            connect_timeout: Duration::from_secs(30),
            reconnect_backoff: Duration::from_secs(2),
        }
    }
}

/// Point-in-time view of one tenant's entry, published through a watch
/// channel so waiters are woken on every transition instead of polling.
#[derive(Clone)]
pub(crate) struct EntrySnapshot {
    pub state: ConnectionState,
    pub handle: Option<Arc<dyn TransportHandle>>,
    pub qr: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl EntrySnapshot {
    fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            handle: None,
            qr: None,
            connected_at: None,
        }
    }
}

/// One tenant's live entry. The connection task is the only writer; callers
/// blocked in `ensure_connection` are the watch subscribers.
pub(crate) struct TenantEntry {
    state: watch::Sender<EntrySnapshot>,
    pub(crate) cancel: CancellationToken,
}

impl TenantEntry {
    fn new(cancel: CancellationToken) -> Arc<Self> {
        let (state, _) = watch::channel(EntrySnapshot::connecting());
        Arc::new(Self { state, cancel })
    }

    pub(crate) fn snapshot(&self) -> EntrySnapshot {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<EntrySnapshot> {
        self.state.subscribe()
    }

    pub(crate) fn set_connecting(&self) {
        self.state.send_modify(|s| s.state = ConnectionState::Connecting);
    }

    pub(crate) fn set_connected(&self, handle: Arc<dyn TransportHandle>) {
        self.state.send_modify(|s| {
            s.state = ConnectionState::Connected;
            s.handle = Some(handle);
            s.qr = None;
            s.connected_at = Some(Utc::now());
        });
    }

    pub(crate) fn set_disconnected(&self) {
        self.state.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.handle = None;
            s.connected_at = None;
        });
    }

    pub(crate) fn set_awaiting_reauth(&self) {
        self.state.send_modify(|s| {
            s.state = ConnectionState::AwaitingReauth;
            s.handle = None;
            s.qr = None;
            s.connected_at = None;
        });
    }

    pub(crate) fn set_qr(&self, payload: String) {
        self.state.send_modify(|s| s.qr = Some(payload));
    }
}

/// Status surfaced to the HTTP layer.
#[derive(Clone, Debug, Serialize)]
pub struct TenantStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub qr: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}

/// Owns every tenant's connection entry.
///
/// Lifecycle-scoped: construct one per process (or per test), pass it by
/// `Arc`, call [`SessionRegistry::shutdown`] on exit.
pub struct SessionRegistry {
    transport: Arc<dyn ChatTransport>,
    directory: Arc<dyn TenantDirectory>,
    config: RegistryConfig,
    entries: Arc<DashMap<TenantId, Arc<TenantEntry>>>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        directory: Arc<dyn TenantDirectory>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            transport,
            directory,
            config,
            entries: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Return a live handle for the tenant, establishing a connection if
    /// needed.
    ///
    /// Connected entries resolve immediately. Otherwise the caller joins the
    /// tenant's in-flight attempt (never starting a duplicate) and blocks
    /// until the entry resolves or `connect_timeout` elapses. Timing out
    /// abandons only the wait: the attempt keeps running and may satisfy a
    /// later caller.
    pub async fn ensure_connection(
        &self,
        tenant: &TenantId,
    ) -> Result<Arc<dyn TransportHandle>, CourierError> {
        let entry = self.obtain_entry(tenant);

        let snap = entry.snapshot();
        if snap.state == ConnectionState::Connected {
            if let Some(handle) = snap.handle {
                return Ok(handle);
            }
        }

        let mut rx = entry.subscribe();
        let wait = tokio::time::timeout(self.config.connect_timeout, async move {
            loop {
                let snap = rx.borrow_and_update().clone();
                match snap.state {
                    ConnectionState::Connected => {
                        if let Some(handle) = snap.handle {
                            return Ok(handle);
                        }
                    }
                    ConnectionState::AwaitingReauth => {
                        return Err(CourierError::PermanentlyInvalidated);
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(CourierError::Internal(
                        "connection task terminated".into(),
                    ));
                }
            }
        })
        .await;

        match wait {
            Ok(resolved) => resolved,
            Err(_) => Err(CourierError::Timeout(self.config.connect_timeout)),
        }
    }

    /// Current state for the HTTP status surface. Tenants without an entry
    /// report `Uninitialized`.
    pub fn status(&self, tenant: &TenantId) -> TenantStatus {
        match self.entries.get(tenant) {
            Some(entry) => {
                let snap = entry.snapshot();
                TenantStatus {
                    state: snap.state,
                    connected: snap.state == ConnectionState::Connected,
                    qr: snap.qr,
                    connected_at: snap.connected_at,
                }
            }
            None => TenantStatus {
                state: ConnectionState::Uninitialized,
                connected: false,
                qr: None,
                connected_at: None,
            },
        }
    }

    /// Number of live entries. Diagnostic only.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Cancel every tenant's connection task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Get the tenant's entry, creating it and spawning its connection task
    /// if absent. The map's entry lock makes creation single-flight: exactly
    /// one caller spawns, everyone else joins.
    fn obtain_entry(&self, tenant: &TenantId) -> Arc<TenantEntry> {
        if let Some(entry) = self.entries.get(tenant) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.entries
                .entry(tenant.clone())
                .or_insert_with(|| self.spawn_entry(tenant))
                .value(),
        )
    }

    fn spawn_entry(&self, tenant: &TenantId) -> Arc<TenantEntry> {
        info!(tenant_id = %tenant, "establishing session");
        let entry = TenantEntry::new(self.shutdown.child_token());
        let task = ConnectionTask {
            tenant: tenant.clone(),
            transport: Arc::clone(&self.transport),
            directory: Arc::clone(&self.directory),
            entry: Arc::clone(&entry),
            entries: Arc::clone(&self.entries),
            session_dir: storage::tenant_session_dir(&self.config.sessions_dir, tenant),
            backoff: self.config.reconnect_backoff,
        };
        tokio::spawn(task.run());
        entry
    }
}
