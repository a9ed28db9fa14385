use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use courier_core::{TenantDirectory, TenantId};
use courier_transport::{ChatTransport, Connection, InboundMessage, TransportEvent, TransportHandle};

use crate::registry::TenantEntry;
use crate::storage;

/// How one established link ended.
enum LinkOutcome {
    /// Transient loss; reconnect after backoff.
    Transient,
    /// Remote invalidated the pairing; purge and stop.
    Permanent,
    Cancelled,
}

/// Drives one tenant's connection: connect, pump transport events through the
/// state machine, reconnect on transient loss. Exactly one task exists per
/// registry entry.
pub(crate) struct ConnectionTask {
    pub tenant: TenantId,
    pub transport: Arc<dyn ChatTransport>,
    pub directory: Arc<dyn TenantDirectory>,
    pub entry: Arc<TenantEntry>,
    pub entries: Arc<DashMap<TenantId, Arc<TenantEntry>>>,
    pub session_dir: PathBuf,
    pub backoff: Duration,
}

impl ConnectionTask {
    pub(crate) async fn run(self) {
        loop {
            if self.entry.cancel.is_cancelled() {
                break;
            }

            if let Err(e) = tokio::fs::create_dir_all(&self.session_dir).await {
                error!(tenant_id = %self.tenant, error = %e, "cannot create session storage");
                self.entry.set_disconnected();
                if self.wait_backoff().await.is_err() {
                    break;
                }
                continue;
            }

            self.entry.set_connecting();
            let connected = tokio::select! {
                _ = self.entry.cancel.cancelled() => break,
                result = self.transport.connect(&self.session_dir) => result,
            };
            let conn = match connected {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(tenant_id = %self.tenant, error = %e, "transport connect failed");
                    self.entry.set_disconnected();
                    if self.wait_backoff().await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match self.drive(conn).await {
                LinkOutcome::Cancelled => break,
                LinkOutcome::Transient => {
                    self.entry.set_disconnected();
                    if self.wait_backoff().await.is_err() {
                        break;
                    }
                }
                LinkOutcome::Permanent => {
                    self.invalidate().await;
                    break;
                }
            }
        }
        debug!(tenant_id = %self.tenant, "connection task exiting");
    }

    /// Pump events from one live link until it closes.
    async fn drive(&self, mut conn: Connection) -> LinkOutcome {
        loop {
            let event = tokio::select! {
                _ = self.entry.cancel.cancelled() => return LinkOutcome::Cancelled,
                event = conn.events.recv() => event,
            };
            match event {
                None => {
                    warn!(tenant_id = %self.tenant, "transport event stream ended");
                    return LinkOutcome::Transient;
                }
                Some(TransportEvent::Open) => {
                    info!(tenant_id = %self.tenant, "connected");
                    self.entry.set_connected(Arc::clone(&conn.handle));
                }
                Some(TransportEvent::Qr { payload }) => {
                    // Informational: pairing UI reads it, no state transition.
                    info!(tenant_id = %self.tenant, "pairing QR issued");
                    self.entry.set_qr(payload);
                }
                Some(TransportEvent::Closed { reason }) => {
                    warn!(
                        tenant_id = %self.tenant,
                        code = reason.0,
                        permanent = reason.is_permanent(),
                        "connection closed"
                    );
                    return if reason.is_permanent() {
                        LinkOutcome::Permanent
                    } else {
                        LinkOutcome::Transient
                    };
                }
                Some(TransportEvent::Message { message }) => {
                    self.handle_inbound(&conn.handle, message).await;
                }
            }
        }
    }

    async fn handle_inbound(&self, handle: &Arc<dyn TransportHandle>, message: InboundMessage) {
        if message.from_self {
            return;
        }
        let text = message.content.text();
        debug!(tenant_id = %self.tenant, sender = %message.sender, text, "inbound message");

        let Ok(config) = self.directory.resolve(&self.tenant) else {
            return;
        };
        if let Some(reply) = config.auto_reply {
            if reply.matches(text) {
                if let Err(e) = handle.send_text(&message.sender, &reply.response).await {
                    warn!(
                        tenant_id = %self.tenant,
                        sender = %message.sender,
                        error = %e,
                        "auto-reply failed"
                    );
                }
            }
        }
    }

    /// Terminal teardown: remove the entry first so new callers start fresh,
    /// then resolve waiters, then purge credentials.
    async fn invalidate(&self) {
        warn!(tenant_id = %self.tenant, "session invalidated by remote, purging credentials");
        self.entries.remove(&self.tenant);
        self.entry.set_awaiting_reauth();
        if let Err(e) = storage::purge_session_dir(&self.session_dir).await {
            error!(tenant_id = %self.tenant, error = %e, "failed to purge session storage");
        }
    }

    /// Fixed-interval reconnect delay. Errors when the task is cancelled.
    async fn wait_backoff(&self) -> Result<(), ()> {
        tokio::select! {
            _ = self.entry.cancel.cancelled() => Err(()),
            _ = tokio::time::sleep(self.backoff) => Ok(()),
        }
    }
}
