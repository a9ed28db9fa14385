use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CourierError;
use crate::ids::TenantId;

/// Reply sent automatically when an inbound text matches the trigger
/// (compared trimmed and case-insensitively).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReply {
    pub trigger: String,
    pub response: String,
}

impl AutoReply {
    pub fn matches(&self, text: &str) -> bool {
        text.trim().eq_ignore_ascii_case(self.trigger.trim())
    }
}

/// Per-tenant configuration, resolved once per request and immutable for its
/// duration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantConfig {
    /// Bulk batches are silently truncated to this many items.
    pub max_batch_size: usize,
    /// Requested worker count for bulk dispatch; the dispatcher applies its
    /// own hard cap on top.
    pub concurrency: usize,
    /// Throttle applied before each individual send.
    pub inter_send_delay: Duration,
    /// Resolved message text longer than this is rejected.
    pub max_message_chars: usize,
    pub auto_reply: Option<AutoReply>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            concurrency: 3,
            inter_send_delay: Duration::from_millis(750),
            max_message_chars: 4096,
            auto_reply: None,
        }
    }
}

impl TenantConfig {
    /// Apply partial per-tenant overrides on top of these defaults.
    pub fn with_overrides(&self, overrides: &TenantOverrides) -> Self {
        Self {
            max_batch_size: overrides.max_batch_size.unwrap_or(self.max_batch_size),
            concurrency: overrides.concurrency.unwrap_or(self.concurrency),
            inter_send_delay: overrides
                .inter_send_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.inter_send_delay),
            max_message_chars: overrides.max_message_chars.unwrap_or(self.max_message_chars),
            auto_reply: overrides.auto_reply.clone().or_else(|| self.auto_reply.clone()),
        }
    }
}

/// Partial tenant-level overrides as they appear in the directory file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantOverrides {
    pub max_batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub inter_send_delay_ms: Option<u64>,
    pub max_message_chars: Option<usize>,
    pub auto_reply: Option<AutoReply>,
}

/// External collaborator supplying per-tenant configuration.
pub trait TenantDirectory: Send + Sync {
    /// Resolve a tenant's effective config.
    ///
    /// Fails with `TenantNotFound` for unknown tenants and `TenantInactive`
    /// for tenants that exist but are disabled.
    fn resolve(&self, tenant: &TenantId) -> Result<TenantConfig, CourierError>;
}
