use std::time::Duration;

use crate::ids::TenantId;

/// Typed error hierarchy for courier operations.
/// Classifies errors as caller-fixable, retryable, or terminal.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CourierError {
    // Caller-fixable — don't retry
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),
    #[error("tenant inactive: {0}")]
    TenantInactive(TenantId),

    // Retryable
    #[error("not connected")]
    NotConnected,
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // Terminal — session must be re-paired
    #[error("session permanently invalidated")]
    PermanentlyInvalidated,

    // Isolated per-item transport failure
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl CourierError {
    /// Whether the caller should retry after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Timeout(_))
    }

    /// Whether the request itself was malformed or unauthorized for this
    /// tenant; retrying without changes cannot succeed.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::TenantNotFound(_) | Self::TenantInactive(_)
        )
    }

    /// Stable machine-readable kind, used in HTTP error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::TenantNotFound(_) => "tenant_not_found",
            Self::TenantInactive(_) => "tenant_inactive",
            Self::NotConnected => "not_connected",
            Self::Timeout(_) => "timeout",
            Self::PermanentlyInvalidated => "permanently_invalidated",
            Self::SendFailed(_) => "send_failed",
            Self::Internal(_) => "internal",
        }
    }
}
