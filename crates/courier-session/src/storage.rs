//! Per-tenant credential storage directories.
//!
//! The transport owns the file format inside each directory; this module only
//! decides where a tenant's directory lives, creates it before the first
//! connect, and purges it when the session is permanently invalidated.

use std::io;
use std::path::{Path, PathBuf};

use courier_core::TenantId;

/// Reduce a tenant id to a safe directory name. Any character outside
/// `[A-Za-z0-9._-]` becomes `_`, and names that collapse to path dots are
/// rewritten so they cannot escape the base directory.
pub fn sanitize_dir_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return cleaned.replace('.', "_") + "_";
    }
    cleaned
}

pub fn tenant_session_dir(base: &Path, tenant: &TenantId) -> PathBuf {
    base.join(sanitize_dir_name(tenant.as_str()))
}

/// Remove a tenant's credential directory. Missing directories are fine.
pub async fn purge_session_dir(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
