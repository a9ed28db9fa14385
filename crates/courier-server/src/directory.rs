//! File-backed tenant directory.
//!
//! The identity side of tenancy (who may call which tenant) lives with the
//! external identity provider; this directory only answers whether a tenant
//! exists, whether it is active, and which config overrides it carries.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use courier_core::{CourierError, TenantConfig, TenantDirectory, TenantId, TenantOverrides};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("cannot read tenant directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tenant directory: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TenantRecord {
    #[serde(default = "default_active")]
    active: bool,
    #[serde(flatten)]
    overrides: TenantOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    defaults: TenantOverrides,
    #[serde(default)]
    tenants: HashMap<String, TenantRecord>,
}

/// Tenant directory loaded once from a JSON file:
///
/// ```json
/// {
///   "defaults": { "concurrency": 3, "inter_send_delay_ms": 750 },
///   "tenants": {
///     "acme": { "max_batch_size": 50 },
///     "gone": { "active": false }
///   }
/// }
/// ```
pub struct JsonTenantDirectory {
    defaults: TenantConfig,
    tenants: HashMap<String, TenantRecord>,
}

impl JsonTenantDirectory {
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn parse(raw: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_json::from_str(raw)?;
        Ok(Self {
            defaults: TenantConfig::default().with_overrides(&file.defaults),
            tenants: file.tenants,
        })
    }
}

impl TenantDirectory for JsonTenantDirectory {
    fn resolve(&self, tenant: &TenantId) -> Result<TenantConfig, CourierError> {
        match self.tenants.get(tenant.as_str()) {
            None => Err(CourierError::TenantNotFound(tenant.clone())),
            Some(record) if !record.active => Err(CourierError::TenantInactive(tenant.clone())),
            Some(record) => Ok(self.defaults.with_overrides(&record.overrides)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "defaults": { "concurrency": 5 },
        "tenants": {
            "acme": { "max_batch_size": 50 },
            "gone": { "active": false },
            "plain": {}
        }
    }"#;

    #[test]
    fn resolves_overrides_on_top_of_defaults() {
        let dir = JsonTenantDirectory::parse(SAMPLE).unwrap();
        let config = dir.resolve(&TenantId::from_raw("acme")).unwrap();
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.inter_send_delay, Duration::from_millis(750));
    }

    #[test]
    fn plain_tenant_gets_file_defaults() {
        let dir = JsonTenantDirectory::parse(SAMPLE).unwrap();
        let config = dir.resolve(&TenantId::from_raw("plain")).unwrap();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_batch_size, TenantConfig::default().max_batch_size);
    }

    #[test]
    fn unknown_and_inactive_tenants_are_rejected() {
        let dir = JsonTenantDirectory::parse(SAMPLE).unwrap();
        assert!(matches!(
            dir.resolve(&TenantId::from_raw("nobody")),
            Err(CourierError::TenantNotFound(_))
        ));
        assert!(matches!(
            dir.resolve(&TenantId::from_raw("gone")),
            Err(CourierError::TenantInactive(_))
        ));
    }

    #[test]
    fn empty_file_is_valid_but_knows_no_tenants() {
        let dir = JsonTenantDirectory::parse("{}").unwrap();
        assert!(dir.resolve(&TenantId::from_raw("anyone")).is_err());
    }
}
