//! Core types shared across the courier crates: tenant identity, the error
//! taxonomy, and per-tenant configuration.

pub mod config;
pub mod error;
pub mod ids;

pub use config::{AutoReply, TenantConfig, TenantDirectory, TenantOverrides};
pub use error::CourierError;
pub use ids::TenantId;
