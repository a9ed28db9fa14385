//! HTTP control surface: status, single send, and bulk send per tenant,
//! guarded by an optional API key. Thin layer over the session registry and
//! the bulk dispatcher.

pub mod directory;
pub mod handlers;
mod server;

pub use directory::{DirectoryError, JsonTenantDirectory};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
