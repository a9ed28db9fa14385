//! Contract for the opaque wire-level chat client.
//!
//! Pairing, encryption, and message framing live behind the [`ChatTransport`]
//! and [`TransportHandle`] traits; courier only sees connections, events, and
//! a text send operation. The [`memory`] module provides a scripted in-memory
//! implementation used by tests and by the binary's dry-run mode.

pub mod address;
pub mod events;
pub mod memory;
mod transport;

pub use address::Address;
pub use events::{DisconnectReason, InboundContent, InboundMessage, TransportEvent};
pub use transport::{ChatTransport, Connection, TransportError, TransportHandle};
