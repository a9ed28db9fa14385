use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Close code reported by the transport when a connection drops.
///
/// One distinguished code means the remote side invalidated the pairing;
/// every other code is treated as transient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisconnectReason(pub u16);

impl DisconnectReason {
    /// The session was logged out on the remote device. Credentials are no
    /// longer valid and the tenant must pair again.
    pub const LOGGED_OUT: DisconnectReason = DisconnectReason(401);

    pub fn is_permanent(self) -> bool {
        self == Self::LOGGED_OUT
    }
}

/// Message content kinds the transport can deliver, each with its own
/// text extraction rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundContent {
    Text { body: String },
    MediaCaption { caption: String },
    ButtonReply { button_id: String },
    ListReply { row_id: String },
}

impl InboundContent {
    /// The text a consumer should act on, regardless of content kind.
    pub fn text(&self) -> &str {
        match self {
            Self::Text { body } => body,
            Self::MediaCaption { caption } => caption,
            Self::ButtonReply { button_id } => button_id,
            Self::ListReply { row_id } => row_id,
        }
    }
}

/// An inbound message delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: Address,
    pub content: InboundContent,
    /// Set for messages authored by this session itself; consumers skip them.
    pub from_self: bool,
}

/// Events raised by a live transport connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// Pairing payload for display to an operator. Informational only.
    Qr { payload: String },
    /// The connection is authenticated and ready to send.
    Open,
    /// The connection dropped with the given reason code.
    Closed { reason: DisconnectReason },
    Message { message: InboundMessage },
}
