use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of a chat event as it travels over the wire, in both directions.
///
/// The server relays the same shape it received; for file messages the
/// `message` field is rewritten to the server-generated filename and the
/// raw `body` is stripped before fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "senderID")]
    pub sender_id: Uuid,
    pub sender_username: String,
    #[serde(rename = "receiverID", default)]
    pub receiver_id: Option<Uuid>,
    #[serde(default)]
    pub receiver_username: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Message text, or the original filename for file messages.
    pub message: String,
    /// Base64-encoded file body. Only present on inbound file messages.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Submit a chat message for persistence and relay.
    SendMessage(ChatMessage),
}

/// Events sent FROM server TO all connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// The relayed (and possibly rewritten) chat event.
    MessageResponse(ChatMessage),

    /// A user's authenticated connection came online.
    #[serde(rename_all = "camelCase")]
    Open { user_id: Uuid, name: String },

    /// A user's authenticated connection went away.
    #[serde(rename_all = "camelCase")]
    Closed {
        id: Uuid,
        username: String,
        user_id: Uuid,
    },
}
