use serde::{Deserialize, Serialize};

use crate::models::ChatSummary;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful identification
    Ready { uid: String },

    /// Full chat list of the connected user, newest first.
    /// Sent once after Ready and again after every change.
    ChatsSnapshot { chats: Vec<ChatSummary> },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection with an identity token
    Identify { token: String },

    /// Ask for a fresh snapshot
    Refresh,
}
