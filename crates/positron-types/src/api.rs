use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Fixed payload for every relay failure.
pub const GENERIC_SERVER_ERROR: &str = "Something went wrong on the server.";

// -- Identity claims --

/// Verified identity-token claims, shared by the REST middleware and the
/// WebSocket gateway. `sub` is the provider's opaque user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevLoginRequest {
    pub uid: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DevLoginResponse {
    pub uid: String,
    pub token: String,
}

// -- Relay --

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub history: Vec<Message>,
}

/// One streamed event payload: `data: {"text": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Chats --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
