//! Notification wire formats
//!
//! Clients send [`WsPayload`] objects; the server pushes [`WsResponse`]
//! objects. Both are plain JSON text frames.

use serde::{Deserialize, Serialize};
use storefront_shared::UserId;

// =============================================================================
// Client-to-Server
// =============================================================================

/// Actions the dispatcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAction {
    #[serde(rename = "delete-user", alias = "deleteUser")]
    DeleteUser,
    /// Anything else; accepted and ignored
    #[serde(other)]
    Unknown,
}

/// Inbound message placed on the hub's ingestion channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsPayload {
    pub action: ClientAction,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub message_type: String,
}

impl WsPayload {
    /// Server-originated request to log out every client of `user_id`
    pub fn delete_user(user_id: UserId) -> Self {
        Self {
            action: ClientAction::DeleteUser,
            message: String::new(),
            username: String::new(),
            user_id: user_id.0,
            message_type: String::new(),
        }
    }
}

// =============================================================================
// Server-to-Client
// =============================================================================

/// Outbound event written to every registered connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsResponse {
    pub action: String,
    pub message: String,
    pub user_id: i64,
}

impl WsResponse {
    /// Sent once, right after a connection is registered
    pub fn greeting() -> Self {
        Self {
            action: String::new(),
            message: "Connected to server".to_string(),
            user_id: 0,
        }
    }

    /// Tells clients of `user_id` to drop their session
    pub fn logout(user_id: i64) -> Self {
        Self {
            action: "logout".to_string(),
            message: "Your account has been deleted".to_string(),
            user_id,
        }
    }
}
