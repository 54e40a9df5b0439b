//! Records exchanged with the chat backend.
//!
//! The backend is loose about spelling (`_id` vs `id`, `avatar` vs
//! `avatarUrl`) and about which optional fields it fills in, so every field
//! that may be missing has a serde default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "avatar", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub members: Vec<UserSummary>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message_sender_id: Option<String>,
    #[serde(default)]
    pub delivered_to: Vec<String>,
    #[serde(default)]
    pub seen_by: Vec<String>,
}

impl RoomSummary {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.id == user_id)
    }

    /// The counterpart in a direct room, if any
    pub fn other_member(&self, me: &str) -> Option<&UserSummary> {
        self.members.iter().find(|m| m.id != me)
    }

    /// Merge a summary patch produced by a message send
    pub fn apply(&mut self, patch: &RoomPatch) {
        self.last_message = Some(patch.last_message.clone());
        self.last_message_at = Some(patch.last_message_at);
        self.last_message_sender_id = Some(patch.last_message_sender_id.clone());
        self.delivered_to = patch.delivered_to.clone();
        self.seen_by = patch.seen_by.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered_to: Vec<String>,
    #[serde(default)]
    pub seen_by: Vec<String>,
}

/// Partial room update carried from the message pane to the room cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomPatch {
    pub room_id: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub last_message_sender_id: String,
    pub delivered_to: Vec<String>,
    pub seen_by: Vec<String>,
}

impl RoomPatch {
    pub fn from_message(room_id: &str, message: &Message) -> Self {
        Self {
            room_id: room_id.to_string(),
            last_message: message.content.clone(),
            last_message_at: message.created_at,
            last_message_sender_id: message.sender_id.clone(),
            delivered_to: message.delivered_to.clone(),
            seen_by: message.seen_by.clone(),
        }
    }
}
