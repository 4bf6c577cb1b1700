//! Capability interface to the team-chat platform (Rocket.Chat).

pub mod client;
pub mod logged;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client::RocketChatClient;
pub use logged::LoggedChat;

/// A chat account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A chat room (channel or private group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// Narrow capability interface to the chat platform.
///
/// Name lookups are exact and case-sensitive, returning `None` when the
/// room or user does not exist. Invites and kicks are idempotent:
/// inviting an already-present member or kicking an absent one succeeds
/// as a no-op.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn create_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
        name: &str,
    ) -> Result<ChatUser>;
    async fn delete_user(&self, chat_user_id: &str) -> Result<()>;

    async fn create_channel(&self, name: &str) -> Result<Room>;
    async fn create_group(&self, name: &str) -> Result<Room>;

    async fn get_channel_by_name(&self, name: &str) -> Result<Option<Room>>;
    async fn get_group_by_name(&self, name: &str) -> Result<Option<Room>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<ChatUser>>;

    async fn invite_user_to_channel(&self, room_id: &str, user_id: &str) -> Result<()>;
    async fn invite_user_to_group(&self, room_id: &str, user_id: &str) -> Result<()>;
    async fn kick_user_from_channel(&self, room_id: &str, user_id: &str) -> Result<()>;
    async fn kick_user_from_group(&self, room_id: &str, user_id: &str) -> Result<()>;

    async fn list_group_members(&self, group_id: &str) -> Result<Vec<ChatUser>>;
}
