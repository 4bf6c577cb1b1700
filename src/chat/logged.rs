//! Action-logging decorator for the chat gateway.
//!
//! Wraps any [`ChatGateway`] and records one action-log entry per
//! mutating call before handing the result back unchanged. Logging never
//! alters control flow: a failed gateway call is recorded with
//! `success = false` and then returned to the caller as the error it was,
//! and a failure to write the log entry itself is only logged.

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::{ActionDb, ChatEvent};
use crate::error::Result;

use super::{ChatGateway, ChatUser, Room};

pub struct LoggedChat {
    inner: Arc<dyn ChatGateway>,
    log: Arc<ActionDb>,
}

impl LoggedChat {
    pub fn new(inner: Arc<dyn ChatGateway>, log: Arc<ActionDb>) -> Self {
        Self { inner, log }
    }

    fn record<T>(&self, event: ChatEvent, result: &Result<T>) {
        let (success, message) = match result {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        if let Err(log_err) = self.log.record(&event, success, message.as_deref()) {
            log::error!(
                "failed to record {} action: {}",
                event.kind(),
                log_err
            );
        }
    }
}

#[async_trait]
impl ChatGateway for LoggedChat {
    async fn create_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
        name: &str,
    ) -> Result<ChatUser> {
        let result = self.inner.create_user(username, password, email, name).await;
        // password intentionally absent from the payload
        self.record(
            ChatEvent::CreateUser {
                username: username.to_string(),
                email: email.to_string(),
                name: name.to_string(),
            },
            &result,
        );
        result
    }

    async fn delete_user(&self, chat_user_id: &str) -> Result<()> {
        self.inner.delete_user(chat_user_id).await
    }

    async fn create_channel(&self, name: &str) -> Result<Room> {
        let result = self.inner.create_channel(name).await;
        self.record(ChatEvent::CreateChannel { name: name.to_string() }, &result);
        result
    }

    async fn create_group(&self, name: &str) -> Result<Room> {
        let result = self.inner.create_group(name).await;
        self.record(ChatEvent::CreateGroup { name: name.to_string() }, &result);
        result
    }

    async fn get_channel_by_name(&self, name: &str) -> Result<Option<Room>> {
        self.inner.get_channel_by_name(name).await
    }

    async fn get_group_by_name(&self, name: &str) -> Result<Option<Room>> {
        self.inner.get_group_by_name(name).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<ChatUser>> {
        self.inner.get_user_by_username(username).await
    }

    async fn invite_user_to_channel(&self, room_id: &str, user_id: &str) -> Result<()> {
        let result = self.inner.invite_user_to_channel(room_id, user_id).await;
        self.record(
            ChatEvent::InviteToChannel {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            },
            &result,
        );
        result
    }

    async fn invite_user_to_group(&self, room_id: &str, user_id: &str) -> Result<()> {
        let result = self.inner.invite_user_to_group(room_id, user_id).await;
        self.record(
            ChatEvent::InviteToGroup {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            },
            &result,
        );
        result
    }

    async fn kick_user_from_channel(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.inner.kick_user_from_channel(room_id, user_id).await
    }

    async fn kick_user_from_group(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.inner.kick_user_from_group(room_id, user_id).await
    }

    async fn list_group_members(&self, group_id: &str) -> Result<Vec<ChatUser>> {
        self.inner.list_group_members(group_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryChat;

    fn logged_over_fake() -> (Arc<InMemoryChat>, Arc<ActionDb>, LoggedChat, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = Arc::new(ActionDb::open_at(&dir.path().join("actions.db")).expect("open"));
        let fake = Arc::new(InMemoryChat::new());
        let logged = LoggedChat::new(fake.clone(), log.clone());
        (fake, log, logged, dir)
    }

    #[tokio::test]
    async fn test_success_is_recorded_and_returned() {
        let (_fake, log, logged, _dir) = logged_over_fake();

        let room = logged.create_group("Franchise-France").await.unwrap();
        assert_eq!(room.name, "Franchise-France");

        let entries = log.entries(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "group-creation");
        assert!(entries[0].success);
    }

    #[tokio::test]
    async fn test_transport_failure_is_recorded_and_still_raised() {
        let (fake, log, logged, _dir) = logged_over_fake();
        fake.fail_on("create_channel");

        let err = logged.create_channel("general").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Transport(_)));

        let entries = log.entries(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "channel-creation");
        assert!(!entries[0].success);
        assert!(!entries[0].message.as_deref().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_user_creation_payload_omits_password() {
        let (_fake, log, logged, _dir) = logged_over_fake();

        logged
            .create_user("alice", "hunter2", "alice@entint.org", "Alice Schmidt")
            .await
            .unwrap();

        let entries = log.entries(10).unwrap();
        assert_eq!(entries[0].event, "user-creation");
        assert!(!entries[0].data.contains("hunter2"));
        assert!(!entries[0].data.contains("password"));
    }

    #[tokio::test]
    async fn test_lookups_are_not_recorded() {
        let (_fake, log, logged, _dir) = logged_over_fake();

        logged.get_group_by_name("whatever").await.unwrap();
        logged.get_user_by_username("alice").await.unwrap();
        assert!(log.entries(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invite_is_recorded_with_room_and_user() {
        let (fake, log, logged, _dir) = logged_over_fake();
        let alice = fake.seed_user("alice");
        let room = fake.create_group("general-room").await.unwrap();

        logged.invite_user_to_group(&room.id, &alice.id).await.unwrap();

        let entries = log.entries(10).unwrap();
        assert_eq!(entries[0].event, "invite-to-group");
        let event = entries[0].event().unwrap();
        assert_eq!(
            event,
            crate::actions::ChatEvent::InviteToGroup {
                room_id: room.id,
                user_id: alice.id,
            }
        );
    }
}
