//! Audit log of chat-affecting operations.
//!
//! Every chat-mutating gateway call is recorded (see
//! [`crate::chat::LoggedChat`]): event kind, success flag, free-form
//! message and the call's payload with secrets stripped. Entries are
//! append-only and double as input to retry tooling — a stored event can
//! be replayed against the chat gateway.

pub mod db;

use serde::{Deserialize, Serialize};

use crate::chat::ChatGateway;
use crate::error::Result;

pub use db::{ActionDb, ActionEntry};

/// The closed set of chat-affecting events.
///
/// Passwords are never part of a payload; replaying a user creation
/// issues a fresh throwaway password and relies on the chat platform
/// forcing a change at first login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChatEvent {
    #[serde(rename = "user-creation")]
    CreateUser {
        username: String,
        email: String,
        name: String,
    },
    #[serde(rename = "channel-creation")]
    CreateChannel { name: String },
    #[serde(rename = "group-creation")]
    CreateGroup { name: String },
    #[serde(rename = "invite-to-channel")]
    InviteToChannel { room_id: String, user_id: String },
    #[serde(rename = "invite-to-group")]
    InviteToGroup { room_id: String, user_id: String },
}

impl ChatEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::CreateUser { .. } => "user-creation",
            ChatEvent::CreateChannel { .. } => "channel-creation",
            ChatEvent::CreateGroup { .. } => "group-creation",
            ChatEvent::InviteToChannel { .. } => "invite-to-channel",
            ChatEvent::InviteToGroup { .. } => "invite-to-group",
        }
    }

    /// Re-invoke the equivalent gateway call.
    pub async fn replay(&self, chat: &dyn ChatGateway) -> Result<()> {
        match self {
            ChatEvent::CreateUser {
                username,
                email,
                name,
            } => {
                let throwaway = uuid::Uuid::new_v4().to_string();
                chat.create_user(username, &throwaway, email, name).await?;
                Ok(())
            }
            ChatEvent::CreateChannel { name } => {
                chat.create_channel(name).await?;
                Ok(())
            }
            ChatEvent::CreateGroup { name } => {
                chat.create_group(name).await?;
                Ok(())
            }
            ChatEvent::InviteToChannel { room_id, user_id } => {
                chat.invite_user_to_channel(room_id, user_id).await
            }
            ChatEvent::InviteToGroup { room_id, user_id } => {
                chat.invite_user_to_group(room_id, user_id).await
            }
        }
    }
}

/// Replay every failed entry in the log, oldest first. Entries that fail
/// again are logged and left in place; one stubborn failure does not stop
/// the rest of the batch.
pub async fn replay_failed(db: &ActionDb, chat: &dyn ChatGateway) -> Result<usize> {
    let mut replayed = 0;
    for entry in db.failed_entries()? {
        let event = match entry.event() {
            Ok(event) => event,
            Err(e) => {
                log::warn!("action {}: unreadable payload, skipping: {}", entry.id, e);
                continue;
            }
        };
        match event.replay(chat).await {
            Ok(()) => {
                db.record(&event, true, Some("replayed"))?;
                replayed += 1;
            }
            Err(e) => log::warn!("action {}: replay failed: {}", entry.id, e),
        }
    }
    Ok(replayed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds_are_closed() {
        let events = [
            ChatEvent::CreateUser {
                username: "alice".into(),
                email: "alice@entint.org".into(),
                name: "Alice Schmidt".into(),
            },
            ChatEvent::CreateChannel { name: "general".into() },
            ChatEvent::CreateGroup { name: "Franchise-France".into() },
            ChatEvent::InviteToChannel {
                room_id: "r1".into(),
                user_id: "u1".into(),
            },
            ChatEvent::InviteToGroup {
                room_id: "r1".into(),
                user_id: "u1".into(),
            },
        ];
        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "user-creation",
                "channel-creation",
                "group-creation",
                "invite-to-channel",
                "invite-to-group"
            ]
        );
    }

    #[test]
    fn test_event_roundtrip() {
        let event = ChatEvent::InviteToGroup {
            room_id: "GENERAL".into(),
            user_id: "ZnaLyzh9Yz".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("invite-to-group"));
        let back: ChatEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_payload_has_no_password() {
        let event = ChatEvent::CreateUser {
            username: "alice".into(),
            email: "alice@entint.org".into(),
            name: "Alice Schmidt".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("password"));
    }

    use crate::testing::InMemoryChat;

    #[tokio::test]
    async fn test_replay_reinvokes_equivalent_call() {
        let chat = InMemoryChat::new();
        let alice = chat.seed_user("alice");
        let room = chat.create_group("announcements").await.unwrap();

        let event = ChatEvent::InviteToGroup {
            room_id: room.id.clone(),
            user_id: alice.id.clone(),
        };
        event.replay(&chat).await.unwrap();

        assert_eq!(*chat.invites.lock().unwrap(), vec![(room.id, alice.id)]);
    }

    #[tokio::test]
    async fn test_replay_failed_entries_marks_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ActionDb::open_at(&dir.path().join("actions.db")).expect("open");
        let chat = InMemoryChat::new();

        let event = ChatEvent::CreateGroup {
            name: "Franchise-France".into(),
        };
        db.record(&event, false, Some("connection reset")).unwrap();

        let replayed = replay_failed(&db, &chat).await.unwrap();
        assert_eq!(replayed, 1);
        assert!(chat
            .get_group_by_name("Franchise-France")
            .await
            .unwrap()
            .is_some());

        // the replay appended a success entry; the failed original stays
        let entries = db.entries(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].success);
        assert!(!entries[1].success);
    }

    #[tokio::test]
    async fn test_replay_keeps_going_past_a_stubborn_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ActionDb::open_at(&dir.path().join("actions.db")).expect("open");
        let chat = InMemoryChat::new();
        chat.fail_on("create_channel");

        db.record(&ChatEvent::CreateChannel { name: "general".into() }, false, Some("500"))
            .unwrap();
        db.record(&ChatEvent::CreateGroup { name: "ops".into() }, false, Some("500"))
            .unwrap();

        let replayed = replay_failed(&db, &chat).await.unwrap();
        assert_eq!(replayed, 1);
        assert!(chat.get_group_by_name("ops").await.unwrap().is_some());
    }
}
