//! TEAP — intranet integration backend.
//!
//! Keeps organizational entities (franchises, divisions, teams, users)
//! consistent across three external systems: the identity directory
//! (edap), the file-sharing platform (Nextcloud group folders) and the
//! team-chat platform (Rocket.Chat). The directory is the source of
//! truth; chat rooms and folders are converged towards it, on demand and
//! by the periodic `maintain` run.
//!
//! Modules:
//! - directory / chat / folders: gateway traits + REST clients
//! - model: composite entities and their multi-system operations
//! - reconcile: desired-vs-actual diffing and the maintain entry point
//! - actions: append-only audit log of chat-affecting calls, replayable
//! - testing: in-memory gateway fakes

pub mod actions;
pub mod chat;
pub mod directory;
pub mod error;
pub mod folders;
pub mod model;
pub mod reconcile;
pub mod settings;
pub mod testing;

pub use error::{Error, Result};
pub use model::Backends;
