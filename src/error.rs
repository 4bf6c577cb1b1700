//! Crate-wide error taxonomy.
//!
//! Errors are classified by how the caller should react:
//! - NotFound / Conflict / Ambiguous: directory data problems, surfaced
//!   to the caller as-is, never retried automatically.
//! - Transport: a gateway call failed at the HTTP level or returned a
//!   non-success status. Chat mutations record these in the action log
//!   before re-raising.
//! - Config / Storage: local problems (environment, sync config file,
//!   action-log database).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Ambiguous match: {0}")]
    Ambiguous(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SQLite error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that describe a directory/chat/folder data problem
    /// rather than a failed call. These map to 4xx responses at the API
    /// boundary and must never be retried.
    pub fn is_data_problem(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Conflict(_) | Error::Ambiguous(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_problem_classification() {
        assert!(Error::NotFound("uid=alice".into()).is_data_problem());
        assert!(Error::Conflict("duplicate display name".into()).is_data_problem());
        assert!(Error::Ambiguous("cn=it matched 2 entries".into()).is_data_problem());
        assert!(!Error::Transport("connection reset".into()).is_data_problem());
        assert!(!Error::Config("EDAP_HOSTNAME not set".into()).is_data_problem());
    }
}
