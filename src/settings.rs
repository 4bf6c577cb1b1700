//! Deployment settings and the declarative sync inventory.
//!
//! Credentials and endpoints for the three external systems come from
//! environment variables. The sync inventory — which divisions the
//! deployment expects, which special rooms exist and who belongs in them,
//! which teams get filled from a membership spec — lives in a JSON file
//! (`teap.json` by default) that an admin edits and `maintain` re-reads
//! on every run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Connection settings for the edap directory service.
#[derive(Debug, Clone)]
pub struct EdapSettings {
    pub hostname: String,
    pub user: String,
    pub password: String,
    pub domain: String,
}

/// Connection settings for the Rocket.Chat server.
#[derive(Debug, Clone)]
pub struct RocketSettings {
    pub host: String,
    pub user_id: String,
    pub auth_token: String,
}

/// Connection settings for the Nextcloud server.
#[derive(Debug, Clone)]
pub struct NextcloudSettings {
    pub host: String,
    pub user: String,
    pub password: String,
}

/// All gateway settings, read from the environment in one pass.
#[derive(Debug, Clone)]
pub struct Settings {
    pub edap: EdapSettings,
    pub rocket: RocketSettings,
    pub nextcloud: NextcloudSettings,
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{} is not set", name)))
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            edap: EdapSettings {
                hostname: env_var("EDAP_HOSTNAME")?,
                user: env_var("EDAP_USER")?,
                password: env_var("EDAP_PASSWORD")?,
                domain: env_var("EDAP_DOMAIN")?,
            },
            rocket: RocketSettings {
                host: env_var("ROCKETCHAT_HOST")?,
                user_id: env_var("ROCKETCHAT_USER_ID")?,
                auth_token: env_var("ROCKETCHAT_AUTH_TOKEN")?,
            },
            nextcloud: NextcloudSettings {
                host: env_var("NEXTCLOUD_HOST")?,
                user: env_var("NEXTCLOUD_USER")?,
                password: env_var("NEXTCLOUD_PASSWORD")?,
            },
        })
    }
}

/// Declarative sync inventory.
///
/// `divisions` maps division machine name to display name. `rooms` maps a
/// special-room name to a membership spec string (see
/// [`crate::reconcile::membership`]). `teams` maps a team machine name to
/// the spec its membership is filled from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub divisions: BTreeMap<String, String>,
    #[serde(default)]
    pub rooms: BTreeMap<String, String>,
    #[serde(default)]
    pub teams: BTreeMap<String, String>,
    /// Whether franchise-room sync also removes chat members that are no
    /// longer directory members of the franchise. Invite-only is the
    /// conservative default; special rooms always converge exactly and
    /// ignore this flag.
    #[serde(default)]
    pub kick_extraneous: bool,
}

impl SyncConfig {
    /// Load the inventory from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sync_config_load() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{
                "divisions": {{"it": "IT", "acc": "Accounting"}},
                "rooms": {{"announcements": "team=everybody"}},
                "teams": {{"fr-it": "ou=franchises+uid=bob"}},
                "kick_extraneous": true
            }}"#
        )
        .unwrap();

        let config = SyncConfig::load(f.path()).unwrap();
        assert_eq!(config.divisions.len(), 2);
        assert_eq!(config.divisions["it"], "IT");
        assert_eq!(config.rooms["announcements"], "team=everybody");
        assert_eq!(config.teams["fr-it"], "ou=franchises+uid=bob");
        assert!(config.kick_extraneous);
    }

    #[test]
    fn test_sync_config_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{}}").unwrap();

        let config = SyncConfig::load(f.path()).unwrap();
        assert!(config.divisions.is_empty());
        assert!(config.rooms.is_empty());
        assert!(config.teams.is_empty());
        assert!(!config.kick_extraneous);
    }

    #[test]
    fn test_sync_config_missing_file() {
        let err = SyncConfig::load(Path::new("/nonexistent/teap.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
