//! Capability interface to the file-sharing platform (Nextcloud group
//! folders).
//!
//! Access to a group folder is controlled by directory-group membership:
//! a grant is the triple (folder, group id, permission level). The two
//! well-known group ids below must exist on the platform side.

pub mod client;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client::NextcloudClient;

/// Group id holding full control over every managed folder.
pub const ADMIN_GROUP: &str = "admin";

/// Group id every provisioned user belongs to on the file-sharing side.
pub const EVERYBODY_GROUP: &str = "Everybody";

/// Permission levels the core grants. The platform stores a bitmask;
/// only these two combinations are ever handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    Read,
    All,
}

impl Permission {
    pub fn bitmask(&self) -> u32 {
        match self {
            Permission::Read => 1,
            Permission::All => 31,
        }
    }
}

/// One group folder as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupFolder {
    pub id: i64,
    pub mount_point: String,
    /// Group id → permission bitmask.
    #[serde(default)]
    pub groups: BTreeMap<String, u32>,
}

/// Narrow capability interface to the file-sharing platform.
#[async_trait]
pub trait FolderGateway: Send + Sync {
    /// Create a group folder mounted at `path`. Returns the folder id.
    async fn create_group_folder(&self, path: &str) -> Result<i64>;

    /// Give a group access to a folder (at the platform's default level).
    async fn grant_access(&self, folder_id: i64, group_id: &str) -> Result<()>;

    /// Set a group's permission level on a folder it has access to.
    async fn set_permission(
        &self,
        folder_id: i64,
        group_id: &str,
        level: Permission,
    ) -> Result<()>;

    /// All group folders, keyed by folder id.
    async fn list_group_folders(&self) -> Result<BTreeMap<i64, GroupFolder>>;

    /// Drop the platform's cached view of directory users/groups so
    /// entries created moments ago are visible.
    async fn flush_identity_cache(&self) -> Result<()>;
}
