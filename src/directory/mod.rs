//! Capability interface to the identity directory (edap service).
//!
//! The directory is the source of truth for users, groups and the two
//! classification axes (franchises, divisions) plus their intersection
//! teams. Everything else in the crate reads organizational state from
//! here and pushes it outward to chat and folders.

pub mod client;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client::EdapClient;

/// The organizational units structures live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgUnit {
    Franchises,
    Divisions,
    Teams,
}

impl OrgUnit {
    /// The `ou=` component of entries under this unit.
    pub fn ou(&self) -> &'static str {
        match self {
            OrgUnit::Franchises => "franchises",
            OrgUnit::Divisions => "divisions",
            OrgUnit::Teams => "teams",
        }
    }
}

/// A directory user entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub fqdn: String,
    pub uid: String,
    pub given_name: String,
    pub surname: String,
    #[serde(default)]
    pub mail: Vec<String>,
}

impl UserRecord {
    pub fn name(&self) -> String {
        format!("{} {}", self.given_name, self.surname)
    }
}

/// A directory group entry. `machine_name` is the `cn`, `display_name`
/// the `description` (absent on groups nobody labelled). The raw
/// multi-valued attribute payload is carried alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub fqdn: String,
    pub machine_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub member_uids: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Attributes for a new directory user. `mail` is the primary address
/// (also used to provision the chat account); `mail_aliases` land in the
/// same multi-valued directory attribute.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uid: String,
    pub given_name: String,
    pub surname: String,
    pub password: String,
    pub mail: String,
    pub mail_aliases: Vec<String>,
    pub avatar: Option<Vec<u8>>,
}

/// Team machine name for a (franchise, division) pair: `fr` + `it` → `fr-it`.
pub fn make_team_machine_name(franchise: &str, division: &str) -> String {
    format!("{}-{}", franchise, division)
}

/// Team display name for a (franchise, division) pair: `France` + `IT` → `France-IT`.
pub fn make_team_display_name(franchise: &str, division: &str) -> String {
    format!("{}-{}", franchise, division)
}

/// Narrow capability interface to the directory.
///
/// Lookups fail with [`crate::error::Error::NotFound`] when the entry is
/// absent and [`crate::error::Error::Ambiguous`] when a search expected to
/// match one entry matched several. Creations fail with
/// [`crate::error::Error::Conflict`] on collisions.
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    async fn get_user(&self, uid: &str) -> Result<UserRecord>;
    async fn add_user(&self, user: &NewUser) -> Result<()>;
    async fn delete_user(&self, uid: &str) -> Result<()>;
    async fn modify_user(&self, uid: &str, field: &str, value: &str) -> Result<()>;
    async fn verify_password(&self, uid: &str, password: &str) -> Result<bool>;

    /// Groups matching an optional `cn=`/`description=` style filter.
    async fn get_groups(&self, search: Option<&str>) -> Result<Vec<GroupRecord>>;
    async fn get_group(&self, name: &str) -> Result<GroupRecord>;

    /// Create a plain group outside the structure units (e.g. a DEA
    /// group gating a private folder).
    async fn create_group(&self, machine_name: &str, display_name: &str) -> Result<()>;

    /// All groups the user is a member of, across every organizational unit.
    async fn get_user_groups(&self, uid: &str) -> Result<Vec<GroupRecord>>;

    async fn make_member_of(&self, uid: &str, group_fqdn: &str) -> Result<()>;
    async fn remove_member_of(&self, uid: &str, group_fqdn: &str) -> Result<()>;

    async fn get_franchises(&self, search: Option<&str>) -> Result<Vec<GroupRecord>>;
    async fn create_franchise(&self, machine_name: &str, display_name: &str) -> Result<()>;
    async fn delete_franchise(&self, machine_name: &str) -> Result<()>;

    async fn get_divisions(&self, search: Option<&str>) -> Result<Vec<GroupRecord>>;
    async fn create_division(&self, machine_name: &str, display_name: &str) -> Result<()>;
    async fn delete_division(&self, machine_name: &str) -> Result<()>;

    async fn get_teams(&self, search: Option<&str>) -> Result<Vec<GroupRecord>>;
    async fn get_team(&self, machine_name: &str) -> Result<GroupRecord>;
    async fn create_team(&self, machine_name: &str, display_name: &str) -> Result<()>;
    async fn delete_team(&self, machine_name: &str) -> Result<()>;

    /// The (franchise, division) pair a team is the intersection of.
    async fn get_team_component_units(
        &self,
        team_machine_name: &str,
    ) -> Result<(GroupRecord, GroupRecord)>;

    /// Uids of every user under an organizational unit (e.g. `people`).
    async fn get_uids_member_of_ou(&self, ou: &str) -> Result<Vec<String>>;

    /// Uids that are members of one group under the given unit.
    async fn get_uids_member_of_group(
        &self,
        unit: OrgUnit,
        machine_name: &str,
    ) -> Result<Vec<String>>;

    /// Dispatch helper so kind-parameterized code does not match on the
    /// unit at every call site.
    async fn get_structures(&self, unit: OrgUnit, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        match unit {
            OrgUnit::Franchises => self.get_franchises(search).await,
            OrgUnit::Divisions => self.get_divisions(search).await,
            OrgUnit::Teams => self.get_teams(search).await,
        }
    }

    async fn create_structure(
        &self,
        unit: OrgUnit,
        machine_name: &str,
        display_name: &str,
    ) -> Result<()> {
        match unit {
            OrgUnit::Franchises => self.create_franchise(machine_name, display_name).await,
            OrgUnit::Divisions => self.create_division(machine_name, display_name).await,
            OrgUnit::Teams => self.create_team(machine_name, display_name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_naming() {
        assert_eq!(make_team_machine_name("fr", "it"), "fr-it");
        assert_eq!(make_team_display_name("France", "IT"), "France-IT");
    }

    #[test]
    fn test_org_unit_ou() {
        assert_eq!(OrgUnit::Franchises.ou(), "franchises");
        assert_eq!(OrgUnit::Divisions.ou(), "divisions");
        assert_eq!(OrgUnit::Teams.ou(), "teams");
    }

    #[test]
    fn test_user_record_name() {
        let user = UserRecord {
            fqdn: "uid=alice,ou=people,dc=entint,dc=org".into(),
            uid: "alice".into(),
            given_name: "Alice".into(),
            surname: "Schmidt".into(),
            mail: vec!["alice@entint.org".into()],
        };
        assert_eq!(user.name(), "Alice Schmidt");
    }
}
