//! User lifecycle and membership operations.

use log::warn;

use crate::directory::{GroupRecord, NewUser, OrgUnit};
use crate::chat::ChatUser;
use crate::error::{Error, Result};

use super::structure::{MajorStructure, DIVISION, FRANCHISE};
use super::team::get_everybody_team;
use super::{resolve_structure, Backends};

/// A provisioned person, identified by their directory uid.
#[derive(Debug, Clone)]
pub struct User {
    pub uid: String,
}

impl User {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
        }
    }

    /// Provision a new person: directory entry, "everybody" team
    /// membership, chat account. Fails with a conflict when the uid is
    /// already taken; the chat provisioning result is returned so the
    /// caller can report it.
    pub async fn create(backends: &Backends, new_user: &NewUser) -> Result<ChatUser> {
        backends.directory.add_user(new_user).await?;

        let everybody = get_everybody_team(backends.directory.as_ref()).await?;
        backends
            .directory
            .make_member_of(&new_user.uid, &everybody.fqdn)
            .await?;

        let name = format!("{} {}", new_user.given_name, new_user.surname);
        backends
            .chat
            .create_user(&new_user.uid, &new_user.password, &new_user.mail, &name)
            .await
    }

    /// Remove the person from every directory group, then the directory
    /// itself, then chat. A missing chat account is not an error; a chat
    /// deletion failure after the directory entry is gone is surfaced to
    /// the caller rather than swallowed.
    pub async fn delete(&self, backends: &Backends) -> Result<()> {
        let groups = backends.directory.get_user_groups(&self.uid).await?;
        for group in &groups {
            backends
                .directory
                .remove_member_of(&self.uid, &group.fqdn)
                .await?;
        }
        backends.directory.delete_user(&self.uid).await?;

        match backends.chat.get_user_by_username(&self.uid).await? {
            Some(chat_user) => backends.chat.delete_user(&chat_user.id).await,
            None => Ok(()),
        }
    }

    /// Add the person to a team, then close over the team's component
    /// units: team membership implies membership (and a chat invite) in
    /// both the parent franchise and division. Enforced on every call —
    /// teams are joined in any order relative to structure creation.
    pub async fn add_to_team(&self, backends: &Backends, team_machine_name: &str) -> Result<()> {
        let team = backends.directory.get_team(team_machine_name).await?;
        backends.directory.make_member_of(&self.uid, &team.fqdn).await?;

        let (franchise, division) = backends
            .directory
            .get_team_component_units(team_machine_name)
            .await?;

        self.join_structure(backends, &FRANCHISE, &franchise).await?;
        self.join_structure(backends, &DIVISION, &division).await?;
        Ok(())
    }

    async fn join_structure(
        &self,
        backends: &Backends,
        kind: &'static super::structure::StructureKind,
        record: &GroupRecord,
    ) -> Result<()> {
        let structure = MajorStructure::from_record(kind, record);
        structure.add_user(backends, &self.uid).await?;

        // chat invite; a person without a chat account yet is repaired
        // by the next reconciliation pass
        let room = structure.ensure_chat_room(backends).await?;
        match backends.chat.get_user_by_username(&self.uid).await? {
            Some(chat_user) => {
                backends
                    .chat
                    .invite_user_to_group(&room.id, &chat_user.id)
                    .await
            }
            None => {
                warn!("no chat account for '{}', skipping invite to {}", self.uid, room.name);
                Ok(())
            }
        }
    }

    /// Machine names of the franchises this user belongs to.
    pub async fn get_franchises(&self, backends: &Backends) -> Result<Vec<String>> {
        self.memberships(backends, OrgUnit::Franchises).await
    }

    /// Machine names of the divisions this user belongs to.
    pub async fn get_divisions(&self, backends: &Backends) -> Result<Vec<String>> {
        self.memberships(backends, OrgUnit::Divisions).await
    }

    /// Machine names of the teams this user belongs to.
    pub async fn get_teams(&self, backends: &Backends) -> Result<Vec<String>> {
        self.memberships(backends, OrgUnit::Teams).await
    }

    async fn memberships(&self, backends: &Backends, unit: OrgUnit) -> Result<Vec<String>> {
        let ou = format!("ou={}", unit.ou());
        let groups = backends.directory.get_user_groups(&self.uid).await?;
        Ok(groups
            .into_iter()
            .filter(|g| g.fqdn.contains(&ou))
            .map(|g| g.machine_name)
            .collect())
    }

    /// Move the user between two structures of the same kind: join the
    /// target first, then drop the stale membership.
    pub async fn transfer(
        &self,
        backends: &Backends,
        from: &MajorStructure,
        to: &MajorStructure,
    ) -> Result<()> {
        if from.kind != to.kind {
            return Err(Error::Conflict(format!(
                "cannot transfer between a {} and a {}",
                from.kind.label, to.kind.label
            )));
        }
        to.add_user(backends, &self.uid).await?;
        let old =
            resolve_structure(backends.directory.as_ref(), from.kind.unit, &from.machine_name)
                .await?;
        backends
            .directory
            .remove_member_of(&self.uid, &old.fqdn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::team::EVERYBODY_TEAM;
    use crate::testing::TestBackends;

    fn new_user(uid: &str) -> NewUser {
        NewUser {
            uid: uid.to_string(),
            given_name: "Alice".into(),
            surname: "Schmidt".into(),
            password: "hunter2".into(),
            mail: format!("{}@entint.org", uid),
            mail_aliases: vec![],
            avatar: None,
        }
    }

    #[tokio::test]
    async fn test_create_provisions_directory_team_and_chat() {
        let fixture = TestBackends::new();
        let backends = fixture.backends();

        let chat_user = User::create(&backends, &new_user("alice")).await.unwrap();
        assert_eq!(chat_user.username, "alice");

        assert!(backends.directory.get_user("alice").await.is_ok());
        let everybody = backends.directory.get_team(EVERYBODY_TEAM.0).await.unwrap();
        assert!(everybody.member_uids.contains(&"alice".to_string()));
        assert!(backends
            .chat
            .get_user_by_username("alice")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_create_duplicate_uid_conflicts() {
        let fixture = TestBackends::new();
        fixture.directory.seed_user("alice", "Alice", "Schmidt");
        let backends = fixture.backends();

        let err = User::create(&backends, &new_user("alice")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_memberships_entry_and_chat_account() {
        let fixture = TestBackends::new();
        fixture.directory.seed_user("alice", "Alice", "Schmidt");
        fixture
            .directory
            .seed_group("franchises", "fr", Some("France"), &["alice"]);
        fixture
            .directory
            .seed_group("teams", "everybody", Some("Everybody"), &["alice"]);
        fixture.chat.seed_user("alice");
        let backends = fixture.backends();

        User::new("alice").delete(&backends).await.unwrap();

        assert!(matches!(
            backends.directory.get_user("alice").await,
            Err(Error::NotFound(_))
        ));
        assert!(fixture.directory.group_members("franchises", "fr").is_empty());
        assert!(fixture.directory.group_members("teams", "everybody").is_empty());
        assert!(backends
            .chat
            .get_user_by_username("alice")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_chat_account() {
        let fixture = TestBackends::new();
        fixture.directory.seed_user("bob", "Bob", "Novak");
        let backends = fixture.backends();

        User::new("bob").delete(&backends).await.unwrap();
        assert!(backends.directory.get_user("bob").await.is_err());
    }

    #[tokio::test]
    async fn test_add_to_team_closes_over_component_units() {
        let fixture = TestBackends::new();
        fixture.directory.seed_user("alice", "Alice", "Schmidt");
        fixture
            .directory
            .seed_group("franchises", "fr", Some("France"), &[]);
        fixture.directory.seed_group("divisions", "it", Some("IT"), &[]);
        fixture
            .directory
            .seed_group("teams", "fr-it", Some("France-IT"), &[]);
        fixture.chat.seed_user("alice");
        let backends = fixture.backends();

        let alice = User::new("alice");
        alice.add_to_team(&backends, "fr-it").await.unwrap();

        assert_eq!(alice.get_teams(&backends).await.unwrap(), vec!["fr-it"]);
        assert_eq!(alice.get_franchises(&backends).await.unwrap(), vec!["fr"]);
        assert_eq!(alice.get_divisions(&backends).await.unwrap(), vec!["it"]);

        // chat invites for both parent structures
        let franchise_room = backends
            .chat
            .get_group_by_name("Franchise-France")
            .await
            .unwrap()
            .expect("franchise room");
        let division_room = backends
            .chat
            .get_group_by_name("Division-IT")
            .await
            .unwrap()
            .expect("division room");
        let members_fr = backends.chat.list_group_members(&franchise_room.id).await.unwrap();
        let members_it = backends.chat.list_group_members(&division_room.id).await.unwrap();
        assert_eq!(members_fr.len(), 1);
        assert_eq!(members_it.len(), 1);
        assert_eq!(members_fr[0].username, "alice");
    }

    #[tokio::test]
    async fn test_add_to_team_closure_holds_for_existing_members() {
        let fixture = TestBackends::new();
        fixture.directory.seed_user("alice", "Alice", "Schmidt");
        // alice is already a franchise member before joining the team
        fixture
            .directory
            .seed_group("franchises", "fr", Some("France"), &["alice"]);
        fixture.directory.seed_group("divisions", "it", Some("IT"), &[]);
        fixture
            .directory
            .seed_group("teams", "fr-it", Some("France-IT"), &[]);
        fixture.chat.seed_user("alice");
        let backends = fixture.backends();

        let alice = User::new("alice");
        alice.add_to_team(&backends, "fr-it").await.unwrap();

        assert_eq!(alice.get_franchises(&backends).await.unwrap(), vec!["fr"]);
        assert_eq!(alice.get_divisions(&backends).await.unwrap(), vec!["it"]);
    }

    #[tokio::test]
    async fn test_add_to_team_skips_invite_without_chat_account() {
        let fixture = TestBackends::new();
        fixture.directory.seed_user("bob", "Bob", "Novak");
        fixture
            .directory
            .seed_group("franchises", "fr", Some("France"), &[]);
        fixture.directory.seed_group("divisions", "it", Some("IT"), &[]);
        fixture
            .directory
            .seed_group("teams", "fr-it", Some("France-IT"), &[]);
        let backends = fixture.backends();

        // no chat account: membership still lands, invite is skipped
        User::new("bob").add_to_team(&backends, "fr-it").await.unwrap();
        assert_eq!(fixture.directory.group_members("teams", "fr-it"), vec!["bob"]);
        assert_eq!(fixture.chat.invite_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_between_franchises() {
        let fixture = TestBackends::new();
        fixture
            .directory
            .seed_group("franchises", "fr", Some("France"), &["alice"]);
        fixture
            .directory
            .seed_group("franchises", "cz", Some("Czechia"), &[]);
        let backends = fixture.backends();

        let alice = User::new("alice");
        alice
            .transfer(
                &backends,
                &MajorStructure::franchise("fr", "France"),
                &MajorStructure::franchise("cz", "Czechia"),
            )
            .await
            .unwrap();

        assert!(fixture.directory.group_members("franchises", "fr").is_empty());
        assert_eq!(fixture.directory.group_members("franchises", "cz"), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_transfer_rejects_mixed_kinds() {
        let fixture = TestBackends::new();
        let backends = fixture.backends();
        let err = User::new("alice")
            .transfer(
                &backends,
                &MajorStructure::franchise("fr", "France"),
                &MajorStructure::division("it", "IT"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
