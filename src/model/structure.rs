//! Franchises and divisions: one concrete entity type, parameterized by
//! the structure kind.
//!
//! Creation fans out across all three systems in a fixed order and is
//! deliberately not transactional: a folder step that fails is reported
//! in the outcome and left for the next reconciliation pass, while
//! directory-level failures abort immediately.

use log::warn;

use crate::chat::Room;
use crate::directory::{
    make_team_display_name, make_team_machine_name, DirectoryGateway, GroupRecord, OrgUnit,
};
use crate::error::{Error, Result};
use crate::folders::{FolderGateway, Permission, ADMIN_GROUP, EVERYBODY_GROUP};

use super::{resolve_structure, Backends};

/// Static policy for one classification axis: where its groups live in
/// the directory, what its folder tree is called, how its rooms and
/// restricted groups are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureKind {
    pub label: &'static str,
    pub unit: OrgUnit,
    pub folder_root: &'static str,
    pub dea_suffix: &'static str,
}

pub const FRANCHISE: StructureKind = StructureKind {
    label: "Franchise",
    unit: OrgUnit::Franchises,
    folder_root: "Franchises",
    dea_suffix: " DEA",
};

pub const DIVISION: StructureKind = StructureKind {
    label: "Division",
    unit: OrgUnit::Divisions,
    folder_root: "Divisions",
    dea_suffix: " DEA",
};

impl StructureKind {
    /// The other classification axis.
    pub fn opposite(&self) -> &'static StructureKind {
        match self.unit {
            OrgUnit::Franchises => &DIVISION,
            _ => &FRANCHISE,
        }
    }
}

/// Replace anything a chat server would reject in a room name. Allowed:
/// ASCII alphanumerics, `-`, `_` and `.`.
pub fn sanitize_room_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Success flags for the folder steps of a create.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSteps {
    pub root: bool,
    pub main: bool,
    pub private: bool,
}

/// What `create()` accomplished. Folder flags report partial failure
/// without rolling anything back.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutcome {
    pub chat_room: Option<Room>,
    pub chat_error: Option<String>,
    pub folders: FolderSteps,
}

/// A Franchise or Division.
#[derive(Debug, Clone)]
pub struct MajorStructure {
    pub kind: &'static StructureKind,
    pub machine_name: String,
    pub display_name: String,
}

impl MajorStructure {
    pub fn franchise(machine_name: &str, display_name: &str) -> Self {
        Self {
            kind: &FRANCHISE,
            machine_name: machine_name.to_string(),
            display_name: display_name.to_string(),
        }
    }

    pub fn division(machine_name: &str, display_name: &str) -> Self {
        Self {
            kind: &DIVISION,
            machine_name: machine_name.to_string(),
            display_name: display_name.to_string(),
        }
    }

    pub fn from_record(kind: &'static StructureKind, record: &GroupRecord) -> Self {
        Self {
            kind,
            machine_name: record.machine_name.clone(),
            display_name: record
                .display_name
                .clone()
                .unwrap_or_else(|| record.machine_name.clone()),
        }
    }

    pub fn dea_machine_name(&self) -> String {
        format!("{}-dea", self.machine_name)
    }

    pub fn dea_display_name(&self) -> String {
        format!("{}{}", self.display_name, self.kind.dea_suffix)
    }

    pub fn chat_name(&self) -> String {
        sanitize_room_name(&format!("{}-{}", self.kind.label, self.display_name))
    }

    pub fn main_folder_path(&self) -> String {
        format!(
            "{}/{}",
            self.kind.folder_root,
            self.machine_name.to_uppercase()
        )
    }

    pub fn private_folder_path(&self) -> String {
        format!("{}/DEA", self.main_folder_path())
    }

    /// Create this structure everywhere it needs to exist.
    ///
    /// Order: uniqueness check, DEA group, primary group, one team per
    /// existing entity of the other axis, chat room, folder tree. A
    /// duplicate display name fails fast with zero side effects.
    pub async fn create(&self, backends: &Backends) -> Result<CreateOutcome> {
        self.check_display_name_free(backends.directory.as_ref())
            .await?;

        backends
            .directory
            .create_group(&self.dea_machine_name(), &self.dea_display_name())
            .await?;
        backends
            .directory
            .create_structure(self.kind.unit, &self.machine_name, &self.display_name)
            .await?;
        self.create_teams(backends.directory.as_ref()).await?;

        // the folder grants below reference the groups just created
        if let Err(e) = backends.folders.flush_identity_cache().await {
            warn!("{} {}: identity cache flush failed: {}", self.kind.label, self.machine_name, e);
        }

        let (chat_room, chat_error) = match backends.chat.create_group(&self.chat_name()).await {
            Ok(room) => (Some(room), None),
            Err(e) => {
                warn!("{} {}: chat room creation failed: {}", self.kind.label, self.machine_name, e);
                (None, Some(e.to_string()))
            }
        };

        let folders = self.create_folder_tree(backends.folders.as_ref()).await;

        Ok(CreateOutcome {
            chat_room,
            chat_error,
            folders,
        })
    }

    /// Duplicate display names collide in the directory description
    /// field; refuse before touching anything.
    async fn check_display_name_free(&self, directory: &dyn DirectoryGateway) -> Result<()> {
        let search = format!("description={}", self.display_name);
        let existing = directory
            .get_structures(self.kind.unit, Some(&search))
            .await?;
        if existing.is_empty() {
            Ok(())
        } else {
            Err(Error::Conflict(format!(
                "a {} named '{}' already exists",
                self.kind.label, self.display_name
            )))
        }
    }

    /// One team per entity of the other axis present right now. The
    /// reverse direction is covered when that axis gains entities.
    async fn create_teams(&self, directory: &dyn DirectoryGateway) -> Result<()> {
        let others = directory
            .get_structures(self.kind.opposite().unit, None)
            .await?;
        for other in &others {
            let other_display = other
                .display_name
                .clone()
                .unwrap_or_else(|| other.machine_name.clone());
            let (machine, display) = if self.kind.unit == OrgUnit::Franchises {
                (
                    make_team_machine_name(&self.machine_name, &other.machine_name),
                    make_team_display_name(&self.display_name, &other_display),
                )
            } else {
                (
                    make_team_machine_name(&other.machine_name, &self.machine_name),
                    make_team_display_name(&other_display, &self.display_name),
                )
            };
            directory.create_team(&machine, &display).await?;
        }
        Ok(())
    }

    async fn create_folder_tree(&self, folders: &dyn FolderGateway) -> FolderSteps {
        let mut steps = FolderSteps::default();

        steps.root = match self.ensure_root_folder(folders).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{} root folder: {}", self.kind.folder_root, e);
                false
            }
        };

        let display = self.display_name.clone();
        steps.main = match create_folder_with_grants(
            folders,
            &self.main_folder_path(),
            &[
                (ADMIN_GROUP, Permission::All),
                (EVERYBODY_GROUP, Permission::Read),
                (&display, Permission::All),
            ],
        )
        .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("folder {}: {}", self.main_folder_path(), e);
                false
            }
        };

        let dea = self.dea_display_name();
        steps.private = match create_folder_with_grants(
            folders,
            &self.private_folder_path(),
            &[
                (ADMIN_GROUP, Permission::All),
                (&display, Permission::Read),
                (&dea, Permission::All),
            ],
        )
        .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("folder {}: {}", self.private_folder_path(), e);
                false
            }
        };

        steps
    }

    /// The per-kind root folder is shared by every structure of the kind
    /// and must carry its grants before any child folder appears under
    /// it. Check-then-act; safe to repeat.
    async fn ensure_root_folder(&self, folders: &dyn FolderGateway) -> Result<()> {
        let existing = folders.list_group_folders().await?;
        if existing
            .values()
            .any(|f| f.mount_point == self.kind.folder_root)
        {
            return Ok(());
        }
        create_folder_with_grants(
            folders,
            self.kind.folder_root,
            &[
                (ADMIN_GROUP, Permission::All),
                (EVERYBODY_GROUP, Permission::Read),
            ],
        )
        .await?;
        Ok(())
    }

    /// Whether this structure's main folder already exists.
    pub async fn folder_exists(&self, folders: &dyn FolderGateway) -> Result<bool> {
        let existing = folders.list_group_folders().await?;
        Ok(existing
            .values()
            .any(|f| f.mount_point == self.main_folder_path()))
    }

    /// Resolve the chat room, creating it if it is missing. Fails if the
    /// room still cannot be found after a successful create.
    pub async fn ensure_chat_room(&self, backends: &Backends) -> Result<Room> {
        let name = self.chat_name();
        if let Some(room) = backends.chat.get_group_by_name(&name).await? {
            return Ok(room);
        }
        backends.chat.create_group(&name).await?;
        backends
            .chat
            .get_group_by_name(&name)
            .await?
            .ok_or_else(|| {
                Error::Transport(format!(
                    "room '{}' not found although it has just been created",
                    name
                ))
            })
    }

    /// Add a user to this structure's directory group, lazily repairing
    /// the chat room and folder if either is missing. Does not touch the
    /// user's memberships in other structures of the same kind.
    pub async fn add_user(&self, backends: &Backends, uid: &str) -> Result<()> {
        let record =
            resolve_structure(backends.directory.as_ref(), self.kind.unit, &self.machine_name)
                .await?;
        backends.directory.make_member_of(uid, &record.fqdn).await?;

        self.ensure_chat_room(backends).await?;

        if !self.folder_exists(backends.folders.as_ref()).await? {
            self.ensure_root_folder(backends.folders.as_ref()).await?;
            let display = self.display_name.clone();
            create_folder_with_grants(
                backends.folders.as_ref(),
                &self.main_folder_path(),
                &[
                    (ADMIN_GROUP, Permission::All),
                    (EVERYBODY_GROUP, Permission::Read),
                    (&display, Permission::All),
                ],
            )
            .await?;
        }
        Ok(())
    }
}

async fn create_folder_with_grants(
    folders: &dyn FolderGateway,
    path: &str,
    grants: &[(&str, Permission)],
) -> Result<i64> {
    let folder_id = folders.create_group_folder(path).await?;
    for (group, level) in grants {
        folders.grant_access(folder_id, group).await?;
        folders.set_permission(folder_id, group, *level).await?;
    }
    Ok(folder_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_room_name() {
        assert_eq!(sanitize_room_name("Franchise-France"), "Franchise-France");
        assert_eq!(sanitize_room_name("Division-R&D"), "Division-R-D");
        assert_eq!(sanitize_room_name("a b/c"), "a-b-c");
        assert_eq!(sanitize_room_name("ok_name.v2"), "ok_name.v2");
    }

    #[test]
    fn test_naming_policy() {
        let franchise = MajorStructure::franchise("fr", "France");
        assert_eq!(franchise.chat_name(), "Franchise-France");
        assert_eq!(franchise.main_folder_path(), "Franchises/FR");
        assert_eq!(franchise.private_folder_path(), "Franchises/FR/DEA");
        assert_eq!(franchise.dea_machine_name(), "fr-dea");
        assert_eq!(franchise.dea_display_name(), "France DEA");

        let division = MajorStructure::division("it", "IT");
        assert_eq!(division.chat_name(), "Division-IT");
        assert_eq!(division.main_folder_path(), "Divisions/IT");
    }

    #[test]
    fn test_opposite_kind() {
        assert_eq!(FRANCHISE.opposite(), &DIVISION);
        assert_eq!(DIVISION.opposite(), &FRANCHISE);
    }

    #[test]
    fn test_from_record_falls_back_to_machine_name() {
        let record = GroupRecord {
            fqdn: "cn=qwe,ou=divisions,dc=entint,dc=org".into(),
            machine_name: "qwe".into(),
            display_name: None,
            member_uids: vec![],
            attributes: Default::default(),
        };
        let structure = MajorStructure::from_record(&DIVISION, &record);
        assert_eq!(structure.display_name, "qwe");
    }

    use crate::testing::TestBackends;

    #[tokio::test]
    async fn test_create_franchise_end_to_end() {
        let fixture = TestBackends::new();
        fixture.directory.seed_group("divisions", "it", Some("IT"), &[]);
        let backends = fixture.backends();

        let franchise = MajorStructure::franchise("fr", "France");
        let outcome = franchise.create(&backends).await.unwrap();

        // chat room created and echoed in the outcome
        let room = outcome.chat_room.expect("chat room");
        assert_eq!(room.name, "Franchise-France");
        assert!(outcome.chat_error.is_none());
        assert!(outcome.folders.root && outcome.folders.main && outcome.folders.private);

        // exactly one team for the one existing division
        let team = backends.directory.get_team("fr-it").await.unwrap();
        assert_eq!(team.display_name.as_deref(), Some("France-IT"));
        assert_eq!(backends.directory.get_teams(None).await.unwrap().len(), 1);

        // folder tree with the prescribed grants
        let root = fixture.folders.folder_by_path("Franchises").expect("root folder");
        assert_eq!(root.groups[ADMIN_GROUP], Permission::All.bitmask());
        assert_eq!(root.groups[EVERYBODY_GROUP], Permission::Read.bitmask());

        let main = fixture.folders.folder_by_path("Franchises/FR").expect("main folder");
        assert_eq!(main.groups[ADMIN_GROUP], Permission::All.bitmask());
        assert_eq!(main.groups[EVERYBODY_GROUP], Permission::Read.bitmask());
        assert_eq!(main.groups["France"], Permission::All.bitmask());

        let private = fixture
            .folders
            .folder_by_path("Franchises/FR/DEA")
            .expect("private folder");
        assert_eq!(private.groups[ADMIN_GROUP], Permission::All.bitmask());
        assert_eq!(private.groups["France"], Permission::Read.bitmask());
        assert_eq!(private.groups["France DEA"], Permission::All.bitmask());

        // DEA directory group exists
        assert!(backends.directory.get_group("fr-dea").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_covers_both_axes() {
        let fixture = TestBackends::new();
        let backends = fixture.backends();

        // franchise first: no divisions yet, so no teams
        MajorStructure::franchise("fr", "France")
            .create(&backends)
            .await
            .unwrap();
        assert!(backends.directory.get_teams(None).await.unwrap().is_empty());

        // division later: the reverse direction materializes the product
        MajorStructure::division("it", "IT")
            .create(&backends)
            .await
            .unwrap();
        let team = backends.directory.get_team("fr-it").await.unwrap();
        assert_eq!(team.display_name.as_deref(), Some("France-IT"));
    }

    #[tokio::test]
    async fn test_duplicate_display_name_has_no_side_effects() {
        let fixture = TestBackends::new();
        fixture
            .directory
            .seed_group("franchises", "fr", Some("France"), &[]);
        let backends = fixture.backends();

        let err = MajorStructure::franchise("fr2", "France")
            .create(&backends)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        assert_eq!(fixture.directory.mutation_count(), 0);
        assert!(fixture.chat.created_rooms.lock().unwrap().is_empty());
        assert!(fixture.folders.created_paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_reports_folder_failure_without_rollback() {
        let fixture = TestBackends::new();
        // root folder creation will work, but chat is down
        fixture.chat.fail_on("create_group");
        let backends = fixture.backends();

        let outcome = MajorStructure::franchise("fr", "France")
            .create(&backends)
            .await
            .unwrap();

        assert!(outcome.chat_room.is_none());
        assert!(outcome.chat_error.is_some());
        // directory and folder work still happened
        assert_eq!(backends.directory.get_franchises(None).await.unwrap().len(), 1);
        assert!(fixture.folders.folder_by_path("Franchises/FR").is_some());
    }

    #[tokio::test]
    async fn test_add_user_lazily_repairs_room_and_folder() {
        let fixture = TestBackends::new();
        fixture
            .directory
            .seed_group("franchises", "fr", Some("France"), &[]);
        let backends = fixture.backends();

        let franchise = MajorStructure::franchise("fr", "France");
        franchise.add_user(&backends, "alice").await.unwrap();

        assert_eq!(
            fixture.directory.group_members("franchises", "fr"),
            vec!["alice".to_string()]
        );
        assert!(backends
            .chat
            .get_group_by_name("Franchise-France")
            .await
            .unwrap()
            .is_some());
        assert!(fixture.folders.folder_by_path("Franchises/FR").is_some());

        // repeat is safe and does not duplicate anything
        franchise.add_user(&backends, "alice").await.unwrap();
        assert_eq!(fixture.directory.group_members("franchises", "fr").len(), 1);
    }
}
