//! In-memory gateway fakes for tests.
//!
//! Each fake keeps its state behind a mutex and records mutating calls
//! so tests can assert on side effects (or their absence). Semantics
//! mirror the real platforms where the core depends on them: exact-name
//! room lookup, idempotent invites, uniqueness conflicts on create.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chat::{ChatGateway, ChatUser, Room};
use crate::directory::{
    make_team_machine_name, DirectoryGateway, GroupRecord, NewUser, OrgUnit, UserRecord,
};
use crate::error::{Error, Result};
use crate::folders::{FolderGateway, GroupFolder, Permission};

const DOMAIN: &str = "dc=entint,dc=org";

fn group_fqdn(ou: &str, cn: &str) -> String {
    format!("cn={},ou={},{}", cn, ou, DOMAIN)
}

/// Parse `cn=<cn>,ou=<ou>,...` back into its components.
fn parse_group_fqdn(fqdn: &str) -> Option<(String, String)> {
    let mut cn = None;
    let mut ou = None;
    for part in fqdn.split(',') {
        if let Some(value) = part.strip_prefix("cn=") {
            cn = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix("ou=") {
            ou = Some(value.to_string());
        }
    }
    Some((ou?, cn?))
}

#[derive(Debug, Clone, Default)]
struct FakeGroup {
    display_name: Option<String>,
    members: BTreeSet<String>,
}

#[derive(Default)]
struct DirectoryState {
    users: BTreeMap<String, UserRecord>,
    /// ou name → cn → group. Structure units and plain groups alike.
    groups: BTreeMap<String, BTreeMap<String, FakeGroup>>,
}

/// Directory fake. `mutations` records every state-changing call as
/// `"<op> <target>"`.
#[derive(Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
    pub mutations: Mutex<Vec<String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    fn log_mutation(&self, op: &str, target: &str) {
        self.mutations.lock().unwrap().push(format!("{} {}", op, target));
    }

    /// Seed a group without going through `create_*` (so tests can set
    /// up state without touching the mutation log).
    pub fn seed_group(&self, ou: &str, cn: &str, display_name: Option<&str>, members: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.groups.entry(ou.to_string()).or_default().insert(
            cn.to_string(),
            FakeGroup {
                display_name: display_name.map(str::to_string),
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        );
    }

    pub fn seed_user(&self, uid: &str, given_name: &str, surname: &str) {
        let mut state = self.state.lock().unwrap();
        state.users.insert(
            uid.to_string(),
            UserRecord {
                fqdn: format!("uid={},ou=people,{}", uid, DOMAIN),
                uid: uid.to_string(),
                given_name: given_name.to_string(),
                surname: surname.to_string(),
                mail: vec![format!("{}@entint.org", uid)],
            },
        );
    }

    pub fn group_members(&self, ou: &str, cn: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .get(ou)
            .and_then(|groups| groups.get(cn))
            .map(|g| g.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn to_record(ou: &str, cn: &str, group: &FakeGroup) -> GroupRecord {
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        attributes.insert("cn".into(), vec![cn.to_string()]);
        if let Some(ref display) = group.display_name {
            attributes.insert("description".into(), vec![display.clone()]);
        }
        if !group.members.is_empty() {
            attributes.insert("memberUid".into(), group.members.iter().cloned().collect());
        }
        GroupRecord {
            fqdn: group_fqdn(ou, cn),
            machine_name: cn.to_string(),
            display_name: group.display_name.clone(),
            member_uids: group.members.iter().cloned().collect(),
            attributes,
        }
    }

    /// Exact `cn=` / `description=` filters, plus `cn=prefix*`.
    fn matches(search: Option<&str>, cn: &str, group: &FakeGroup) -> bool {
        let Some(search) = search else { return true };
        if let Some(wanted) = search.strip_prefix("cn=") {
            match wanted.strip_suffix('*') {
                Some(prefix) => cn.starts_with(prefix),
                None => cn == wanted,
            }
        } else if let Some(wanted) = search.strip_prefix("description=") {
            group.display_name.as_deref() == Some(wanted)
        } else {
            false
        }
    }

    fn unit_records(&self, ou: &str, search: Option<&str>) -> Vec<GroupRecord> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .get(ou)
            .map(|groups| {
                groups
                    .iter()
                    .filter(|(cn, group)| Self::matches(search, cn, group))
                    .map(|(cn, group)| Self::to_record(ou, cn, group))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn create_in(&self, ou: &str, machine_name: &str, display_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let groups = state.groups.entry(ou.to_string()).or_default();
        if groups.contains_key(machine_name) {
            return Err(Error::Conflict(format!("cn={} exists in ou={}", machine_name, ou)));
        }
        groups.insert(
            machine_name.to_string(),
            FakeGroup {
                display_name: Some(display_name.to_string()),
                members: BTreeSet::new(),
            },
        );
        drop(state);
        self.log_mutation("create", &group_fqdn(ou, machine_name));
        Ok(())
    }

    fn delete_in(&self, ou: &str, machine_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let removed = state
            .groups
            .get_mut(ou)
            .and_then(|groups| groups.remove(machine_name));
        drop(state);
        if removed.is_none() {
            return Err(Error::NotFound(group_fqdn(ou, machine_name)));
        }
        self.log_mutation("delete", &group_fqdn(ou, machine_name));
        Ok(())
    }

    fn one_of(&self, ou: &str, machine_name: &str) -> Result<GroupRecord> {
        let records = self.unit_records(ou, Some(&format!("cn={}", machine_name)));
        match records.len() {
            0 => Err(Error::NotFound(group_fqdn(ou, machine_name))),
            1 => Ok(records.into_iter().next().unwrap()),
            n => Err(Error::Ambiguous(format!("cn={} matched {}", machine_name, n))),
        }
    }
}

#[async_trait]
impl DirectoryGateway for InMemoryDirectory {
    async fn get_user(&self, uid: &str) -> Result<UserRecord> {
        let state = self.state.lock().unwrap();
        state
            .users
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("uid={}", uid)))
    }

    async fn add_user(&self, user: &NewUser) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(&user.uid) {
            return Err(Error::Conflict(format!("uid={} exists", user.uid)));
        }
        let mut mail = vec![user.mail.clone()];
        mail.extend(user.mail_aliases.iter().cloned());
        state.users.insert(
            user.uid.clone(),
            UserRecord {
                fqdn: format!("uid={},ou=people,{}", user.uid, DOMAIN),
                uid: user.uid.clone(),
                given_name: user.given_name.clone(),
                surname: user.surname.clone(),
                mail,
            },
        );
        drop(state);
        self.log_mutation("add_user", &user.uid);
        Ok(())
    }

    async fn delete_user(&self, uid: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.users.remove(uid).is_none() {
            return Err(Error::NotFound(format!("uid={}", uid)));
        }
        drop(state);
        self.log_mutation("delete_user", uid);
        Ok(())
    }

    async fn modify_user(&self, uid: &str, _field: &str, _value: &str) -> Result<()> {
        self.get_user(uid).await?;
        self.log_mutation("modify_user", uid);
        Ok(())
    }

    async fn verify_password(&self, uid: &str, _password: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().users.contains_key(uid))
    }

    async fn get_groups(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        let state = self.state.lock().unwrap();
        let mut records = Vec::new();
        for (ou, groups) in state.groups.iter() {
            for (cn, group) in groups {
                if Self::matches(search, cn, group) {
                    records.push(Self::to_record(ou, cn, group));
                }
            }
        }
        Ok(records)
    }

    async fn get_group(&self, name: &str) -> Result<GroupRecord> {
        let records = self.get_groups(Some(&format!("cn={}", name))).await?;
        match records.len() {
            0 => Err(Error::NotFound(format!("cn={}", name))),
            1 => Ok(records.into_iter().next().unwrap()),
            n => Err(Error::Ambiguous(format!("cn={} matched {}", name, n))),
        }
    }

    async fn create_group(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_in("groups", machine_name, display_name)
    }

    async fn get_user_groups(&self, uid: &str) -> Result<Vec<GroupRecord>> {
        let state = self.state.lock().unwrap();
        let mut records = Vec::new();
        for (ou, groups) in state.groups.iter() {
            for (cn, group) in groups {
                if group.members.contains(uid) {
                    records.push(Self::to_record(ou, cn, group));
                }
            }
        }
        Ok(records)
    }

    async fn make_member_of(&self, uid: &str, group_fqdn: &str) -> Result<()> {
        let (ou, cn) = parse_group_fqdn(group_fqdn)
            .ok_or_else(|| Error::NotFound(group_fqdn.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(&ou)
            .and_then(|groups| groups.get_mut(&cn))
            .ok_or_else(|| Error::NotFound(group_fqdn.to_string()))?;
        group.members.insert(uid.to_string());
        drop(state);
        self.log_mutation("make_member_of", group_fqdn);
        Ok(())
    }

    async fn remove_member_of(&self, uid: &str, group_fqdn: &str) -> Result<()> {
        let (ou, cn) = parse_group_fqdn(group_fqdn)
            .ok_or_else(|| Error::NotFound(group_fqdn.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(&ou)
            .and_then(|groups| groups.get_mut(&cn))
            .ok_or_else(|| Error::NotFound(group_fqdn.to_string()))?;
        group.members.remove(uid);
        drop(state);
        self.log_mutation("remove_member_of", group_fqdn);
        Ok(())
    }

    async fn get_franchises(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        Ok(self.unit_records("franchises", search))
    }

    async fn create_franchise(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_in("franchises", machine_name, display_name)
    }

    async fn delete_franchise(&self, machine_name: &str) -> Result<()> {
        self.delete_in("franchises", machine_name)
    }

    async fn get_divisions(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        Ok(self.unit_records("divisions", search))
    }

    async fn create_division(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_in("divisions", machine_name, display_name)
    }

    async fn delete_division(&self, machine_name: &str) -> Result<()> {
        self.delete_in("divisions", machine_name)
    }

    async fn get_teams(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        Ok(self.unit_records("teams", search))
    }

    async fn get_team(&self, machine_name: &str) -> Result<GroupRecord> {
        self.one_of("teams", machine_name)
    }

    async fn create_team(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_in("teams", machine_name, display_name)
    }

    async fn delete_team(&self, machine_name: &str) -> Result<()> {
        self.delete_in("teams", machine_name)
    }

    async fn get_team_component_units(
        &self,
        team_machine_name: &str,
    ) -> Result<(GroupRecord, GroupRecord)> {
        let franchises = self.unit_records("franchises", None);
        let divisions = self.unit_records("divisions", None);
        for franchise in &franchises {
            for division in &divisions {
                let expected =
                    make_team_machine_name(&franchise.machine_name, &division.machine_name);
                if expected == team_machine_name {
                    return Ok((franchise.clone(), division.clone()));
                }
            }
        }
        Err(Error::NotFound(format!(
            "component units of team {}",
            team_machine_name
        )))
    }

    async fn get_uids_member_of_ou(&self, ou: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if ou == "people" {
            return Ok(state.users.keys().cloned().collect());
        }
        let mut uids = BTreeSet::new();
        if let Some(groups) = state.groups.get(ou) {
            for group in groups.values() {
                uids.extend(group.members.iter().cloned());
            }
        }
        Ok(uids.into_iter().collect())
    }

    async fn get_uids_member_of_group(
        &self,
        unit: OrgUnit,
        machine_name: &str,
    ) -> Result<Vec<String>> {
        Ok(self.one_of(unit.ou(), machine_name)?.member_uids)
    }
}

#[derive(Debug, Clone, Default)]
struct FakeRoom {
    id: String,
    member_ids: BTreeSet<String>,
}

#[derive(Default)]
struct ChatState {
    users: BTreeMap<String, ChatUser>,
    channels: BTreeMap<String, FakeRoom>,
    groups: BTreeMap<String, FakeRoom>,
    next_id: u32,
}

/// Chat fake. Invites and kicks are recorded as `(room_id, user_id)`
/// pairs; method names listed in `failing` return a transport error.
#[derive(Default)]
pub struct InMemoryChat {
    state: Mutex<ChatState>,
    pub invites: Mutex<Vec<(String, String)>>,
    pub kicks: Mutex<Vec<(String, String)>>,
    pub created_rooms: Mutex<Vec<String>>,
    pub failing: Mutex<BTreeSet<&'static str>>,
}

impl InMemoryChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    fn check_failure(&self, method: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(method) {
            return Err(Error::Transport(format!("{}: connection reset", method)));
        }
        Ok(())
    }

    pub fn seed_user(&self, username: &str) -> ChatUser {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let user = ChatUser {
            id: format!("U{:04}", state.next_id),
            username: username.to_string(),
            name: None,
        };
        state.users.insert(username.to_string(), user.clone());
        user
    }

    /// Usernames currently in the named group room.
    pub fn group_member_names(&self, name: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let Some(room) = state.groups.get(name) else {
            return Vec::new();
        };
        state
            .users
            .values()
            .filter(|u| room.member_ids.contains(&u.id))
            .map(|u| u.username.clone())
            .collect()
    }

    pub fn invite_count(&self) -> usize {
        self.invites.lock().unwrap().len()
    }

    pub fn kick_count(&self) -> usize {
        self.kicks.lock().unwrap().len()
    }

    fn create_room(
        &self,
        kind: &'static str,
        name: &str,
    ) -> Result<Room> {
        self.check_failure(if kind == "channel" {
            "create_channel"
        } else {
            "create_group"
        })?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("R{:04}", state.next_id);
        let rooms = if kind == "channel" {
            &mut state.channels
        } else {
            &mut state.groups
        };
        if rooms.contains_key(name) {
            return Err(Error::Transport(format!("{} '{}' exists", kind, name)));
        }
        rooms.insert(
            name.to_string(),
            FakeRoom {
                id: id.clone(),
                member_ids: BTreeSet::new(),
            },
        );
        drop(state);
        self.created_rooms.lock().unwrap().push(name.to_string());
        Ok(Room {
            id,
            name: name.to_string(),
        })
    }

    fn with_group_room<T>(
        &self,
        room_id: &str,
        f: impl FnOnce(&mut FakeRoom) -> T,
    ) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let ChatState {
            channels, groups, ..
        } = &mut *state;
        let room = channels
            .values_mut()
            .chain(groups.values_mut())
            .find(|room| room.id == room_id)
            .ok_or_else(|| Error::Transport(format!("room {} not found", room_id)))?;
        Ok(f(room))
    }
}

#[async_trait]
impl ChatGateway for InMemoryChat {
    async fn create_user(
        &self,
        username: &str,
        _password: &str,
        _email: &str,
        name: &str,
    ) -> Result<ChatUser> {
        self.check_failure("create_user")?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let user = ChatUser {
            id: format!("U{:04}", state.next_id),
            username: username.to_string(),
            name: Some(name.to_string()),
        };
        state.users.insert(username.to_string(), user.clone());
        Ok(user)
    }

    async fn delete_user(&self, chat_user_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.users.retain(|_, user| user.id != chat_user_id);
        Ok(())
    }

    async fn create_channel(&self, name: &str) -> Result<Room> {
        self.create_room("channel", name)
    }

    async fn create_group(&self, name: &str) -> Result<Room> {
        self.create_room("group", name)
    }

    async fn get_channel_by_name(&self, name: &str) -> Result<Option<Room>> {
        let state = self.state.lock().unwrap();
        Ok(state.channels.get(name).map(|room| Room {
            id: room.id.clone(),
            name: name.to_string(),
        }))
    }

    async fn get_group_by_name(&self, name: &str) -> Result<Option<Room>> {
        let state = self.state.lock().unwrap();
        Ok(state.groups.get(name).map(|room| Room {
            id: room.id.clone(),
            name: name.to_string(),
        }))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<ChatUser>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.get(username).cloned())
    }

    async fn invite_user_to_channel(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.check_failure("invite_user_to_channel")?;
        self.with_group_room(room_id, |room| {
            room.member_ids.insert(user_id.to_string());
        })?;
        self.invites
            .lock()
            .unwrap()
            .push((room_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn invite_user_to_group(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.check_failure("invite_user_to_group")?;
        self.with_group_room(room_id, |room| {
            room.member_ids.insert(user_id.to_string());
        })?;
        self.invites
            .lock()
            .unwrap()
            .push((room_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn kick_user_from_channel(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.with_group_room(room_id, |room| {
            room.member_ids.remove(user_id);
        })?;
        self.kicks
            .lock()
            .unwrap()
            .push((room_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn kick_user_from_group(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.with_group_room(room_id, |room| {
            room.member_ids.remove(user_id);
        })?;
        self.kicks
            .lock()
            .unwrap()
            .push((room_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn list_group_members(&self, group_id: &str) -> Result<Vec<ChatUser>> {
        let state = self.state.lock().unwrap();
        let room = state
            .channels
            .values()
            .chain(state.groups.values())
            .find(|room| room.id == group_id)
            .ok_or_else(|| Error::Transport(format!("room {} not found", group_id)))?;
        Ok(state
            .users
            .values()
            .filter(|user| room.member_ids.contains(&user.id))
            .cloned()
            .collect())
    }
}

/// The three fakes plus typed handles to them, so tests can both drive
/// the real operations and inspect fake state afterwards.
pub struct TestBackends {
    pub directory: std::sync::Arc<InMemoryDirectory>,
    pub chat: std::sync::Arc<InMemoryChat>,
    pub folders: std::sync::Arc<InMemoryFolders>,
}

impl TestBackends {
    pub fn new() -> Self {
        Self {
            directory: std::sync::Arc::new(InMemoryDirectory::new()),
            chat: std::sync::Arc::new(InMemoryChat::new()),
            folders: std::sync::Arc::new(InMemoryFolders::new()),
        }
    }

    pub fn backends(&self) -> crate::model::Backends {
        crate::model::Backends {
            directory: self.directory.clone(),
            chat: self.chat.clone(),
            folders: self.folders.clone(),
        }
    }
}

impl Default for TestBackends {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct FolderState {
    folders: BTreeMap<i64, GroupFolder>,
    next_id: i64,
}

/// Folder fake. `cache_flushes` counts `flush_identity_cache` calls.
#[derive(Default)]
pub struct InMemoryFolders {
    state: Mutex<FolderState>,
    pub cache_flushes: Mutex<usize>,
    pub created_paths: Mutex<Vec<String>>,
}

impl InMemoryFolders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folder_by_path(&self, path: &str) -> Option<GroupFolder> {
        let state = self.state.lock().unwrap();
        state
            .folders
            .values()
            .find(|folder| folder.mount_point == path)
            .cloned()
    }
}

#[async_trait]
impl FolderGateway for InMemoryFolders {
    async fn create_group_folder(&self, path: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.folders.insert(
            id,
            GroupFolder {
                id,
                mount_point: path.to_string(),
                groups: BTreeMap::new(),
            },
        );
        drop(state);
        self.created_paths.lock().unwrap().push(path.to_string());
        Ok(id)
    }

    async fn grant_access(&self, folder_id: i64, group_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let folder = state
            .folders
            .get_mut(&folder_id)
            .ok_or_else(|| Error::NotFound(format!("folder {}", folder_id)))?;
        folder
            .groups
            .entry(group_id.to_string())
            .or_insert(Permission::All.bitmask());
        Ok(())
    }

    async fn set_permission(
        &self,
        folder_id: i64,
        group_id: &str,
        level: Permission,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let folder = state
            .folders
            .get_mut(&folder_id)
            .ok_or_else(|| Error::NotFound(format!("folder {}", folder_id)))?;
        folder.groups.insert(group_id.to_string(), level.bitmask());
        Ok(())
    }

    async fn list_group_folders(&self) -> Result<BTreeMap<i64, GroupFolder>> {
        Ok(self.state.lock().unwrap().folders.clone())
    }

    async fn flush_identity_cache(&self) -> Result<()> {
        *self.cache_flushes.lock().unwrap() += 1;
        Ok(())
    }
}
