//! Idempotent convergence between the directory and the chat rooms.
//!
//! The engine holds no state of its own: every run re-reads the
//! directory (desired) and the chat platform (actual), computes the
//! minimal diff and applies it member by member. A member that cannot be
//! resolved is logged and skipped; re-running against an unchanged
//! directory converges to an empty diff.
//!
//! Directory uids double as chat usernames throughout.

pub mod membership;

use std::collections::BTreeSet;

use log::{info, warn};

use crate::chat::ChatGateway;
use crate::error::{Error, Result};
use crate::model::team::{get_everybody_team, get_international_team};
use crate::model::{merge_divisions, Backends, MajorStructure, StructureKind, DIVISION, FRANCHISE};
use crate::settings::SyncConfig;

pub use membership::{MemberClause, MembershipSpec};

/// The minimal change set for one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomDiff {
    pub to_invite: BTreeSet<String>,
    pub to_kick: BTreeSet<String>,
}

impl RoomDiff {
    pub fn is_empty(&self) -> bool {
        self.to_invite.is_empty() && self.to_kick.is_empty()
    }
}

/// Set difference in both directions. Pure; ordering within each side is
/// irrelevant to the caller.
pub fn compute_diff(desired: &BTreeSet<String>, actual: &BTreeSet<String>) -> RoomDiff {
    RoomDiff {
        to_invite: desired.difference(actual).cloned().collect(),
        to_kick: actual.difference(desired).cloned().collect(),
    }
}

/// Per-run tallies, for the maintain log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub rooms: usize,
    pub invited: usize,
    pub kicked: usize,
    pub skipped: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.rooms += other.rooms;
        self.invited += other.invited;
        self.kicked += other.kicked;
        self.skipped += other.skipped;
    }
}

/// Invite each username to the room, resolving chat ids one by one. An
/// unresolvable or failing member is skipped, never fatal.
async fn invite_members(
    chat: &dyn ChatGateway,
    room_id: &str,
    usernames: &BTreeSet<String>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for username in usernames {
        let chat_user = match chat.get_user_by_username(username).await? {
            Some(user) => user,
            None => {
                info!("couldn't find user '{}'", username);
                report.skipped += 1;
                continue;
            }
        };
        match chat.invite_user_to_group(room_id, &chat_user.id).await {
            Ok(()) => report.invited += 1,
            Err(e) => {
                warn!("couldn't add user '{}': {}", username, e);
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

async fn kick_members(
    chat: &dyn ChatGateway,
    room_id: &str,
    usernames: &BTreeSet<String>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for username in usernames {
        let chat_user = match chat.get_user_by_username(username).await? {
            Some(user) => user,
            None => {
                info!("couldn't find user '{}'", username);
                report.skipped += 1;
                continue;
            }
        };
        match chat.kick_user_from_group(room_id, &chat_user.id).await {
            Ok(()) => report.kicked += 1,
            Err(e) => {
                warn!("couldn't remove user '{}': {}", username, e);
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

async fn current_usernames(chat: &dyn ChatGateway, room_id: &str) -> Result<BTreeSet<String>> {
    let members = chat.list_group_members(room_id).await?;
    Ok(members.into_iter().map(|m| m.username).collect())
}

/// Make sure a special room exists, then converge it to exactly the
/// intended membership. Special rooms are declarative: extra members are
/// always kicked.
async fn sync_special_room(
    backends: &Backends,
    room_name: &str,
    intended: &BTreeSet<String>,
) -> Result<SyncReport> {
    if backends.chat.get_group_by_name(room_name).await?.is_none() {
        backends.chat.create_group(room_name).await?;
    }
    let room = backends
        .chat
        .get_group_by_name(room_name)
        .await?
        .ok_or_else(|| Error::Transport(format!("unable to create group '{}'", room_name)))?;

    let actual = current_usernames(backends.chat.as_ref(), &room.id).await?;
    let diff = compute_diff(intended, &actual);
    info!(
        "room {}: {} current, adding {}, removing {}",
        room_name,
        actual.len(),
        diff.to_invite.len(),
        diff.to_kick.len()
    );

    let mut report = SyncReport {
        rooms: 1,
        ..Default::default()
    };
    report.absorb(invite_members(backends.chat.as_ref(), &room.id, &diff.to_invite).await?);
    report.absorb(kick_members(backends.chat.as_ref(), &room.id, &diff.to_kick).await?);
    Ok(report)
}

/// Converge every declared special room to its spec.
pub async fn populate_special_rooms(
    backends: &Backends,
    config: &SyncConfig,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for (room_name, spec) in &config.rooms {
        let spec: MembershipSpec = spec.parse()?;
        let intended = spec.resolve(backends.directory.as_ref()).await?;
        report.absorb(sync_special_room(backends, room_name, &intended).await?);
    }
    Ok(report)
}

/// Align one structure kind's chat rooms with directory membership.
/// Missing members are invited; extraneous ones are kicked only when
/// `kick_extraneous` says so.
async fn sync_structure_rooms(
    backends: &Backends,
    kind: &'static StructureKind,
    kick_extraneous: bool,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let structures = backends.directory.get_structures(kind.unit, None).await?;
    for record in &structures {
        let structure = MajorStructure::from_record(kind, record);
        let room = structure.ensure_chat_room(backends).await?;

        let desired: BTreeSet<String> = backends
            .directory
            .get_uids_member_of_group(kind.unit, &structure.machine_name)
            .await?
            .into_iter()
            .collect();
        let actual = current_usernames(backends.chat.as_ref(), &room.id).await?;
        let diff = compute_diff(&desired, &actual);
        info!(
            "{} {}: {} current, adding {}, removing {}",
            kind.label,
            structure.display_name,
            actual.len(),
            diff.to_invite.len(),
            diff.to_kick.len()
        );

        report.rooms += 1;
        report.absorb(invite_members(backends.chat.as_ref(), &room.id, &diff.to_invite).await?);
        if kick_extraneous {
            report.absorb(kick_members(backends.chat.as_ref(), &room.id, &diff.to_kick).await?);
        }
    }
    Ok(report)
}

/// Align every franchise chat room with its directory group.
pub async fn sync_franchise_rooms(
    backends: &Backends,
    kick_extraneous: bool,
) -> Result<SyncReport> {
    sync_structure_rooms(backends, &FRANCHISE, kick_extraneous).await
}

/// Align every division chat room with its directory group.
pub async fn sync_division_rooms(
    backends: &Backends,
    kick_extraneous: bool,
) -> Result<SyncReport> {
    sync_structure_rooms(backends, &DIVISION, kick_extraneous).await
}

/// Fill each declared team from its membership spec. Spec resolution
/// failures are fatal; a single member's add failure is not.
pub async fn fill_teams(backends: &Backends, config: &SyncConfig) -> Result<()> {
    for (team_name, spec) in &config.teams {
        let spec: MembershipSpec = spec.parse()?;
        let intended = spec.resolve(backends.directory.as_ref()).await?;

        let team = match backends.directory.get_team(team_name).await {
            Ok(team) => team,
            Err(e) => {
                log::error!("team {}: {}", team_name, e);
                continue;
            }
        };
        for uid in &intended {
            if let Err(e) = backends.directory.make_member_of(uid, &team.fqdn).await {
                log::error!("error adding {} to team {}: {}", uid, team_name, e);
            }
        }
    }
    Ok(())
}

/// Create the config-declared divisions the directory does not have
/// yet. A full create (directory groups, product teams, chat room,
/// folder tree); one division's failure does not stop the rest.
pub async fn ensure_config_divisions(backends: &Backends, config: &SyncConfig) -> Result<()> {
    let existing = backends.directory.get_divisions(None).await?;
    let merged = merge_divisions(&config.divisions, &existing);
    for (machine_name, status) in &merged {
        if !status.exists_in_config || status.exists_in_directory {
            continue;
        }
        let display_name = status
            .config_display_name
            .clone()
            .unwrap_or_else(|| machine_name.clone());
        let division = MajorStructure::division(machine_name, &display_name);
        if let Err(e) = division.create(backends).await {
            log::error!("division {}: {}", machine_name, e);
        }
    }
    Ok(())
}

/// Top-level convergence entry point, intended to be run periodically.
///
/// Creates missing declared divisions, fills declared teams, converges
/// the special rooms, syncs franchise rooms against directory membership
/// and makes sure the well-known teams exist.
pub async fn maintain(backends: &Backends, config: &SyncConfig) -> Result<SyncReport> {
    ensure_config_divisions(backends, config).await?;
    fill_teams(backends, config).await?;

    let mut report = populate_special_rooms(backends, config).await?;
    report.absorb(sync_franchise_rooms(backends, config.kick_extraneous).await?);

    get_everybody_team(backends.directory.as_ref()).await?;
    get_international_team(backends.directory.as_ref()).await?;

    info!(
        "maintain: {} rooms, {} invited, {} kicked, {} skipped",
        report.rooms, report.invited, report.kicked, report.skipped
    );
    Ok(report)
}
