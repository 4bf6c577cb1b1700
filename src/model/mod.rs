//! Composite organizational entities.
//!
//! A Franchise or Division exists in three systems at once: as a
//! directory group, as a chat room and as a folder tree. A Team is the
//! intersection of one Franchise and one Division and exists in the
//! directory only. The types here own the naming policy and the
//! multi-system creation/membership operations; all external state goes
//! through the injected gateway handles.

pub mod divisions;
pub mod structure;
pub mod team;
pub mod user;

use std::sync::Arc;

use crate::chat::ChatGateway;
use crate::directory::{DirectoryGateway, GroupRecord, OrgUnit};
use crate::error::{Error, Result};
use crate::folders::FolderGateway;

pub use divisions::{merge_divisions, DivisionStatus};
pub use structure::{
    sanitize_room_name, CreateOutcome, FolderSteps, MajorStructure, StructureKind, DIVISION,
    FRANCHISE,
};
pub use user::User;

/// The three gateway handles every multi-system operation needs,
/// constructed once and passed explicitly.
#[derive(Clone)]
pub struct Backends {
    pub directory: Arc<dyn DirectoryGateway>,
    pub chat: Arc<dyn ChatGateway>,
    pub folders: Arc<dyn FolderGateway>,
}

/// Resolve a structure entry that must exist exactly once.
pub(crate) async fn resolve_structure(
    directory: &dyn DirectoryGateway,
    unit: OrgUnit,
    machine_name: &str,
) -> Result<GroupRecord> {
    let search = format!("cn={}", machine_name);
    let mut entries = directory.get_structures(unit, Some(&search)).await?;
    match entries.len() {
        0 => Err(Error::NotFound(format!("{} in ou={}", search, unit.ou()))),
        1 => Ok(entries.remove(0)),
        n => Err(Error::Ambiguous(format!(
            "{} matched {} entries in ou={}",
            search,
            n,
            unit.ou()
        ))),
    }
}
