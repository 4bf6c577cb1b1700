//! Teams: the Franchise×Division intersection groups, plus the two
//! policy teams that exist outside the grid.

use crate::directory::{DirectoryGateway, GroupRecord};
use crate::error::{Error, Result};

/// Machine/display names of the team every user belongs to.
pub const EVERYBODY_TEAM: (&str, &str) = ("everybody", "Everybody");

/// Machine/display names of the cross-franchise team.
pub const INTERNATIONAL_TEAM: (&str, &str) = ("international", "International");

/// Fetch a team, creating it first if it does not exist yet.
pub async fn get_or_create_team(
    directory: &dyn DirectoryGateway,
    machine_name: &str,
    display_name: &str,
) -> Result<GroupRecord> {
    match directory.get_team(machine_name).await {
        Ok(team) => Ok(team),
        Err(Error::NotFound(_)) => {
            directory.create_team(machine_name, display_name).await?;
            directory.get_team(machine_name).await
        }
        Err(e) => Err(e),
    }
}

/// The "Everybody" team is lazily created on first reference.
pub async fn get_everybody_team(directory: &dyn DirectoryGateway) -> Result<GroupRecord> {
    get_or_create_team(directory, EVERYBODY_TEAM.0, EVERYBODY_TEAM.1).await
}

pub async fn get_international_team(directory: &dyn DirectoryGateway) -> Result<GroupRecord> {
    get_or_create_team(directory, INTERNATIONAL_TEAM.0, INTERNATIONAL_TEAM.1).await
}
