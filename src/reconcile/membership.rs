//! Membership specification strings.
//!
//! A spec is a `+`-joined list of `qualifier=value` clauses, e.g.
//! `ou=people+team=everybody+uid=alice`. Resolution expands each clause
//! against the directory and returns the union.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::directory::DirectoryGateway;
use crate::error::{Error, Result};

/// One clause of a membership spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberClause {
    /// Every uid under an organizational unit.
    Ou(String),
    /// A literal single uid.
    Uid(String),
    /// Every member of a team.
    Team(String),
}

/// A parsed membership specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSpec {
    pub clauses: Vec<MemberClause>,
}

impl FromStr for MembershipSpec {
    type Err = Error;

    /// An unknown qualifier fails the whole spec, not just the clause:
    /// a typo must not silently shrink a room's intended membership.
    fn from_str(spec: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        for component in spec.split('+') {
            let (qualifier, value) = component.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid membership clause '{}'", component))
            })?;
            let clause = match qualifier {
                "ou" => MemberClause::Ou(value.to_string()),
                "uid" => MemberClause::Uid(value.to_string()),
                "team" => MemberClause::Team(value.to_string()),
                other => {
                    return Err(Error::Config(format!(
                        "invalid subject to add: '{}'",
                        other
                    )))
                }
            };
            clauses.push(clause);
        }
        Ok(MembershipSpec { clauses })
    }
}

impl MembershipSpec {
    /// Expand every clause and union the results.
    pub async fn resolve(&self, directory: &dyn DirectoryGateway) -> Result<BTreeSet<String>> {
        let mut members = BTreeSet::new();
        for clause in &self.clauses {
            match clause {
                MemberClause::Ou(ou) => {
                    members.extend(directory.get_uids_member_of_ou(ou).await?);
                }
                MemberClause::Uid(uid) => {
                    members.insert(uid.clone());
                }
                MemberClause::Team(name) => {
                    let team = directory.get_team(name).await?;
                    members.extend(team.member_uids.iter().cloned());
                }
            }
        }
        log::info!("translated spec into {} members", members.len());
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clauses() {
        let spec: MembershipSpec = "ou=people+uid=alice+team=everybody".parse().unwrap();
        assert_eq!(
            spec.clauses,
            vec![
                MemberClause::Ou("people".into()),
                MemberClause::Uid("alice".into()),
                MemberClause::Team("everybody".into()),
            ]
        );
    }

    #[test]
    fn test_parse_single_clause() {
        let spec: MembershipSpec = "uid=bob".parse().unwrap();
        assert_eq!(spec.clauses, vec![MemberClause::Uid("bob".into())]);
    }

    #[test]
    fn test_unknown_qualifier_is_fatal() {
        let err = "uid=alice+group=admins".parse::<MembershipSpec>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("group"));
    }

    #[test]
    fn test_clause_without_equals_is_fatal() {
        assert!("alice".parse::<MembershipSpec>().is_err());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let spec: MembershipSpec = "uid=a=b".parse().unwrap();
        assert_eq!(spec.clauses, vec![MemberClause::Uid("a=b".into())]);
    }
}
