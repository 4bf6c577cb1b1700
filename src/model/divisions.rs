//! Merge the config-file division inventory with the directory's view.
//!
//! A deployment declares its divisions in the sync config; the directory
//! holds whatever has actually been created. The merged view drives both
//! the admin surface ("create this declared division") and sanity checks
//! ("who created this undeclared one?").

use std::collections::BTreeMap;

use serde::Serialize;

use crate::directory::GroupRecord;

/// Where a division machine name was seen, and under which label.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionStatus {
    pub exists_in_config: bool,
    pub exists_in_directory: bool,
    pub config_display_name: Option<String>,
    pub directory_display_name: Option<String>,
}

/// Key the union of both inventories by machine name, flagging each side.
pub fn merge_divisions(
    config_divisions: &BTreeMap<String, String>,
    directory_divisions: &[GroupRecord],
) -> BTreeMap<String, DivisionStatus> {
    let mut merged: BTreeMap<String, DivisionStatus> = BTreeMap::new();

    for (machine_name, display_name) in config_divisions {
        merged.insert(
            machine_name.clone(),
            DivisionStatus {
                exists_in_config: true,
                config_display_name: Some(display_name.clone()),
                ..Default::default()
            },
        );
    }

    for division in directory_divisions {
        let status = merged.entry(division.machine_name.clone()).or_default();
        status.exists_in_directory = true;
        status.directory_display_name = division.display_name.clone();
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(machine_name: &str, display_name: Option<&str>) -> GroupRecord {
        GroupRecord {
            fqdn: format!("cn={},ou=divisions,dc=entint,dc=org", machine_name),
            machine_name: machine_name.to_string(),
            display_name: display_name.map(str::to_string),
            member_uids: vec![],
            attributes: Default::default(),
        }
    }

    #[test]
    fn test_merge_divisions() {
        let config: BTreeMap<String, String> = [
            ("it".to_string(), "IT".to_string()),
            ("leg".to_string(), "Legal".to_string()),
            ("random".to_string(), "Random".to_string()),
        ]
        .into();
        let directory = vec![
            record("it", Some("It")),
            record("pub", Some("Publishing")),
            record("qwe", None),
            record("qwe1", None),
        ];

        let merged = merge_divisions(&config, &directory);

        // union of both sides, one entry per machine name
        assert_eq!(merged.len(), config.len() + directory.len() - 1);

        for machine_name in ["pub", "qwe", "qwe1"] {
            assert!(merged[machine_name].exists_in_directory);
            assert!(!merged[machine_name].exists_in_config);
        }
        for machine_name in ["leg", "random"] {
            assert!(!merged[machine_name].exists_in_directory);
            assert!(merged[machine_name].exists_in_config);
        }

        let common = &merged["it"];
        assert!(common.exists_in_config);
        assert!(common.exists_in_directory);
        assert_eq!(common.config_display_name.as_deref(), Some("IT"));
        assert_eq!(common.directory_display_name.as_deref(), Some("It"));
    }

    #[test]
    fn test_merge_divisions_empty_config() {
        let merged = merge_divisions(&BTreeMap::new(), &[record("it", Some("IT"))]);
        assert_eq!(merged.len(), 1);
        assert!(merged["it"].exists_in_directory);
        assert!(!merged["it"].exists_in_config);
    }
}
