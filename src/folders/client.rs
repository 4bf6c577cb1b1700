//! Nextcloud client: group-folders app API plus the LDAP cache flush.
//!
//! Group-folder management goes through
//! `index.php/apps/groupfolders/folders`; responses arrive in the OCS
//! envelope (`ocs.meta` + `ocs.data`) and need the `OCS-APIRequest`
//! header on every call.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::settings::NextcloudSettings;

use super::{FolderGateway, GroupFolder, Permission};

#[derive(Debug, Deserialize)]
struct OcsEnvelope<T> {
    ocs: Ocs<T>,
}

#[derive(Debug, Deserialize)]
struct Ocs<T> {
    meta: OcsMeta,
    data: T,
}

#[derive(Debug, Deserialize)]
struct OcsMeta {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FolderCreated {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawFolder {
    id: i64,
    mount_point: String,
    #[serde(default)]
    groups: BTreeMap<String, u32>,
}

pub struct NextcloudClient {
    client: reqwest::Client,
    base: String,
    user: String,
    password: String,
}

impl NextcloudClient {
    pub fn new(settings: &NextcloudSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: settings.host.trim_end_matches('/').to_string(),
            user: settings.user.clone(),
            password: settings.password.clone(),
        }
    }

    fn folders_url(&self, suffix: &str) -> String {
        format!("{}/index.php/apps/groupfolders/folders{}", self.base, suffix)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.basic_auth(&self.user, Some(&self.password))
            .header("OCS-APIRequest", "true")
            .header("Accept", "application/json")
    }

    async fn ocs<T: DeserializeOwned>(
        &self,
        what: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = self.authed(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("{} ({}): {}", what, status, body)));
        }
        let envelope: OcsEnvelope<T> = resp.json().await?;
        if envelope.ocs.meta.status != "ok" {
            return Err(Error::Transport(format!(
                "{}: {}",
                what,
                envelope.ocs.meta.message.unwrap_or_default()
            )));
        }
        Ok(envelope.ocs.data)
    }
}

#[async_trait]
impl FolderGateway for NextcloudClient {
    async fn create_group_folder(&self, path: &str) -> Result<i64> {
        let created: FolderCreated = self
            .ocs(
                "folders.create",
                self.client
                    .post(self.folders_url(""))
                    .form(&[("mountpoint", path)]),
            )
            .await?;
        Ok(created.id)
    }

    async fn grant_access(&self, folder_id: i64, group_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .ocs(
                "folders.groups.add",
                self.client
                    .post(self.folders_url(&format!("/{}/groups", folder_id)))
                    .form(&[("group", group_id)]),
            )
            .await?;
        Ok(())
    }

    async fn set_permission(
        &self,
        folder_id: i64,
        group_id: &str,
        level: Permission,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .ocs(
                "folders.groups.permissions",
                self.client
                    .post(self.folders_url(&format!("/{}/groups/{}", folder_id, group_id)))
                    .form(&[("permissions", level.bitmask().to_string())]),
            )
            .await?;
        Ok(())
    }

    async fn list_group_folders(&self) -> Result<BTreeMap<i64, GroupFolder>> {
        // data is {"<id>": {...}} keyed by stringified folder id, or an
        // empty array when no folder exists yet
        let data: serde_json::Value = self
            .ocs("folders.list", self.client.get(self.folders_url("")))
            .await?;
        let mut folders = BTreeMap::new();
        if let serde_json::Value::Object(map) = data {
            for (_, raw) in map {
                let raw: RawFolder = serde_json::from_value(raw)?;
                folders.insert(
                    raw.id,
                    GroupFolder {
                        id: raw.id,
                        mount_point: raw.mount_point,
                        groups: raw.groups,
                    },
                );
            }
        }
        Ok(folders)
    }

    async fn flush_identity_cache(&self) -> Result<()> {
        let url = format!(
            "{}/ocs/v2.php/apps/user_ldap/api/v1/cache/clear",
            self.base
        );
        let _: serde_json::Value = self.ocs("ldap.cache.clear", self.client.post(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocs_envelope_parse() {
        let body = r#"{
            "ocs": {
                "meta": {"status": "ok", "statuscode": 100, "message": "OK"},
                "data": {"id": 7}
            }
        }"#;
        let envelope: OcsEnvelope<FolderCreated> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.ocs.meta.status, "ok");
        assert_eq!(envelope.ocs.data.id, 7);
    }

    #[test]
    fn test_folder_listing_parse() {
        let data = serde_json::json!({
            "3": {"id": 3, "mount_point": "Franchises", "groups": {"admin": 31, "Everybody": 1}},
            "4": {"id": 4, "mount_point": "Franchises/FR", "groups": {"France": 31}}
        });
        let mut folders = BTreeMap::new();
        if let serde_json::Value::Object(map) = data {
            for (_, raw) in map {
                let raw: RawFolder = serde_json::from_value(raw).unwrap();
                folders.insert(raw.id, raw);
            }
        }
        assert_eq!(folders[&3].mount_point, "Franchises");
        assert_eq!(folders[&3].groups["Everybody"], 1);
        assert_eq!(folders[&4].groups["France"], 31);
    }
}
