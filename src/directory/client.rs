//! REST client for the edap directory service.
//!
//! Entries come back LDAP-shaped: an `fqdn` plus a multi-valued attribute
//! map (`cn`, `description`, `memberUid`, ...). The conversion helpers
//! below pull the conventional attributes out and keep the raw payload
//! attached to the record.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::settings::EdapSettings;

use super::{DirectoryGateway, GroupRecord, NewUser, OrgUnit, UserRecord};

#[derive(Debug, Deserialize)]
struct RawEntry {
    fqdn: String,
    #[serde(default)]
    attributes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EntryListResponse {
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct UidListResponse {
    #[serde(default)]
    uids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct MembershipBody<'a> {
    uid: &'a str,
    fqdn: &'a str,
}

fn first(attrs: &BTreeMap<String, Vec<String>>, key: &str) -> Option<String> {
    attrs.get(key).and_then(|v| v.first()).cloned()
}

impl RawEntry {
    fn into_group(self) -> GroupRecord {
        GroupRecord {
            machine_name: first(&self.attributes, "cn").unwrap_or_default(),
            display_name: first(&self.attributes, "description"),
            member_uids: self.attributes.get("memberUid").cloned().unwrap_or_default(),
            fqdn: self.fqdn,
            attributes: self.attributes,
        }
    }

    fn into_user(self) -> UserRecord {
        UserRecord {
            uid: first(&self.attributes, "uid").unwrap_or_default(),
            given_name: first(&self.attributes, "givenName").unwrap_or_default(),
            surname: first(&self.attributes, "sn").unwrap_or_default(),
            mail: self.attributes.get("mail").cloned().unwrap_or_default(),
            fqdn: self.fqdn,
        }
    }
}

pub struct EdapClient {
    client: reqwest::Client,
    base: String,
    user: String,
    password: String,
    pub domain: String,
}

impl EdapClient {
    pub fn new(settings: &EdapSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: settings.hostname.trim_end_matches('/').to_string(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            domain: settings.domain.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .basic_auth(&self.user, Some(&self.password))
    }

    /// Map a non-success response to the error taxonomy. 404 and 409 carry
    /// directory meaning; everything else is a transport failure.
    async fn check(what: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(Error::NotFound(format!("{}: {}", what, body))),
            409 => Err(Error::Conflict(format!("{}: {}", what, body))),
            _ => Err(Error::Transport(format!("{} ({}): {}", what, status, body))),
        }
    }

    async fn get_entries(&self, path: &str, search: Option<&str>) -> Result<Vec<RawEntry>> {
        let mut req = self.request(reqwest::Method::GET, path);
        if let Some(search) = search {
            req = req.query(&[("search", search)]);
        }
        let resp = Self::check(path, req.send().await?).await?;
        let list: EntryListResponse = resp.json().await?;
        Ok(list.entries)
    }

    async fn get_structure_entries(
        &self,
        unit: OrgUnit,
        search: Option<&str>,
    ) -> Result<Vec<GroupRecord>> {
        let entries = self.get_entries(unit.ou(), search).await?;
        Ok(entries.into_iter().map(RawEntry::into_group).collect())
    }

    async fn create_entry(&self, path: &str, machine_name: &str, display_name: &str) -> Result<()> {
        let body = serde_json::json!({
            "machine_name": machine_name,
            "display_name": display_name,
        });
        let resp = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await?;
        Self::check(path, resp).await?;
        Ok(())
    }

    async fn delete_entry(&self, path: &str) -> Result<()> {
        let resp = self.request(reqwest::Method::DELETE, path).send().await?;
        Self::check(path, resp).await?;
        Ok(())
    }

    /// Resolve a search that must match exactly one entry.
    fn exactly_one(what: &str, mut entries: Vec<RawEntry>) -> Result<RawEntry> {
        match entries.len() {
            0 => Err(Error::NotFound(what.to_string())),
            1 => Ok(entries.remove(0)),
            n => Err(Error::Ambiguous(format!("{} matched {} entries", what, n))),
        }
    }
}

#[async_trait]
impl DirectoryGateway for EdapClient {
    async fn get_user(&self, uid: &str) -> Result<UserRecord> {
        let entries = self.get_entries("users", Some(&format!("uid={}", uid))).await?;
        let entry = Self::exactly_one(&format!("uid={}", uid), entries)?;
        Ok(entry.into_user())
    }

    async fn add_user(&self, user: &NewUser) -> Result<()> {
        let mut mail = vec![user.mail.clone()];
        mail.extend(user.mail_aliases.iter().cloned());
        let mut body = serde_json::json!({
            "uid": user.uid,
            "given_name": user.given_name,
            "surname": user.surname,
            "password": user.password,
            "mail": mail,
        });
        if let Some(ref avatar) = user.avatar {
            body["avatar"] = serde_json::json!(base64::engine::general_purpose::STANDARD.encode(avatar));
        }
        let resp = self
            .request(reqwest::Method::POST, "users")
            .json(&body)
            .send()
            .await?;
        Self::check("users", resp).await?;
        Ok(())
    }

    async fn delete_user(&self, uid: &str) -> Result<()> {
        self.delete_entry(&format!("users/{}", uid)).await
    }

    async fn modify_user(&self, uid: &str, field: &str, value: &str) -> Result<()> {
        let body = serde_json::json!({ "field": field, "value": value });
        let path = format!("users/{}", uid);
        let resp = self
            .request(reqwest::Method::PATCH, &path)
            .json(&body)
            .send()
            .await?;
        Self::check(&path, resp).await?;
        Ok(())
    }

    async fn verify_password(&self, uid: &str, password: &str) -> Result<bool> {
        let path = format!("users/{}/verify-password", uid);
        let resp = self
            .request(reqwest::Method::POST, &path)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await?;
        let resp = Self::check(&path, resp).await?;
        let verdict: VerifyResponse = resp.json().await?;
        Ok(verdict.ok)
    }

    async fn get_groups(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        let entries = self.get_entries("groups", search).await?;
        Ok(entries.into_iter().map(RawEntry::into_group).collect())
    }

    async fn get_group(&self, name: &str) -> Result<GroupRecord> {
        let entries = self.get_entries("groups", Some(&format!("cn={}", name))).await?;
        let entry = Self::exactly_one(&format!("cn={}", name), entries)?;
        Ok(entry.into_group())
    }

    async fn create_group(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_entry("groups", machine_name, display_name).await
    }

    async fn get_user_groups(&self, uid: &str) -> Result<Vec<GroupRecord>> {
        let path = format!("users/{}/groups", uid);
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        let resp = Self::check(&path, resp).await?;
        let list: EntryListResponse = resp.json().await?;
        Ok(list.entries.into_iter().map(RawEntry::into_group).collect())
    }

    async fn make_member_of(&self, uid: &str, group_fqdn: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "membership")
            .json(&MembershipBody { uid, fqdn: group_fqdn })
            .send()
            .await?;
        Self::check("membership", resp).await?;
        Ok(())
    }

    async fn remove_member_of(&self, uid: &str, group_fqdn: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, "membership")
            .json(&MembershipBody { uid, fqdn: group_fqdn })
            .send()
            .await?;
        Self::check("membership", resp).await?;
        Ok(())
    }

    async fn get_franchises(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        self.get_structure_entries(OrgUnit::Franchises, search).await
    }

    async fn create_franchise(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_entry("franchises", machine_name, display_name).await
    }

    async fn delete_franchise(&self, machine_name: &str) -> Result<()> {
        self.delete_entry(&format!("franchises/{}", machine_name)).await
    }

    async fn get_divisions(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        self.get_structure_entries(OrgUnit::Divisions, search).await
    }

    async fn create_division(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_entry("divisions", machine_name, display_name).await
    }

    async fn delete_division(&self, machine_name: &str) -> Result<()> {
        self.delete_entry(&format!("divisions/{}", machine_name)).await
    }

    async fn get_teams(&self, search: Option<&str>) -> Result<Vec<GroupRecord>> {
        self.get_structure_entries(OrgUnit::Teams, search).await
    }

    async fn get_team(&self, machine_name: &str) -> Result<GroupRecord> {
        let entries = self
            .get_entries("teams", Some(&format!("cn={}", machine_name)))
            .await?;
        let entry = Self::exactly_one(&format!("cn={}", machine_name), entries)?;
        Ok(entry.into_group())
    }

    async fn create_team(&self, machine_name: &str, display_name: &str) -> Result<()> {
        self.create_entry("teams", machine_name, display_name).await
    }

    async fn delete_team(&self, machine_name: &str) -> Result<()> {
        self.delete_entry(&format!("teams/{}", machine_name)).await
    }

    async fn get_team_component_units(
        &self,
        team_machine_name: &str,
    ) -> Result<(GroupRecord, GroupRecord)> {
        #[derive(Deserialize)]
        struct ComponentUnits {
            franchise: RawEntry,
            division: RawEntry,
        }

        let path = format!("teams/{}/component-units", team_machine_name);
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        let resp = Self::check(&path, resp).await?;
        let units: ComponentUnits = resp.json().await?;
        Ok((units.franchise.into_group(), units.division.into_group()))
    }

    async fn get_uids_member_of_ou(&self, ou: &str) -> Result<Vec<String>> {
        let path = format!("ou/{}/uids", ou);
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        let resp = Self::check(&path, resp).await?;
        let list: UidListResponse = resp.json().await?;
        Ok(list.uids)
    }

    async fn get_uids_member_of_group(
        &self,
        unit: OrgUnit,
        machine_name: &str,
    ) -> Result<Vec<String>> {
        let entries = self
            .get_entries(unit.ou(), Some(&format!("cn={}", machine_name)))
            .await?;
        let entry = Self::exactly_one(&format!("cn={}", machine_name), entries)?;
        Ok(entry.into_group().member_uids)
    }
}
