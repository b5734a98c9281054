//! REST adapter for a MISP instance.
//!
//! Speaks the JSON REST API with the `Authorization: <authkey>` header.
//! Responses wrap records in their model name (`{"Event": {..}}`); listings
//! are arrays of such envelopes.

use crate::api::{Connector, InstanceApi, OrgScope, normalize_url};
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use fedsync_types::{
    ConnectionTest, Event, NewOrganisation, NewSharingGroup, NewTag, NewUser, OrgRef,
    Organisation, RemoteId, Role, ServerSettings, ServerUpdate, SharingGroup,
    SharingGroupServer, SyncDescriptor, SyncServer, Tag, User,
};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Connection settings shared by every client of a federation.
#[derive(Debug, Clone)]
pub struct MispConfig {
    /// Verify TLS certificates. Test instances usually run self-signed.
    pub verify_tls: bool,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MispConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            timeout_secs: 60,
        }
    }
}

/// Client bound to one instance and one authentication key.
pub struct MispClient {
    base_url: String,
    authkey: String,
    client: Client,
}

impl MispClient {
    /// Creates a client for `base_url` authenticating with `authkey`.
    pub fn new(base_url: &str, authkey: &str, config: &MispConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self::with_http_client(base_url, authkey, client))
    }

    /// Creates a client reusing an existing HTTP connection pool.
    pub fn with_http_client(base_url: &str, authkey: &str, client: Client) -> Self {
        Self {
            base_url: normalize_url(base_url).to_string(),
            authkey: authkey.to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Sends a request and returns the decoded JSON body.
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> ClientResult<Value> {
        debug!("{} {}", method, self.url(path));

        let mut request = self
            .client
            .request(method, self.url(path))
            .header("Authorization", &self.authkey)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("{path}: {e}")))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(error_for_status(status, path, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn get(&self, path: &str) -> ClientResult<Value> {
        self.call(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> ClientResult<Value> {
        self.call(Method::POST, path, Some(body)).await
    }
}

fn error_for_status(status: StatusCode, path: &str, body: &str) -> ClientError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status.as_u16() {
        401 => ClientError::AuthFailed(format!("{path}: {message}")),
        404 => ClientError::NotFound(format!("{path}: {message}")),
        code if status.is_client_error() => ClientError::Rejected {
            status: code,
            message,
        },
        code => ClientError::UnexpectedResponse(format!("{path} returned {code}: {message}")),
    }
}

/// Decodes `{"<key>": {...}}`, or the bare record if the envelope is absent.
fn unwrap_record<T: DeserializeOwned>(mut value: Value, key: &str) -> ClientResult<T> {
    let inner = match value.get_mut(key) {
        Some(inner) => inner.take(),
        None => value,
    };
    Ok(serde_json::from_value(inner)?)
}

/// Decodes a listing of envelopes.
fn unwrap_list<T: DeserializeOwned>(value: Value, key: &str) -> ClientResult<Vec<T>> {
    match value {
        Value::Array(items) => items.into_iter().map(|v| unwrap_record(v, key)).collect(),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|v| serde_json::from_value(v).map_err(ClientError::from))
                .collect(),
            _ => Err(ClientError::UnexpectedResponse(format!(
                "expected a list of {key}"
            ))),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err(ClientError::UnexpectedResponse(format!(
            "expected a list of {key}"
        ))),
    }
}

/// Sharing group listing entry as returned by `sharing_groups/index`.
#[derive(Debug, Deserialize)]
struct SharingGroupEnvelope {
    #[serde(rename = "SharingGroup")]
    group: SharingGroupRecord,
    #[serde(rename = "SharingGroupOrg", default)]
    orgs: Vec<SharingGroupOrgEntry>,
    #[serde(rename = "SharingGroupServer", default)]
    servers: Vec<SharingGroupServerEntry>,
}

#[derive(Debug, Deserialize)]
struct SharingGroupRecord {
    id: RemoteId,
    uuid: Uuid,
    name: String,
    #[serde(default)]
    releasability: String,
}

#[derive(Debug, Deserialize)]
struct SharingGroupOrgEntry {
    #[serde(rename = "Organisation")]
    organisation: OrgRef,
}

#[derive(Debug, Deserialize)]
struct SharingGroupServerEntry {
    server_id: RemoteId,
    #[serde(rename = "Server", default)]
    server: Option<ServerUrl>,
}

#[derive(Debug, Deserialize)]
struct ServerUrl {
    #[serde(default)]
    url: Option<String>,
}

impl From<SharingGroupEnvelope> for SharingGroup {
    fn from(envelope: SharingGroupEnvelope) -> Self {
        SharingGroup {
            id: envelope.group.id,
            uuid: envelope.group.uuid,
            name: envelope.group.name,
            releasability: envelope.group.releasability,
            organisations: envelope.orgs.into_iter().map(|o| o.organisation).collect(),
            servers: envelope
                .servers
                .into_iter()
                .map(|s| SharingGroupServer {
                    server_id: s.server_id,
                    url: s.server.and_then(|srv| srv.url),
                })
                .collect(),
        }
    }
}

fn decode_sharing_group(value: Value) -> ClientResult<SharingGroup> {
    if value.get("SharingGroup").is_some() {
        let envelope: SharingGroupEnvelope = serde_json::from_value(value)?;
        Ok(envelope.into())
    } else {
        let record: SharingGroupRecord = serde_json::from_value(value)?;
        Ok(SharingGroup {
            id: record.id,
            uuid: record.uuid,
            name: record.name,
            releasability: record.releasability,
            organisations: Vec::new(),
            servers: Vec::new(),
        })
    }
}

#[async_trait]
impl InstanceApi for MispClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn add_organisation(&self, org: &NewOrganisation) -> ClientResult<Organisation> {
        let value = self
            .post("admin/organisations/add", json!({ "Organisation": org }))
            .await?;
        let created: Organisation = unwrap_record(value, "Organisation")?;
        info!("Created organisation {} on {}", created.name, self.base_url);
        Ok(created)
    }

    async fn organisations(&self, scope: OrgScope) -> ClientResult<Vec<Organisation>> {
        let value = self
            .get(&format!("organisations/index/scope:{}", scope.as_str()))
            .await?;
        unwrap_list(value, "Organisation")
    }

    async fn update_organisation(&self, org: &Organisation) -> ClientResult<Organisation> {
        let value = self
            .post(
                &format!("admin/organisations/edit/{}", org.id),
                json!({ "Organisation": org }),
            )
            .await?;
        unwrap_record(value, "Organisation")
    }

    async fn add_user(&self, user: &NewUser) -> ClientResult<User> {
        let value = self.post("admin/users/add", json!({ "User": user })).await?;
        let created: User = unwrap_record(value, "User")?;
        info!("Created user {} on {}", created.email, self.base_url);
        Ok(created)
    }

    async fn users(&self) -> ClientResult<Vec<User>> {
        let value = self.get("admin/users").await?;
        unwrap_list(value, "User")
    }

    async fn change_user_password(&self, user_id: &RemoteId, password: &str) -> ClientResult<()> {
        self.post(
            &format!("admin/users/edit/{user_id}"),
            json!({ "User": { "password": password, "confirm_password": password } }),
        )
        .await?;
        Ok(())
    }

    async fn set_default_role(&self, role: Role) -> ClientResult<()> {
        self.post(&format!("admin/roles/set_default/{}", role.id()), json!({}))
            .await?;
        Ok(())
    }

    async fn server_settings(&self) -> ClientResult<ServerSettings> {
        let value = self.get("servers/serverSettings").await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn set_server_setting(&self, name: &str, value: &str, force: bool) -> ClientResult<()> {
        self.post(
            &format!("servers/serverSettingsEdit/{name}"),
            json!({ "value": value, "force": force }),
        )
        .await?;
        debug!("Set {} on {}", name, self.base_url);
        Ok(())
    }

    async fn get_sync_config(&self) -> ClientResult<SyncDescriptor> {
        let value = self.get("servers/createSync").await?;
        unwrap_record(value, "Server")
    }

    async fn servers(&self) -> ClientResult<Vec<SyncServer>> {
        let value = self.get("servers/index").await?;
        unwrap_list(value, "Server")
    }

    async fn import_server(&self, descriptor: &SyncDescriptor) -> ClientResult<SyncServer> {
        let value = self
            .post("servers/import", json!({ "Server": descriptor }))
            .await?;
        let server: SyncServer = unwrap_record(value, "Server")?;
        info!("Imported server {} on {}", server.name, self.base_url);
        Ok(server)
    }

    async fn update_server(
        &self,
        id: &RemoteId,
        update: &ServerUpdate,
    ) -> ClientResult<SyncServer> {
        let value = self
            .post(&format!("servers/edit/{id}"), json!({ "Server": update }))
            .await?;
        unwrap_record(value, "Server")
    }

    async fn delete_server(&self, id: &RemoteId) -> ClientResult<()> {
        self.post(&format!("servers/delete/{id}"), json!({})).await?;
        Ok(())
    }

    async fn test_server(&self, id: &RemoteId) -> ClientResult<ConnectionTest> {
        let value = self
            .post(&format!("servers/testConnection/{id}"), json!({}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn server_push(&self, id: &RemoteId, event_id: Option<&RemoteId>) -> ClientResult<()> {
        let path = match event_id {
            Some(event_id) => format!("servers/push/{id}/{event_id}"),
            None => format!("servers/push/{id}/full"),
        };
        self.get(&path).await?;
        Ok(())
    }

    async fn server_pull(&self, id: &RemoteId) -> ClientResult<()> {
        self.get(&format!("servers/pull/{id}")).await?;
        Ok(())
    }

    async fn add_tag(&self, tag: &NewTag) -> ClientResult<Tag> {
        let value = self.post("tags/add", json!({ "Tag": tag })).await?;
        unwrap_record(value, "Tag")
    }

    async fn tags(&self) -> ClientResult<Vec<Tag>> {
        let value = self.get("tags/index").await?;
        unwrap_list(value, "Tag")
    }

    async fn delete_tag(&self, id: &RemoteId) -> ClientResult<()> {
        self.post(&format!("tags/delete/{id}"), json!({})).await?;
        Ok(())
    }

    async fn add_sharing_group(&self, group: &NewSharingGroup) -> ClientResult<SharingGroup> {
        let value = self
            .post("sharing_groups/add", json!({ "SharingGroup": group }))
            .await?;
        let created = decode_sharing_group(value)?;
        info!("Created sharing group {} on {}", created.name, self.base_url);
        Ok(created)
    }

    async fn sharing_groups(&self) -> ClientResult<Vec<SharingGroup>> {
        let mut value = self.get("sharing_groups/index").await?;
        let items = match value.get_mut("response") {
            Some(response) => response.take(),
            None => value,
        };
        match items {
            Value::Array(items) => items.into_iter().map(decode_sharing_group).collect(),
            Value::Null => Ok(Vec::new()),
            _ => Err(ClientError::UnexpectedResponse(
                "expected a list of SharingGroup".to_string(),
            )),
        }
    }

    async fn delete_sharing_group(&self, id: &RemoteId) -> ClientResult<()> {
        self.post(&format!("sharing_groups/delete/{id}"), json!({}))
            .await?;
        Ok(())
    }

    async fn add_org_to_sharing_group(
        &self,
        group_id: &RemoteId,
        org: &OrgRef,
    ) -> ClientResult<()> {
        let org_key = match (&org.uuid, &org.id) {
            (Some(uuid), _) => uuid.to_string(),
            (None, Some(id)) => id.to_string(),
            (None, None) => {
                return Err(ClientError::Config(format!(
                    "organisation {} has neither uuid nor id",
                    org.name
                )));
            }
        };
        self.post(
            &format!("sharing_groups/addOrg/{group_id}/{org_key}"),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn add_server_to_sharing_group(
        &self,
        group_id: &RemoteId,
        server_id: &RemoteId,
    ) -> ClientResult<()> {
        self.post(
            &format!("sharing_groups/addServer/{group_id}/{server_id}"),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn add_event(&self, event: &Event) -> ClientResult<Event> {
        let value = self.post("events/add", json!({ "Event": event })).await?;
        unwrap_record(value, "Event")
    }

    async fn publish(&self, event_id: &RemoteId) -> ClientResult<()> {
        self.post(&format!("events/publish/{event_id}"), json!({}))
            .await?;
        Ok(())
    }

    async fn get_event(&self, uuid: &Uuid) -> ClientResult<Option<Event>> {
        match self.get(&format!("events/view/{uuid}")).await {
            Ok(value) => Ok(Some(unwrap_record(value, "Event")?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_event(&self, uuid: &Uuid) -> ClientResult<()> {
        self.post(&format!("events/delete/{uuid}"), json!({})).await?;
        Ok(())
    }
}

/// Builds [`MispClient`]s sharing one HTTP connection pool.
pub struct MispConnector {
    client: Client,
}

impl MispConnector {
    pub fn new(config: &MispConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self { client })
    }
}

impl Connector for MispConnector {
    fn connect(&self, base_url: &str, authkey: &str) -> ClientResult<Arc<dyn InstanceApi>> {
        Ok(Arc::new(MispClient::with_http_client(
            base_url,
            authkey,
            self.client.clone(),
        )))
    }
}
