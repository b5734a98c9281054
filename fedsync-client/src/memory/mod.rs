//! In-process federation of simulated sharing instances.
//!
//! [`MemoryFederation`] holds any number of instances keyed by base URL and
//! implements [`Connector`], so everything built on [`InstanceApi`] can run
//! without a network. Instances enforce the behaviour the harness depends
//! on: creation conflicts on duplicate names, locked settings, key-based
//! authentication, role-scoped visibility and distribution-aware push/pull
//! with automatic push chaining.

mod node;
mod propagation;

pub use node::{BOOTSTRAP_ADMIN, BOOTSTRAP_ORG};

use crate::api::{Connector, InstanceApi, OrgScope, normalize_url};
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use fedsync_types::settings::{SETTING_BASEURL, SETTING_EXTERNAL_BASEURL};
use fedsync_types::{
    ConnectionTest, Event, NewOrganisation, NewSharingGroup, NewTag, NewUser, OrgRef,
    Organisation, RemoteId, Role, ServerSettings, ServerUpdate, SharingGroup, SharingGroupServer,
    SyncDescriptor, SyncServer, Tag, User,
};
use node::{Node, StoredServer, random_key};
use propagation::{ingest, passes_rules, release_for_pull, release_for_push, same_instance};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Settings an administrator may only change with `force`.
const LOCKED_SETTINGS: [&str; 2] = [SETTING_BASEURL, SETTING_EXTERNAL_BASEURL];

fn rejected(message: impl Into<String>) -> ClientError {
    ClientError::Rejected {
        status: 403,
        message: message.into(),
    }
}

fn require_site_admin(user: &User) -> ClientResult<()> {
    if user.role == Role::SiteAdmin {
        Ok(())
    } else {
        Err(ClientError::Forbidden(format!("{} is not a site admin", user.email)))
    }
}

fn require_admin(user: &User) -> ClientResult<()> {
    match user.role {
        Role::SiteAdmin | Role::OrgAdmin => Ok(()),
        _ => Err(ClientError::Forbidden(format!("{} is not an admin", user.email))),
    }
}

/// One queued push of an event along a server record.
#[derive(Debug, Clone)]
struct Transfer {
    from: String,
    server_id: RemoteId,
    event: Uuid,
    /// Instances the event already passed through on this chain.
    visited: Vec<String>,
    /// Failures of explicit transfers surface to the caller; chained ones are
    /// only logged.
    explicit: bool,
}

#[derive(Debug, Default)]
struct FederationState {
    nodes: BTreeMap<String, Node>,
}

impl FederationState {
    fn node(&self, url: &str) -> ClientResult<&Node> {
        self.nodes
            .get(normalize_url(url))
            .filter(|n| n.reachable)
            .ok_or_else(|| ClientError::Network(format!("no instance reachable at {url}")))
    }

    fn node_mut(&mut self, url: &str) -> ClientResult<&mut Node> {
        self.nodes
            .get_mut(normalize_url(url))
            .filter(|n| n.reachable)
            .ok_or_else(|| ClientError::Network(format!("no instance reachable at {url}")))
    }

    fn caller(&self, url: &str, authkey: &str) -> ClientResult<User> {
        self.node(url)?
            .user_by_key(authkey)
            .cloned()
            .ok_or_else(|| ClientError::AuthFailed(format!("key not accepted by {url}")))
    }

    fn run_transfers(&mut self, initial: Vec<Transfer>) -> ClientResult<()> {
        let mut queue = VecDeque::from(initial);
        while let Some(transfer) = queue.pop_front() {
            let delivered = match self.transfer(&transfer) {
                Ok(delivered) => delivered,
                Err(e) if transfer.explicit => return Err(e),
                Err(e) => {
                    warn!(
                        "Automatic push from {} along server {} failed: {}",
                        transfer.from, transfer.server_id, e
                    );
                    None
                }
            };
            let Some(dest_url) = delivered else {
                continue;
            };

            let mut visited = transfer.visited.clone();
            visited.push(transfer.from.clone());
            let dest = self.node(&dest_url)?;
            for stored in dest.servers.iter().filter(|s| s.record.push) {
                if visited.iter().any(|v| same_instance(v, &stored.record.url)) {
                    continue;
                }
                queue.push_back(Transfer {
                    from: dest_url.clone(),
                    server_id: stored.record.id.clone(),
                    event: transfer.event,
                    visited: visited.clone(),
                    explicit: false,
                });
            }
        }
        Ok(())
    }

    /// Delivers one event along one record. Returns the receiving instance's
    /// URL when something was stored there.
    fn transfer(&mut self, transfer: &Transfer) -> ClientResult<Option<String>> {
        let source = self.node(&transfer.from)?;
        let stored = source
            .server(&transfer.server_id)
            .ok_or_else(|| ClientError::NotFound(format!("server {}", transfer.server_id)))?;
        let dest_url = normalize_url(&stored.record.url).to_string();
        if same_instance(&dest_url, &transfer.from)
            || transfer.visited.iter().any(|v| same_instance(v, &dest_url))
        {
            return Ok(None);
        }
        let Some(index) = source.event_index(&transfer.event) else {
            return Ok(None);
        };
        let Some(released) = release_for_push(
            source,
            &source.events[index],
            &stored.record.push_rules,
            &dest_url,
        ) else {
            debug!("Event {} withheld from {}", transfer.event, dest_url);
            return Ok(None);
        };
        let groups = source.sharing_groups.clone();
        let authkey = stored.record.authkey.clone();

        let dest = self.node_mut(&dest_url)?;
        let pusher = dest
            .user_by_key(&authkey)
            .ok_or_else(|| ClientError::AuthFailed(format!("push key not accepted by {dest_url}")))?;
        if !matches!(pusher.role, Role::SyncUser | Role::SiteAdmin) {
            return Err(ClientError::Forbidden(format!(
                "{} may not receive pushed events",
                pusher.email
            )));
        }
        let owner = dest
            .org(&pusher.org_id)
            .map(Organisation::to_ref)
            .ok_or_else(|| ClientError::UnexpectedResponse("sync user without org".into()))?;
        ingest(dest, released, owner, &groups);
        debug!("Event {} pushed {} -> {}", transfer.event, transfer.from, dest_url);
        Ok(Some(dest_url))
    }

    fn pull(&mut self, dest_url: &str, server_id: &RemoteId) -> ClientResult<usize> {
        let dest = self.node(dest_url)?;
        let stored = dest
            .server(server_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("server {server_id}")))?;
        let owner = dest
            .org(&stored.owner_org_id)
            .map(Organisation::to_ref)
            .ok_or_else(|| ClientError::UnexpectedResponse("server without owner".into()))?;

        let source = self.node(&stored.record.url)?;
        let sync_user = source.user_by_key(&stored.record.authkey).ok_or_else(|| {
            ClientError::AuthFailed(format!("pull key not accepted by {}", stored.record.url))
        })?;
        let released: Vec<Event> = source
            .events
            .iter()
            .filter_map(|e| release_for_pull(source, e, sync_user))
            .collect();
        let groups = source.sharing_groups.clone();

        let dest = self.node_mut(dest_url)?;
        let mut count = 0;
        for event in released {
            if passes_rules(dest, &stored.record.pull_rules, &event) {
                ingest(dest, event, owner.clone(), &groups);
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Shared handle to a set of simulated instances.
#[derive(Debug, Clone, Default)]
pub struct MemoryFederation {
    state: Arc<Mutex<FederationState>>,
}

impl MemoryFederation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fresh instance with the bootstrap organisation and a site admin
    /// authenticated by `bootstrap_key`. Replaces any instance at the URL.
    pub async fn add_instance(&self, base_url: &str, bootstrap_key: &str) {
        let node = Node::new(base_url, bootstrap_key);
        let mut state = self.state.lock().await;
        state.nodes.insert(node.base_url.clone(), node);
    }

    /// Makes the next `polls` settings reads report unhealthy workers.
    pub async fn set_worker_delay(&self, base_url: &str, polls: u32) {
        if let Some(node) = self.state.lock().await.nodes.get_mut(normalize_url(base_url)) {
            node.pending_worker_polls = polls;
        }
    }

    /// Takes an instance off the network (or back on).
    pub async fn set_reachable(&self, base_url: &str, reachable: bool) {
        if let Some(node) = self.state.lock().await.nodes.get_mut(normalize_url(base_url)) {
            node.reachable = reachable;
        }
    }

    /// Simulates a user's first login, which clears the password change flag.
    pub async fn mark_logged_in(&self, base_url: &str, email: &str) {
        if let Some(node) = self.state.lock().await.nodes.get_mut(normalize_url(base_url)) {
            if let Some(user) = node.users.iter_mut().find(|u| u.email == email) {
                user.change_pw = false;
            }
        }
    }

    /// Password last set for `email`, if any.
    pub async fn password_of(&self, base_url: &str, email: &str) -> Option<String> {
        let state = self.state.lock().await;
        let node = state.nodes.get(normalize_url(base_url))?;
        let user = node.users.iter().find(|u| u.email == email)?;
        node.passwords.get(&user.id).cloned()
    }

    /// Number of events stored on an instance regardless of visibility.
    pub async fn stored_events(&self, base_url: &str) -> usize {
        self.state
            .lock()
            .await
            .nodes
            .get(normalize_url(base_url))
            .map_or(0, |n| n.events.len())
    }

    /// A client bound to `authkey` on the instance at `base_url`.
    pub fn client(&self, base_url: &str, authkey: &str) -> MemoryClient {
        MemoryClient {
            state: Arc::clone(&self.state),
            base_url: normalize_url(base_url).to_string(),
            authkey: authkey.to_string(),
        }
    }
}

impl Connector for MemoryFederation {
    fn connect(&self, base_url: &str, authkey: &str) -> ClientResult<Arc<dyn InstanceApi>> {
        Ok(Arc::new(self.client(base_url, authkey)))
    }
}

/// [`InstanceApi`] implementation backed by a [`MemoryFederation`].
#[derive(Debug, Clone)]
pub struct MemoryClient {
    state: Arc<Mutex<FederationState>>,
    base_url: String,
    authkey: String,
}

#[async_trait]
impl InstanceApi for MemoryClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Organisations ───────────────────────────────────────────

    async fn add_organisation(&self, org: &NewOrganisation) -> ClientResult<Organisation> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        if node.orgs.iter().any(|o| o.name == org.name) {
            return Err(rejected(format!("organisation {} already exists", org.name)));
        }
        if let Some(uuid) = org.uuid {
            if node.org_by_uuid(&uuid).is_some() {
                return Err(rejected(format!("organisation uuid {uuid} already in use")));
            }
        }
        let created = Organisation {
            id: node.next_id(),
            uuid: org.uuid.unwrap_or_else(Uuid::new_v4),
            name: org.name.clone(),
            local: org.local,
        };
        node.orgs.push(created.clone());
        Ok(created)
    }

    async fn organisations(&self, scope: OrgScope) -> ClientResult<Vec<Organisation>> {
        let state = self.state.lock().await;
        state.caller(&self.base_url, &self.authkey)?;
        let node = state.node(&self.base_url)?;
        Ok(node
            .orgs
            .iter()
            .filter(|o| scope.includes(o.local))
            .cloned()
            .collect())
    }

    async fn update_organisation(&self, org: &Organisation) -> ClientResult<Organisation> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        if node.orgs.iter().any(|o| o.name == org.name && o.id != org.id) {
            return Err(rejected(format!("organisation {} already exists", org.name)));
        }
        let stored = node
            .orgs
            .iter_mut()
            .find(|o| o.id == org.id)
            .ok_or_else(|| ClientError::NotFound(format!("organisation {}", org.id)))?;
        stored.name = org.name.clone();
        stored.local = org.local;
        Ok(stored.clone())
    }

    // ── Users ───────────────────────────────────────────────────

    async fn add_user(&self, user: &NewUser) -> ClientResult<User> {
        let mut state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        require_admin(&caller)?;
        let foreign = caller.org_id != user.org_id || user.role == Role::SiteAdmin;
        if caller.role != Role::SiteAdmin && foreign {
            return Err(ClientError::Forbidden(format!(
                "{} may only add users to its own organisation",
                caller.email
            )));
        }
        let node = state.node_mut(&self.base_url)?;
        if node.users.iter().any(|u| u.email == user.email) {
            return Err(rejected(format!("email {} already in use", user.email)));
        }
        if node.org(&user.org_id).is_none() {
            return Err(rejected(format!("invalid organisation {}", user.org_id)));
        }
        let created = User {
            id: node.next_id(),
            email: user.email.clone(),
            org_id: user.org_id.clone(),
            role: user.role,
            authkey: random_key(),
            change_pw: true,
        };
        node.users.push(created.clone());
        Ok(created)
    }

    async fn users(&self) -> ClientResult<Vec<User>> {
        let state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        require_admin(&caller)?;
        let node = state.node(&self.base_url)?;
        Ok(node
            .users
            .iter()
            .filter(|u| caller.role == Role::SiteAdmin || u.org_id == caller.org_id)
            .cloned()
            .collect())
    }

    async fn change_user_password(&self, user_id: &RemoteId, password: &str) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        if !node.users.iter().any(|u| &u.id == user_id) {
            return Err(ClientError::NotFound(format!("user {user_id}")));
        }
        node.passwords.insert(user_id.clone(), password.to_string());
        Ok(())
    }

    async fn set_default_role(&self, role: Role) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        state.node_mut(&self.base_url)?.default_role = role;
        Ok(())
    }

    // ── Settings ────────────────────────────────────────────────

    async fn server_settings(&self) -> ClientResult<ServerSettings> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        if node.pending_worker_polls > 0 {
            node.pending_worker_polls -= 1;
            return Ok(ServerSettings::default());
        }
        Ok(ServerSettings::healthy())
    }

    async fn set_server_setting(&self, name: &str, value: &str, force: bool) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        if LOCKED_SETTINGS.contains(&name) && !force {
            return Err(rejected(format!("setting {name} is locked")));
        }
        state
            .node_mut(&self.base_url)?
            .settings
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    // ── Sync server records ─────────────────────────────────────

    async fn get_sync_config(&self) -> ClientResult<SyncDescriptor> {
        let state = self.state.lock().await;
        state.caller(&self.base_url, &self.authkey)?;
        let node = state.node(&self.base_url)?;
        let host = node
            .host_org()
            .ok_or_else(|| ClientError::UnexpectedResponse("instance has no host org".into()))?;
        Ok(SyncDescriptor {
            name: node.base_url.clone(),
            url: node.external_url(),
            uuid: Some(node.uuid),
            authkey: self.authkey.clone(),
            organisation: OrgRef {
                id: None,
                uuid: Some(host.uuid),
                name: host.name.clone(),
            },
        })
    }

    async fn servers(&self) -> ClientResult<Vec<SyncServer>> {
        let state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node(&self.base_url)?;
        Ok(node.servers.iter().map(|s| s.record.clone()).collect())
    }

    async fn import_server(&self, descriptor: &SyncDescriptor) -> ClientResult<SyncServer> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        let remote_org = node.ensure_remote_org(&descriptor.organisation);
        let owner_org_id = node
            .host_org()
            .map(|o| o.id.clone())
            .ok_or_else(|| ClientError::UnexpectedResponse("instance has no host org".into()))?;
        let record = SyncServer {
            id: node.next_id(),
            name: descriptor.name.clone(),
            url: normalize_url(&descriptor.url).to_string(),
            authkey: descriptor.authkey.clone(),
            uuid: descriptor.uuid,
            remote_org_id: remote_org.id,
            pull: false,
            push: false,
            push_rules: Default::default(),
            pull_rules: Default::default(),
        };
        node.servers.push(StoredServer {
            record: record.clone(),
            owner_org_id,
        });
        Ok(record)
    }

    async fn update_server(
        &self,
        id: &RemoteId,
        update: &ServerUpdate,
    ) -> ClientResult<SyncServer> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        let stored = node
            .servers
            .iter_mut()
            .find(|s| &s.record.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("server {id}")))?;
        update.apply_to(&mut stored.record);
        Ok(stored.record.clone())
    }

    async fn delete_server(&self, id: &RemoteId) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        let before = node.servers.len();
        node.servers.retain(|s| &s.record.id != id);
        if node.servers.len() == before {
            return Err(ClientError::NotFound(format!("server {id}")));
        }
        Ok(())
    }

    async fn test_server(&self, id: &RemoteId) -> ClientResult<ConnectionTest> {
        let state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let record = state
            .node(&self.base_url)?
            .server(id)
            .map(|s| s.record.clone())
            .ok_or_else(|| ClientError::NotFound(format!("server {id}")))?;

        let Ok(remote) = state.node(&record.url) else {
            return Ok(ConnectionTest {
                status: 2,
                message: Some("Server unreachable".into()),
            });
        };
        Ok(match remote.user_by_key(&record.authkey) {
            None => ConnectionTest {
                status: 3,
                message: Some("Authentication failed".into()),
            },
            Some(user) if !matches!(user.role, Role::SyncUser | Role::SiteAdmin) => {
                ConnectionTest {
                    status: 4,
                    message: Some("Remote user lacks sync permission".into()),
                }
            }
            Some(_) => ConnectionTest::ok(),
        })
    }

    async fn server_push(&self, id: &RemoteId, event_id: Option<&RemoteId>) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node(&self.base_url)?;
        if node.server(id).is_none() {
            return Err(ClientError::NotFound(format!("server {id}")));
        }
        let events: Vec<Uuid> = match event_id {
            Some(event_id) => {
                let event = node
                    .events
                    .iter()
                    .find(|e| e.id.as_ref() == Some(event_id))
                    .ok_or_else(|| ClientError::NotFound(format!("event {event_id}")))?;
                vec![event.uuid]
            }
            None => node
                .events
                .iter()
                .filter(|e| e.published)
                .map(|e| e.uuid)
                .collect(),
        };
        let transfers = events
            .into_iter()
            .map(|event| Transfer {
                from: self.base_url.clone(),
                server_id: id.clone(),
                event,
                visited: Vec::new(),
                explicit: true,
            })
            .collect();
        state.run_transfers(transfers)
    }

    async fn server_pull(&self, id: &RemoteId) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let count = state.pull(&self.base_url, id)?;
        debug!("Pulled {} events into {}", count, self.base_url);
        Ok(())
    }

    // ── Tags ────────────────────────────────────────────────────

    async fn add_tag(&self, tag: &NewTag) -> ClientResult<Tag> {
        let mut state = self.state.lock().await;
        require_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        if node.tags.iter().any(|t| t.name == tag.name) {
            return Err(rejected(format!("tag {} already exists", tag.name)));
        }
        let created = Tag {
            id: node.next_id(),
            name: tag.name.clone(),
            exportable: tag.exportable,
            org_id: tag.org_id.clone(),
        };
        node.tags.push(created.clone());
        Ok(created)
    }

    async fn tags(&self) -> ClientResult<Vec<Tag>> {
        let state = self.state.lock().await;
        state.caller(&self.base_url, &self.authkey)?;
        Ok(state.node(&self.base_url)?.tags.clone())
    }

    async fn delete_tag(&self, id: &RemoteId) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        let before = node.tags.len();
        node.tags.retain(|t| &t.id != id);
        if node.tags.len() == before {
            return Err(ClientError::NotFound(format!("tag {id}")));
        }
        Ok(())
    }

    // ── Sharing groups ──────────────────────────────────────────

    async fn add_sharing_group(&self, group: &NewSharingGroup) -> ClientResult<SharingGroup> {
        let mut state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        require_admin(&caller)?;
        let node = state.node_mut(&self.base_url)?;
        if node.sharing_groups.iter().any(|g| g.name == group.name) {
            return Err(rejected(format!("sharing group {} already exists", group.name)));
        }
        let creator = node
            .org(&caller.org_id)
            .map(Organisation::to_ref)
            .ok_or_else(|| ClientError::UnexpectedResponse("caller without org".into()))?;
        let created = SharingGroup {
            id: node.next_id(),
            uuid: Uuid::new_v4(),
            name: group.name.clone(),
            releasability: group.releasability.clone(),
            organisations: vec![creator],
            servers: Vec::new(),
        };
        node.sharing_groups.push(created.clone());
        Ok(created)
    }

    async fn sharing_groups(&self) -> ClientResult<Vec<SharingGroup>> {
        let state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        let node = state.node(&self.base_url)?;
        let caller_org = node.org(&caller.org_id).map(|o| o.uuid);
        Ok(node
            .sharing_groups
            .iter()
            .filter(|g| {
                caller.role == Role::SiteAdmin || caller_org.is_some_and(|uuid| g.has_org(&uuid))
            })
            .cloned()
            .collect())
    }

    async fn delete_sharing_group(&self, id: &RemoteId) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_site_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        let before = node.sharing_groups.len();
        node.sharing_groups.retain(|g| &g.id != id);
        if node.sharing_groups.len() == before {
            return Err(ClientError::NotFound(format!("sharing group {id}")));
        }
        Ok(())
    }

    async fn add_org_to_sharing_group(
        &self,
        group_id: &RemoteId,
        org: &OrgRef,
    ) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        let member = org
            .uuid
            .as_ref()
            .and_then(|uuid| node.org_by_uuid(uuid))
            .or_else(|| org.id.as_ref().and_then(|id| node.org(id)))
            .or_else(|| node.orgs.iter().find(|o| o.name == org.name))
            .map(Organisation::to_ref)
            .ok_or_else(|| ClientError::NotFound(format!("organisation {}", org.name)))?;
        let group = node
            .sharing_groups
            .iter_mut()
            .find(|g| &g.id == group_id)
            .ok_or_else(|| ClientError::NotFound(format!("sharing group {group_id}")))?;
        if !group.organisations.iter().any(|o| o.uuid == member.uuid) {
            group.organisations.push(member);
        }
        Ok(())
    }

    async fn add_server_to_sharing_group(
        &self,
        group_id: &RemoteId,
        server_id: &RemoteId,
    ) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        require_admin(&state.caller(&self.base_url, &self.authkey)?)?;
        let node = state.node_mut(&self.base_url)?;
        let member = if server_id.as_u64() == Some(RemoteId::LOCAL_SERVER) {
            SharingGroupServer {
                server_id: server_id.clone(),
                url: None,
            }
        } else {
            let stored = node
                .server(server_id)
                .ok_or_else(|| ClientError::NotFound(format!("server {server_id}")))?;
            SharingGroupServer {
                server_id: server_id.clone(),
                url: Some(stored.record.url.clone()),
            }
        };
        let group = node
            .sharing_groups
            .iter_mut()
            .find(|g| &g.id == group_id)
            .ok_or_else(|| ClientError::NotFound(format!("sharing group {group_id}")))?;
        if !group.servers.iter().any(|s| s.server_id == member.server_id) {
            group.servers.push(member);
        }
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────

    async fn add_event(&self, event: &Event) -> ClientResult<Event> {
        let mut state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        if caller.role == Role::ReadOnly {
            return Err(ClientError::Forbidden(format!("{} is read-only", caller.email)));
        }
        let node = state.node_mut(&self.base_url)?;
        if node.event_index(&event.uuid).is_some() {
            return Err(rejected(format!("event {} already exists", event.uuid)));
        }
        let owner = node
            .org(&caller.org_id)
            .map(Organisation::to_ref)
            .ok_or_else(|| ClientError::UnexpectedResponse("caller without org".into()))?;
        let mut created = event.clone();
        created.id = Some(node.next_id());
        created.org = Some(owner.clone());
        created.orgc = Some(owner);
        created.published = false;
        node.events.push(created.clone());
        Ok(created)
    }

    async fn publish(&self, event_id: &RemoteId) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        if !matches!(caller.role, Role::SiteAdmin | Role::OrgAdmin | Role::Publisher) {
            return Err(ClientError::Forbidden(format!("{} may not publish", caller.email)));
        }
        let node = state.node_mut(&self.base_url)?;
        let caller_org = node.org(&caller.org_id).map(|o| o.uuid);
        let event = node
            .events
            .iter_mut()
            .find(|e| e.id.as_ref() == Some(event_id))
            .ok_or_else(|| ClientError::NotFound(format!("event {event_id}")))?;
        let owned = event.org.as_ref().and_then(|o| o.uuid) == caller_org;
        if caller.role != Role::SiteAdmin && !owned {
            return Err(ClientError::Forbidden(format!(
                "{} may not publish events of other organisations",
                caller.email
            )));
        }
        event.published = true;
        let uuid = event.uuid;

        let transfers = node
            .servers
            .iter()
            .filter(|s| s.record.push)
            .map(|s| Transfer {
                from: self.base_url.clone(),
                server_id: s.record.id.clone(),
                event: uuid,
                visited: Vec::new(),
                explicit: false,
            })
            .collect();
        state.run_transfers(transfers)
    }

    async fn get_event(&self, uuid: &Uuid) -> ClientResult<Option<Event>> {
        let state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        let node = state.node(&self.base_url)?;
        Ok(node
            .event_index(uuid)
            .and_then(|index| node.view_event(&node.events[index], &caller)))
    }

    async fn delete_event(&self, uuid: &Uuid) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        let caller = state.caller(&self.base_url, &self.authkey)?;
        let node = state.node_mut(&self.base_url)?;
        let index = node
            .event_index(uuid)
            .filter(|&i| node.view_event(&node.events[i], &caller).is_some())
            .ok_or_else(|| ClientError::NotFound(format!("event {uuid}")))?;
        let caller_org = node.org(&caller.org_id).map(|o| o.uuid);
        let owned = node.events[index].org.as_ref().and_then(|o| o.uuid) == caller_org;
        let may_delete = caller.role == Role::SiteAdmin
            || (owned && !matches!(caller.role, Role::ReadOnly | Role::SyncUser));
        if !may_delete {
            return Err(ClientError::Forbidden(format!(
                "{} may not delete event {uuid}",
                caller.email
            )));
        }
        node.events.remove(index);
        Ok(())
    }
}
