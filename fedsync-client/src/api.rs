//! Capability interface of one sharing instance.
//!
//! Everything the harness does to an instance goes through [`InstanceApi`].
//! A client is always bound to one authentication key; [`Connector`] derives
//! new clients for other keys on the same or another instance.

use crate::error::ClientResult;
use async_trait::async_trait;
use fedsync_types::{
    ConnectionTest, Event, NewOrganisation, NewSharingGroup, NewTag, NewUser, OrgRef,
    Organisation, RemoteId, Role, ServerSettings, ServerUpdate, SharingGroup, SyncDescriptor,
    SyncServer, Tag, User,
};
use std::sync::Arc;
use uuid::Uuid;

/// Which organisations an organisation listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgScope {
    /// Organisations hosted on the instance.
    Local,
    /// Organisations representing remote counterparts.
    External,
    All,
}

impl OrgScope {
    /// Path segment used by the REST API.
    pub fn as_str(self) -> &'static str {
        match self {
            OrgScope::Local => "local",
            OrgScope::External => "external",
            OrgScope::All => "all",
        }
    }

    /// True if an organisation with the given `local` flag is in scope.
    pub fn includes(self, local: bool) -> bool {
        match self {
            OrgScope::Local => local,
            OrgScope::External => !local,
            OrgScope::All => true,
        }
    }
}

/// Operations exposed by one sharing instance to one key.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    /// Base URL the client talks to.
    fn base_url(&self) -> &str;

    // ── Organisations ───────────────────────────────────────────

    async fn add_organisation(&self, org: &NewOrganisation) -> ClientResult<Organisation>;

    async fn organisations(&self, scope: OrgScope) -> ClientResult<Vec<Organisation>>;

    async fn update_organisation(&self, org: &Organisation) -> ClientResult<Organisation>;

    // ── Users ───────────────────────────────────────────────────

    async fn add_user(&self, user: &NewUser) -> ClientResult<User>;

    async fn users(&self) -> ClientResult<Vec<User>>;

    async fn change_user_password(&self, user_id: &RemoteId, password: &str) -> ClientResult<()>;

    /// Sets the role given to users created without an explicit role.
    async fn set_default_role(&self, role: Role) -> ClientResult<()>;

    // ── Settings ────────────────────────────────────────────────

    async fn server_settings(&self) -> ClientResult<ServerSettings>;

    /// Updates one setting; `force` overrides settings the instance locks.
    async fn set_server_setting(&self, name: &str, value: &str, force: bool) -> ClientResult<()>;

    // ── Sync server records ─────────────────────────────────────

    /// Exports the descriptor a counterpart needs to sync as this key's user.
    async fn get_sync_config(&self) -> ClientResult<SyncDescriptor>;

    async fn servers(&self) -> ClientResult<Vec<SyncServer>>;

    /// Creates a server record from a counterpart's descriptor.
    async fn import_server(&self, descriptor: &SyncDescriptor) -> ClientResult<SyncServer>;

    async fn update_server(&self, id: &RemoteId, update: &ServerUpdate)
    -> ClientResult<SyncServer>;

    async fn delete_server(&self, id: &RemoteId) -> ClientResult<()>;

    async fn test_server(&self, id: &RemoteId) -> ClientResult<ConnectionTest>;

    /// Pushes one event, or every published event when `event_id` is `None`.
    async fn server_push(&self, id: &RemoteId, event_id: Option<&RemoteId>) -> ClientResult<()>;

    async fn server_pull(&self, id: &RemoteId) -> ClientResult<()>;

    // ── Tags ────────────────────────────────────────────────────

    async fn add_tag(&self, tag: &NewTag) -> ClientResult<Tag>;

    async fn tags(&self) -> ClientResult<Vec<Tag>>;

    async fn delete_tag(&self, id: &RemoteId) -> ClientResult<()>;

    // ── Sharing groups ──────────────────────────────────────────

    async fn add_sharing_group(&self, group: &NewSharingGroup) -> ClientResult<SharingGroup>;

    async fn sharing_groups(&self) -> ClientResult<Vec<SharingGroup>>;

    async fn delete_sharing_group(&self, id: &RemoteId) -> ClientResult<()>;

    async fn add_org_to_sharing_group(&self, group_id: &RemoteId, org: &OrgRef)
    -> ClientResult<()>;

    /// Adds a server record as member; id `0` stands for the local instance.
    async fn add_server_to_sharing_group(
        &self,
        group_id: &RemoteId,
        server_id: &RemoteId,
    ) -> ClientResult<()>;

    // ── Events ──────────────────────────────────────────────────

    async fn add_event(&self, event: &Event) -> ClientResult<Event>;

    async fn publish(&self, event_id: &RemoteId) -> ClientResult<()>;

    /// Returns the event as this key sees it, or `None` if it is absent or
    /// invisible.
    async fn get_event(&self, uuid: &Uuid) -> ClientResult<Option<Event>>;

    async fn delete_event(&self, uuid: &Uuid) -> ClientResult<()>;
}

/// Derives clients bound to a given key.
pub trait Connector: Send + Sync {
    fn connect(&self, base_url: &str, authkey: &str) -> ClientResult<Arc<dyn InstanceApi>>;
}

/// Normalises a base URL for comparison (no trailing slash).
pub fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
