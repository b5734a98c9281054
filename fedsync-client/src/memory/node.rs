//! State of one simulated instance and its visibility rules.

use crate::api::normalize_url;
use fedsync_types::settings::{SETTING_EXTERNAL_BASEURL, SETTING_HOST_ORG_ID};
use fedsync_types::{
    Distribution, Event, OrgRef, Organisation, RemoteId, Role, SharingGroup, SyncServer, Tag,
    User,
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Name of the organisation every fresh instance starts with.
pub const BOOTSTRAP_ORG: &str = "ORGNAME";
/// Email of the bootstrap administrator.
pub const BOOTSTRAP_ADMIN: &str = "admin@admin.test";

/// A server record plus the local organisation that owns the connection.
#[derive(Debug, Clone)]
pub(crate) struct StoredServer {
    pub record: SyncServer,
    pub owner_org_id: RemoteId,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub base_url: String,
    pub uuid: Uuid,
    pub orgs: Vec<Organisation>,
    pub users: Vec<User>,
    pub passwords: HashMap<RemoteId, String>,
    pub servers: Vec<StoredServer>,
    pub tags: Vec<Tag>,
    pub sharing_groups: Vec<SharingGroup>,
    pub events: Vec<Event>,
    pub settings: BTreeMap<String, String>,
    pub default_role: Role,
    /// Number of settings polls that still report unhealthy workers.
    pub pending_worker_polls: u32,
    pub reachable: bool,
    next_id: u64,
}

pub(crate) fn random_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect()
}

impl Node {
    pub fn new(base_url: &str, bootstrap_key: &str) -> Self {
        let org = Organisation {
            id: RemoteId::from(1),
            uuid: Uuid::new_v4(),
            name: BOOTSTRAP_ORG.to_string(),
            local: true,
        };
        let admin = User {
            id: RemoteId::from(1),
            email: BOOTSTRAP_ADMIN.to_string(),
            org_id: org.id.clone(),
            role: Role::SiteAdmin,
            authkey: bootstrap_key.to_string(),
            change_pw: true,
        };
        Self {
            base_url: normalize_url(base_url).to_string(),
            uuid: Uuid::new_v4(),
            orgs: vec![org],
            users: vec![admin],
            passwords: HashMap::new(),
            servers: Vec::new(),
            tags: Vec::new(),
            sharing_groups: Vec::new(),
            events: Vec::new(),
            settings: BTreeMap::new(),
            default_role: Role::User,
            pending_worker_polls: 0,
            reachable: true,
            next_id: 100,
        }
    }

    /// Ids are unique per instance across entity kinds.
    pub fn next_id(&mut self) -> RemoteId {
        self.next_id += 1;
        RemoteId::from(self.next_id)
    }

    pub fn user_by_key(&self, authkey: &str) -> Option<&User> {
        self.users.iter().find(|u| u.authkey == authkey)
    }

    pub fn org(&self, id: &RemoteId) -> Option<&Organisation> {
        self.orgs.iter().find(|o| &o.id == id)
    }

    pub fn org_by_uuid(&self, uuid: &Uuid) -> Option<&Organisation> {
        self.orgs.iter().find(|o| &o.uuid == uuid)
    }

    /// Organisation configured as host, falling back to the bootstrap org.
    pub fn host_org(&self) -> Option<&Organisation> {
        self.settings
            .get(SETTING_HOST_ORG_ID)
            .and_then(|id| self.org(&RemoteId::new(id.as_str())))
            .or_else(|| self.orgs.first())
    }

    pub fn external_url(&self) -> String {
        self.settings
            .get(SETTING_EXTERNAL_BASEURL)
            .map(|url| normalize_url(url).to_string())
            .unwrap_or_else(|| self.base_url.clone())
    }

    pub fn server(&self, id: &RemoteId) -> Option<&StoredServer> {
        self.servers.iter().find(|s| &s.record.id == id)
    }

    pub fn sharing_group(&self, id: &RemoteId) -> Option<&SharingGroup> {
        self.sharing_groups.iter().find(|g| &g.id == id)
    }

    pub fn event_index(&self, uuid: &Uuid) -> Option<usize> {
        self.events.iter().position(|e| &e.uuid == uuid)
    }

    /// Local ids of the tags with the given names.
    pub fn tag_ids<'a>(&self, names: impl Iterator<Item = &'a str>) -> Vec<RemoteId> {
        let names: Vec<&str> = names.collect();
        self.tags
            .iter()
            .filter(|t| names.contains(&t.name.as_str()))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Finds the local copy of a (possibly remote) organisation, creating a
    /// non-local one if the instance has never seen it.
    pub fn ensure_remote_org(&mut self, org: &OrgRef) -> Organisation {
        // Names only identify organisations that arrive without a uuid.
        let existing = match &org.uuid {
            Some(uuid) => self.org_by_uuid(uuid),
            None => self.orgs.iter().find(|o| o.name == org.name),
        };
        if let Some(existing) = existing {
            return existing.clone();
        }

        let created = Organisation {
            id: self.next_id(),
            uuid: org.uuid.unwrap_or_else(Uuid::new_v4),
            name: org.name.clone(),
            local: false,
        };
        self.orgs.push(created.clone());
        created
    }

    fn org_uuid_of(&self, user: &User) -> Option<Uuid> {
        self.org(&user.org_id).map(|o| o.uuid)
    }

    fn is_sharing_group_member(&self, group_id: Option<&RemoteId>, org_uuid: Option<Uuid>) -> bool {
        match (group_id.and_then(|id| self.sharing_group(id)), org_uuid) {
            (Some(group), Some(uuid)) => group.has_org(&uuid),
            _ => false,
        }
    }

    fn admits_other_org(
        &self,
        distribution: Distribution,
        group_id: Option<&RemoteId>,
        org_uuid: Option<Uuid>,
    ) -> bool {
        match distribution {
            Distribution::YourOrganisationOnly => false,
            Distribution::SharingGroup => self.is_sharing_group_member(group_id, org_uuid),
            _ => true,
        }
    }

    /// The event as `viewer` sees it, or `None` if it is hidden entirely.
    ///
    /// Site admins and members of the owning organisation see everything.
    /// Other users lose own-organisation-only content and sharing-group
    /// content of groups their organisation is not a member of.
    pub fn view_event(&self, event: &Event, viewer: &User) -> Option<Event> {
        if viewer.role == Role::SiteAdmin {
            return Some(event.clone());
        }

        let viewer_org = self.org_uuid_of(viewer);
        let owner = event.org.as_ref().and_then(|o| o.uuid);
        if viewer_org.is_some() && viewer_org == owner {
            return Some(event.clone());
        }

        if !self.admits_other_org(
            event.distribution,
            event.sharing_group_id.as_ref(),
            viewer_org,
        ) {
            return None;
        }

        let mut view = event.clone();
        let event_level = event.distribution;
        view.attributes.retain(|a| {
            self.admits_other_org(
                a.distribution.resolve(event_level),
                a.sharing_group_id.as_ref(),
                viewer_org,
            )
        });
        view.objects.retain(|o| {
            self.admits_other_org(
                o.distribution.resolve(event_level),
                o.sharing_group_id.as_ref(),
                viewer_org,
            )
        });
        for object in &mut view.objects {
            let object_level = object.distribution.resolve(event_level);
            object.attributes.retain(|a| {
                self.admits_other_org(
                    a.distribution.resolve(object_level),
                    a.sharing_group_id.as_ref(),
                    viewer_org,
                )
            });
        }
        Some(view)
    }

    /// True if the sharing group lists a member server pointing at `url`.
    pub fn group_releases_to(&self, group_id: Option<&RemoteId>, url: &str) -> bool {
        let Some(group) = group_id.and_then(|id| self.sharing_group(id)) else {
            return false;
        };
        group.servers.iter().filter(|m| !m.is_local()).any(|m| {
            let member_url = m
                .url
                .clone()
                .or_else(|| self.server(&m.server_id).map(|s| s.record.url.clone()));
            member_url.is_some_and(|u| normalize_url(&u) == normalize_url(url))
        })
    }
}
