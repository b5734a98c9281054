//! A provisioned instance and its role-bound clients.

use crate::config::InstanceConfig;
use crate::error::{TopologyError, TopologyResult};
use fedsync_client::{Connector, InstanceApi};
use fedsync_types::{Organisation, SyncServer, User};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One instance of the federation after provisioning.
///
/// Holds a client per identity (site admin, org admin, member) and the sync
/// records it holds, keyed by counterpart name.
pub struct Instance {
    pub(crate) config: InstanceConfig,
    pub(crate) host_org: Organisation,
    pub(crate) users: InstanceUsers,
    pub(crate) site_admin: Arc<dyn InstanceApi>,
    pub(crate) org_admin: Arc<dyn InstanceApi>,
    pub(crate) user: Arc<dyn InstanceApi>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) synchronisations: BTreeMap<String, SyncServer>,
}

/// The three users every instance is provisioned with.
#[derive(Debug, Clone)]
pub struct InstanceUsers {
    pub site_admin: User,
    pub org_admin: User,
    pub member: User,
}

impl Instance {
    /// Name of the instance, which is the name of its host organisation.
    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn base_url(&self) -> &str {
        &self.config.baseurl
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn host_org(&self) -> &Organisation {
        &self.host_org
    }

    pub fn users(&self) -> &InstanceUsers {
        &self.users
    }

    pub fn site_admin(&self) -> &dyn InstanceApi {
        self.site_admin.as_ref()
    }

    pub fn org_admin(&self) -> &dyn InstanceApi {
        self.org_admin.as_ref()
    }

    pub fn user(&self) -> &dyn InstanceApi {
        self.user.as_ref()
    }

    /// The sync record this instance holds for `counterpart`.
    pub fn edge(&self, counterpart: &str) -> TopologyResult<&SyncServer> {
        self.synchronisations
            .get(counterpart)
            .ok_or_else(|| TopologyError::UnknownEdge {
                holder: self.name().to_string(),
                peer: counterpart.to_string(),
            })
    }

    /// All held sync records, by counterpart name.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &SyncServer)> {
        self.synchronisations
            .iter()
            .map(|(name, record)| (name.as_str(), record))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name())
            .field("base_url", &self.base_url())
            .field("edges", &self.synchronisations.keys().collect::<Vec<_>>())
            .finish()
    }
}
