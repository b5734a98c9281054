//! Sync topology construction.
//!
//! Linking `holder` to `peer` takes two steps: the peer hosts a sync user
//! for the holder's organisation and exports its descriptor, then the holder
//! imports that descriptor as a pull-only server record and tests it.

use crate::error::{TopologyError, TopologyResult};
use crate::federation::Federation;
use crate::graph::Topology;
use crate::instance::Instance;
use crate::provision::find_or_create_user;
use crate::upsert::find_or_create;
use fedsync_client::OrgScope;
use fedsync_types::{
    NewOrganisation, Organisation, Role, ServerUpdate, SyncDescriptor, SyncServer,
    sync_user_email,
};
use std::sync::Arc;
use tracing::{debug, info};

impl Instance {
    /// Hosts a sync user for `org` and returns the descriptor a holder
    /// imports to sync as that user.
    ///
    /// The organisation is mirrored as non-local; a local copy found by name
    /// is switched to non-local.
    pub async fn create_sync_user(&self, org: &Organisation) -> TopologyResult<SyncDescriptor> {
        let api = self.site_admin();
        let mirror = NewOrganisation::remote(org);
        let mut sync_org = find_or_create(
            "organisation",
            &org.name,
            || api.organisations(OrgScope::All),
            || api.add_organisation(&mirror),
            |o: &Organisation| o.uuid == org.uuid || o.name == org.name,
        )
        .await?
        .into_inner();
        if sync_org.local {
            debug!("Marking {} as non-local on {}", sync_org.name, self.name());
            sync_org.local = false;
            sync_org = api.update_organisation(&sync_org).await?;
        }

        let email = sync_user_email(&sync_org.name);
        let sync_user = find_or_create_user(api, &email, &sync_org.id, Role::SyncUser).await?;
        let sync_client = self.connector.connect(self.base_url(), &sync_user.authkey)?;
        Ok(sync_client.get_sync_config().await?)
    }

    /// Imports (or finds) the server record described by `descriptor`,
    /// resets it to pull-only and checks the connection.
    ///
    /// The record is kept under the counterpart's name.
    pub async fn configure_sync(&mut self, descriptor: SyncDescriptor) -> TopologyResult<SyncServer> {
        let api = Arc::clone(&self.site_admin);
        let record = find_or_create(
            "server",
            &descriptor.name,
            || api.servers(),
            || api.import_server(&descriptor),
            |s: &SyncServer| s.name == descriptor.name,
        )
        .await?
        .into_inner();
        let record = api
            .update_server(&record.id, &ServerUpdate::pull_only())
            .await?;

        let test = api.test_server(&record.id).await?;
        if !test.is_ok() {
            return Err(TopologyError::Handshake {
                holder: self.name().to_string(),
                server: record.name,
                status: test.status,
                message: test.message.unwrap_or_default(),
            });
        }

        let counterpart = record.counterpart().to_string();
        info!("{} syncs with {}", self.name(), counterpart);
        self.synchronisations.insert(counterpart, record.clone());
        Ok(record)
    }

    /// Enables or disables automatic push along the record for `counterpart`.
    pub async fn set_push(&mut self, counterpart: &str, enabled: bool) -> TopologyResult<SyncServer> {
        let id = self.edge(counterpart)?.id.clone();
        let record = self
            .site_admin
            .update_server(&id, &ServerUpdate::push(enabled))
            .await?;
        debug!("{} push to {}: {}", self.name(), counterpart, record.push);
        self.synchronisations
            .insert(counterpart.to_string(), record.clone());
        Ok(record)
    }
}

impl Federation {
    /// Makes `holder` hold a sync record of `peer`.
    pub async fn link(&mut self, holder: &str, peer: &str) -> TopologyResult<SyncServer> {
        let holder_org = self.instance(holder)?.host_org().clone();
        let descriptor = self
            .instance(peer)?
            .create_sync_user(&holder_org)
            .await?
            .named_after_org();
        self.instance_mut(holder)?.configure_sync(descriptor).await
    }

    /// Links every edge of `topology`, in order.
    pub async fn build(&mut self, topology: &Topology) -> TopologyResult<()> {
        for edge in topology.edges() {
            debug!("Linking {}", edge);
            self.link(&edge.holder, &edge.peer).await?;
        }
        info!("Topology of {} edges in place", topology.len());
        Ok(())
    }
}
