//! Push filters and sharing groups on a provisioned instance.

use crate::error::{TopologyError, TopologyResult};
use crate::instance::Instance;
use crate::upsert::find_or_create;
use fedsync_types::{
    FilterRules, NewSharingGroup, NewTag, OrgRef, RemoteId, ServerUpdate, SharingGroup,
    SyncServer, Tag,
};
use tracing::{debug, info};

impl Instance {
    /// Restricts push towards `counterpart` to events carrying `tag_name`.
    ///
    /// The tag is created non-exportable and owned by the host organisation
    /// if it does not exist yet.
    pub async fn restrict_push(&mut self, counterpart: &str, tag_name: &str) -> TopologyResult<Tag> {
        let id = self.edge(counterpart)?.id.clone();
        let api = self.site_admin();
        let new_tag = NewTag {
            name: tag_name.to_string(),
            exportable: false,
            org_id: self.host_org.id.clone(),
        };
        let tag = find_or_create(
            "tag",
            tag_name,
            || api.tags(),
            || api.add_tag(&new_tag),
            |t: &Tag| t.name == tag_name,
        )
        .await?
        .into_inner();

        let update = ServerUpdate::push_rules(FilterRules::tags_only(tag.id.clone()));
        let record = api.update_server(&id, &update).await?;
        info!("{} pushes to {} only events tagged {}", self.name(), counterpart, tag.name);
        self.remember(counterpart, record);
        Ok(tag)
    }

    /// Lifts every push rule on the record for `counterpart`.
    pub async fn clear_push_rules(&mut self, counterpart: &str) -> TopologyResult<SyncServer> {
        let id = self.edge(counterpart)?.id.clone();
        let record = self
            .site_admin()
            .update_server(&id, &ServerUpdate::push_rules(FilterRules::default()))
            .await?;
        self.remember(counterpart, record.clone());
        Ok(record)
    }

    /// Finds or creates a sharing group with the given members.
    ///
    /// Members are only added when the group is created; an existing group is
    /// returned as found. `member_servers` are ids of local server records,
    /// `0` standing for this instance.
    pub async fn create_sharing_group(
        &self,
        name: &str,
        releasability: &str,
        member_servers: &[RemoteId],
        member_orgs: &[OrgRef],
    ) -> TopologyResult<SharingGroup> {
        let api = self.site_admin();
        let new_group = NewSharingGroup {
            name: name.to_string(),
            releasability: releasability.to_string(),
        };
        let upsert = find_or_create(
            "sharing group",
            name,
            || api.sharing_groups(),
            || api.add_sharing_group(&new_group),
            |g: &SharingGroup| g.name == name,
        )
        .await?;
        if !upsert.was_created() {
            return Ok(upsert.into_inner());
        }

        let group = upsert.into_inner();
        for server_id in member_servers {
            debug!("Adding server {} to sharing group {}", server_id, name);
            api.add_server_to_sharing_group(&group.id, server_id).await?;
        }
        for org in member_orgs {
            debug!("Adding {} to sharing group {}", org.name, name);
            api.add_org_to_sharing_group(&group.id, org).await?;
        }
        api.sharing_groups()
            .await?
            .into_iter()
            .find(|g| g.id == group.id)
            .ok_or(TopologyError::Inconsistent {
                kind: "sharing group",
                key: name.to_string(),
            })
    }

    /// Deletes the sharing group called `name`. Returns false if it did not
    /// exist.
    pub async fn delete_sharing_group(&self, name: &str) -> TopologyResult<bool> {
        let api = self.site_admin();
        let Some(group) = api.sharing_groups().await?.into_iter().find(|g| g.name == name) else {
            return Ok(false);
        };
        api.delete_sharing_group(&group.id).await?;
        info!("Deleted sharing group {} on {}", name, self.name());
        Ok(true)
    }

    fn remember(&mut self, counterpart: &str, record: SyncServer) {
        self.synchronisations.insert(counterpart.to_string(), record);
    }
}
