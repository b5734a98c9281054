//! Instance provisioning.
//!
//! Turns a freshly started instance into a known state: host organisation,
//! three role users with their own keys, and the settings other instances
//! rely on to reach it. Every step is find-or-create, so provisioning an
//! already provisioned instance changes nothing.

use crate::config::InstanceConfig;
use crate::error::TopologyResult;
use crate::instance::{Instance, InstanceUsers};
use crate::upsert::find_or_create;
use fedsync_client::{Connector, InstanceApi, OrgScope};
use fedsync_types::settings::{SETTING_BASEURL, SETTING_EXTERNAL_BASEURL, SETTING_HOST_ORG_ID};
use fedsync_types::{NewOrganisation, NewUser, Organisation, RemoteId, Role, User};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Finds the user with `email` or creates it in `org_id` with `role`.
pub(crate) async fn find_or_create_user(
    api: &dyn InstanceApi,
    email: &str,
    org_id: &RemoteId,
    role: Role,
) -> TopologyResult<User> {
    let new_user = NewUser::new(email, org_id.clone(), role);
    let user = find_or_create(
        "user",
        email,
        || api.users(),
        || api.add_user(&new_user),
        |u: &User| u.email == email,
    )
    .await?;
    Ok(user.into_inner())
}

/// Provisions instances through a [`Connector`].
pub struct Provisioner {
    connector: Arc<dyn Connector>,
}

impl Provisioner {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Brings one instance into the configured state.
    ///
    /// The bootstrap key is only used to set the default role and create the
    /// host organisation and site admin; everything else runs with the site
    /// admin's own key.
    pub async fn provision(&self, config: &InstanceConfig) -> TopologyResult<Instance> {
        info!("Initialize {}", config.name());
        let bootstrap = self.connector.connect(&config.baseurl, &config.admin_key)?;
        bootstrap.set_default_role(Role::User).await?;

        let org_name = config.name();
        let new_org = NewOrganisation::local(org_name);
        let host_org = find_or_create(
            "organisation",
            org_name,
            || bootstrap.organisations(OrgScope::All),
            || bootstrap.add_organisation(&new_org),
            |o: &Organisation| o.name == org_name,
        )
        .await?
        .into_inner();

        let site_admin_user = find_or_create_user(
            bootstrap.as_ref(),
            &config.email_site_admin,
            &host_org.id,
            Role::SiteAdmin,
        )
        .await?;
        let site_admin = self
            .connector
            .connect(&config.baseurl, &site_admin_user.authkey)?;

        site_admin
            .set_server_setting(SETTING_EXTERNAL_BASEURL, config.external_baseurl(), true)
            .await?;
        site_admin
            .set_server_setting(SETTING_BASEURL, &config.baseurl, true)
            .await?;
        site_admin
            .set_server_setting(SETTING_HOST_ORG_ID, host_org.id.as_str(), false)
            .await?;

        let org_admin_user = find_or_create_user(
            site_admin.as_ref(),
            &config.email_orgadmin,
            &host_org.id,
            Role::OrgAdmin,
        )
        .await?;
        let member_user = find_or_create_user(
            site_admin.as_ref(),
            &config.email_user,
            &host_org.id,
            Role::User,
        )
        .await?;
        let org_admin = self
            .connector
            .connect(&config.baseurl, &org_admin_user.authkey)?;
        let user = self.connector.connect(&config.baseurl, &member_user.authkey)?;

        Ok(Instance {
            config: config.clone(),
            host_org,
            users: InstanceUsers {
                site_admin: site_admin_user,
                org_admin: org_admin_user,
                member: member_user,
            },
            site_admin,
            org_admin,
            user,
            connector: Arc::clone(&self.connector),
            synchronisations: BTreeMap::new(),
        })
    }
}
