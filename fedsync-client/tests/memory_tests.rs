use fedsync_client::memory::BOOTSTRAP_ADMIN;
use fedsync_client::{ClientError, InstanceApi, MemoryClient, MemoryFederation, OrgScope};
use fedsync_types::settings::{SETTING_BASEURL, SETTING_HOST_ORG_ID};
use fedsync_types::{
    Distribution, Event, NewOrganisation, NewSharingGroup, NewUser, RemoteId, Role, ServerUpdate,
    SyncServer, sync_user_email,
};
use pretty_assertions::assert_eq;

const HUB: &str = "https://hub.local";
const SPOKE: &str = "https://spoke.local";

async fn federation() -> MemoryFederation {
    let fed = MemoryFederation::new();
    fed.add_instance(HUB, "hub-bootstrap").await;
    fed.add_instance(SPOKE, "spoke-bootstrap").await;
    fed
}

async fn host_org(client: &MemoryClient, name: &str) -> fedsync_types::Organisation {
    let org = client
        .add_organisation(&NewOrganisation::local(name))
        .await
        .unwrap();
    client
        .set_server_setting(SETTING_HOST_ORG_ID, org.id.as_str(), false)
        .await
        .unwrap();
    org
}

/// The spoke holds a pull-only record of the hub, authenticated as a sync
/// user the hub hosts for the spoke's organisation.
async fn linked(fed: &MemoryFederation) -> (MemoryClient, MemoryClient, SyncServer) {
    let hub = fed.client(HUB, "hub-bootstrap");
    let spoke = fed.client(SPOKE, "spoke-bootstrap");
    host_org(&hub, "Hub org").await;
    let spoke_org = host_org(&spoke, "Spoke org").await;

    let rep = hub
        .add_organisation(&NewOrganisation::remote(&spoke_org))
        .await
        .unwrap();
    let sync_user = hub
        .add_user(&NewUser::new(
            sync_user_email(&spoke_org.name),
            rep.id.clone(),
            Role::SyncUser,
        ))
        .await
        .unwrap();
    let descriptor = fed
        .client(HUB, &sync_user.authkey)
        .get_sync_config()
        .await
        .unwrap()
        .named_after_org();
    let record = spoke.import_server(&descriptor).await.unwrap();
    let record = spoke
        .update_server(&record.id, &ServerUpdate::pull_only())
        .await
        .unwrap();
    (hub, spoke, record)
}

fn sample_event(distribution: Distribution) -> Event {
    let mut event = Event::new("memory federation test", distribution);
    event.add_attribute("ip-src", "8.8.8.8");
    event
        .add_attribute("ip-dst", "9.9.9.9")
        .set_distribution(Distribution::YourOrganisationOnly);
    event
}

// ── Entities ────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_instance_has_bootstrap_admin() {
    let fed = federation().await;
    let users = fed.client(HUB, "hub-bootstrap").users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, BOOTSTRAP_ADMIN);
    assert_eq!(users[0].role, Role::SiteAdmin);
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let fed = federation().await;
    let hub = fed.client(HUB, "hub-bootstrap");
    let org = hub
        .add_organisation(&NewOrganisation::local("Hub org"))
        .await
        .unwrap();

    let err = hub
        .add_organisation(&NewOrganisation::local("Hub org"))
        .await
        .unwrap_err();
    assert!(err.is_rejection());

    hub.add_user(&NewUser::new("a@hub.test", org.id.clone(), Role::User))
        .await
        .unwrap();
    let err = hub
        .add_user(&NewUser::new("a@hub.test", org.id, Role::User))
        .await
        .unwrap_err();
    assert!(err.is_rejection());
}

#[tokio::test]
async fn organisation_scopes_split_local_and_external() {
    let fed = federation().await;
    let (hub, _, _) = linked(&fed).await;
    let local: Vec<String> = hub
        .organisations(OrgScope::Local)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.name)
        .collect();
    let external: Vec<String> = hub
        .organisations(OrgScope::External)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.name)
        .collect();
    assert_eq!(local, vec!["ORGNAME", "Hub org"]);
    assert_eq!(external, vec!["Spoke org"]);
}

#[tokio::test]
async fn unknown_key_is_not_authenticated() {
    let fed = federation().await;
    let err = fed.client(HUB, "nope").tags().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthFailed(_)));
}

#[tokio::test]
async fn members_cannot_administer() {
    let fed = federation().await;
    let hub = fed.client(HUB, "hub-bootstrap");
    let org = host_org(&hub, "Hub org").await;
    let member = hub
        .add_user(&NewUser::new("user@hub.test", org.id, Role::User))
        .await
        .unwrap();
    let err = fed
        .client(HUB, &member.authkey)
        .servers()
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));
}

#[tokio::test]
async fn password_change_and_first_login() {
    let fed = federation().await;
    let hub = fed.client(HUB, "hub-bootstrap");
    let users = hub.users().await.unwrap();
    let admin = &users[0];
    assert!(admin.change_pw);

    hub.change_user_password(&admin.id, "ABCDEFGH12345678")
        .await
        .unwrap();
    assert_eq!(
        fed.password_of(HUB, BOOTSTRAP_ADMIN).await.as_deref(),
        Some("ABCDEFGH12345678")
    );
    assert!(hub.users().await.unwrap()[0].change_pw);

    fed.mark_logged_in(HUB, BOOTSTRAP_ADMIN).await;
    assert!(!hub.users().await.unwrap()[0].change_pw);
}

// ── Settings ────────────────────────────────────────────────────

#[tokio::test]
async fn locked_settings_need_force() {
    let fed = federation().await;
    let hub = fed.client(HUB, "hub-bootstrap");
    let err = hub
        .set_server_setting(SETTING_BASEURL, HUB, false)
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    hub.set_server_setting(SETTING_BASEURL, HUB, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn workers_become_ready_after_delay() {
    let fed = federation().await;
    fed.set_worker_delay(HUB, 2).await;
    let hub = fed.client(HUB, "hub-bootstrap");
    assert!(!hub.server_settings().await.unwrap().is_ready());
    assert!(!hub.server_settings().await.unwrap().is_ready());
    assert!(hub.server_settings().await.unwrap().is_ready());
}

// ── Server records ──────────────────────────────────────────────

#[tokio::test]
async fn descriptor_describes_host_org_and_key() {
    let fed = federation().await;
    let (_, spoke, record) = linked(&fed).await;
    assert_eq!(record.name, "Sync with Hub org");
    assert_eq!(record.url, HUB);
    assert!(record.pull);
    assert!(!record.push);
    assert_eq!(spoke.servers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn connection_test_follows_reachability() {
    let fed = federation().await;
    let (_, spoke, record) = linked(&fed).await;
    assert!(spoke.test_server(&record.id).await.unwrap().is_ok());

    fed.set_reachable(HUB, false).await;
    let result = spoke.test_server(&record.id).await.unwrap();
    assert!(!result.is_ok());
}

#[tokio::test]
async fn deleting_absent_entities_is_not_found() {
    let fed = federation().await;
    let hub = fed.client(HUB, "hub-bootstrap");
    assert!(hub.delete_server(&RemoteId::from(999)).await.unwrap_err().is_not_found());
    assert!(hub.delete_tag(&RemoteId::from(999)).await.unwrap_err().is_not_found());
    let missing = Event::new("missing", Distribution::AllCommunities).uuid;
    assert!(hub.delete_event(&missing).await.unwrap_err().is_not_found());
}

// ── Sharing groups ──────────────────────────────────────────────

#[tokio::test]
async fn sharing_groups_are_listed_to_members_only() {
    let fed = federation().await;
    let hub = fed.client(HUB, "hub-bootstrap");
    let org = host_org(&hub, "Hub org").await;
    let outsider_org = hub
        .add_organisation(&NewOrganisation::local("Outsider org"))
        .await
        .unwrap();
    let member = hub
        .add_user(&NewUser::new("member@hub.test", org.id.clone(), Role::OrgAdmin))
        .await
        .unwrap();
    let outsider = hub
        .add_user(&NewUser::new("out@hub.test", outsider_org.id, Role::User))
        .await
        .unwrap();

    let group = fed
        .client(HUB, &member.authkey)
        .add_sharing_group(&NewSharingGroup {
            name: "Testcases SG".into(),
            releasability: "Testing".into(),
        })
        .await
        .unwrap();
    assert_eq!(group.organisations[0].name, "Hub org");

    assert_eq!(
        fed.client(HUB, &member.authkey)
            .sharing_groups()
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(fed
        .client(HUB, &outsider.authkey)
        .sharing_groups()
        .await
        .unwrap()
        .is_empty());
    assert_eq!(hub.sharing_groups().await.unwrap().len(), 1);
}

// ── Propagation ─────────────────────────────────────────────────

#[tokio::test]
async fn pull_brings_published_events_one_level_narrower() {
    let fed = federation().await;
    let (hub, spoke, record) = linked(&fed).await;

    let published = hub
        .add_event(&sample_event(Distribution::ConnectedCommunities))
        .await
        .unwrap();
    hub.publish(published.id.as_ref().unwrap()).await.unwrap();
    let draft = hub
        .add_event(&sample_event(Distribution::AllCommunities))
        .await
        .unwrap();

    spoke.server_pull(&record.id).await.unwrap();

    let pulled = spoke.get_event(&published.uuid).await.unwrap().unwrap();
    assert_eq!(pulled.distribution, Distribution::ThisCommunityOnly);
    assert_eq!(pulled.attributes.len(), 1);
    assert_eq!(pulled.attributes[0].value, "8.8.8.8");
    assert_eq!(pulled.org.unwrap().name, "Spoke org");
    assert!(spoke.get_event(&draft.uuid).await.unwrap().is_none());
}

#[tokio::test]
async fn publish_pushes_only_when_push_is_enabled() {
    let fed = federation().await;
    let (hub, spoke, record) = linked(&fed).await;

    let quiet = spoke
        .add_event(&sample_event(Distribution::AllCommunities))
        .await
        .unwrap();
    spoke.publish(quiet.id.as_ref().unwrap()).await.unwrap();
    assert_eq!(fed.stored_events(HUB).await, 0);

    spoke
        .update_server(&record.id, &ServerUpdate::push(true))
        .await
        .unwrap();
    let loud = spoke
        .add_event(&sample_event(Distribution::AllCommunities))
        .await
        .unwrap();
    spoke.publish(loud.id.as_ref().unwrap()).await.unwrap();

    let received = hub.get_event(&loud.uuid).await.unwrap().unwrap();
    assert!(received.published);
    assert_eq!(received.attributes.len(), 1);
    // The pushing sync user's organisation owns the copy.
    assert_eq!(received.org.unwrap().name, "Spoke org");
    assert!(hub.get_event(&quiet.uuid).await.unwrap().is_none());
}

#[tokio::test]
async fn own_org_events_are_never_pushed() {
    let fed = federation().await;
    let (_, spoke, record) = linked(&fed).await;
    let event = spoke
        .add_event(&sample_event(Distribution::YourOrganisationOnly))
        .await
        .unwrap();
    spoke.publish(event.id.as_ref().unwrap()).await.unwrap();
    spoke
        .server_push(&record.id, event.id.as_ref())
        .await
        .unwrap();
    assert_eq!(fed.stored_events(HUB).await, 0);
}

#[tokio::test]
async fn explicit_push_to_unreachable_instance_fails() {
    let fed = federation().await;
    let (_, spoke, record) = linked(&fed).await;
    let event = spoke
        .add_event(&sample_event(Distribution::AllCommunities))
        .await
        .unwrap();
    spoke.publish(event.id.as_ref().unwrap()).await.unwrap();

    fed.set_reachable(HUB, false).await;
    let err = spoke.server_push(&record.id, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn repeated_pull_replaces_instead_of_duplicating() {
    let fed = federation().await;
    let (hub, spoke, record) = linked(&fed).await;
    let event = hub
        .add_event(&sample_event(Distribution::AllCommunities))
        .await
        .unwrap();
    hub.publish(event.id.as_ref().unwrap()).await.unwrap();

    spoke.server_pull(&record.id).await.unwrap();
    spoke.server_pull(&record.id).await.unwrap();
    assert_eq!(fed.stored_events(SPOKE).await, 1);
}
