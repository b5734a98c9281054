//! Tests for provisioning, readiness and credential export against an
//! in-memory federation.

use fedsync_client::memory::BOOTSTRAP_ADMIN;
use fedsync_client::{Connector, MemoryFederation, OrgScope};
use fedsync_topology::{
    Credential, Federation, FederationConfig, InstanceConfig, PASSWORD_PLACEHOLDER, Provisioner,
    ReadinessPolicy, TopologyError, export_credentials, wait_until_ready,
};
use fedsync_types::Role;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;

const HUB_URL: &str = "https://hub.local";
const FIRST_URL: &str = "https://misp01.local";
const SECOND_URL: &str = "https://misp02.local";

fn instance_config(name: &str, short: &str, url: &str) -> InstanceConfig {
    InstanceConfig {
        admin_orgname: name.to_string(),
        baseurl: url.to_string(),
        external_baseurl: None,
        admin_key: format!("{short}-bootstrap"),
        email_site_admin: format!("{short}@site-admin.local"),
        email_orgadmin: format!("{short}@org-admin.local"),
        email_user: format!("{short}@user.local"),
    }
}

fn federation_config() -> FederationConfig {
    FederationConfig {
        secure_connection: false,
        hub: "Hub org".to_string(),
        output_dir: PathBuf::from("."),
        readiness: ReadinessPolicy {
            interval_ms: 100,
            max_attempts: 5,
        },
        instances: vec![
            instance_config("Hub org", "hub", HUB_URL),
            instance_config("First org", "first", FIRST_URL),
            instance_config("Second org", "second", SECOND_URL),
        ],
    }
}

async fn memory_federation(config: &FederationConfig) -> MemoryFederation {
    let fed = MemoryFederation::new();
    for instance in &config.instances {
        fed.add_instance(&instance.baseurl, &instance.admin_key).await;
    }
    fed
}

// ── Provisioning ────────────────────────────────────────────────

#[tokio::test]
async fn provision_creates_host_org_and_role_users() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let provisioner = Provisioner::new(Arc::new(fed.clone()));

    let hub = provisioner.provision(config.hub().unwrap()).await.unwrap();
    assert_eq!(hub.name(), "Hub org");
    assert_eq!(hub.host_org().name, "Hub org");
    assert!(hub.host_org().local);

    let users = hub.users();
    assert_eq!(users.site_admin.role, Role::SiteAdmin);
    assert_eq!(users.org_admin.role, Role::OrgAdmin);
    assert_eq!(users.member.role, Role::User);
    for user in [&users.site_admin, &users.org_admin, &users.member] {
        assert_eq!(user.org_id, hub.host_org().id);
    }

    let listed = hub.site_admin().organisations(OrgScope::Local).await.unwrap();
    assert!(listed.iter().any(|o| o.name == "Hub org"));
}

#[tokio::test]
async fn provision_works_with_own_key_not_bootstrap() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let hub = Provisioner::new(Arc::new(fed.clone()))
        .provision(config.hub().unwrap())
        .await
        .unwrap();

    assert_ne!(hub.users().site_admin.authkey, "hub-bootstrap");
    assert_ne!(hub.users().site_admin.email, BOOTSTRAP_ADMIN);
    // The site admin client answers with the provisioned key.
    let own = fed.connect(HUB_URL, &hub.users().site_admin.authkey).unwrap();
    let users = own.users().await.unwrap();
    assert!(users.iter().any(|u| u.email == "hub@site-admin.local"));
}

#[tokio::test]
async fn provision_sets_instance_settings() {
    let mut config = federation_config();
    config.instances[1].external_baseurl = Some(format!("{FIRST_URL}/"));
    let fed = memory_federation(&config).await;
    let first = Provisioner::new(Arc::new(fed.clone()))
        .provision(config.instance("First org").unwrap())
        .await
        .unwrap();

    // The exported descriptor carries the external URL and the host org.
    let descriptor = first.site_admin().get_sync_config().await.unwrap();
    assert_eq!(descriptor.url, FIRST_URL);
    assert_eq!(descriptor.organisation.name, "First org");
    assert_eq!(descriptor.organisation.uuid, Some(first.host_org().uuid));
}

#[tokio::test]
async fn provisioning_twice_changes_nothing() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let provisioner = Provisioner::new(Arc::new(fed.clone()));

    let once = provisioner.provision(config.hub().unwrap()).await.unwrap();
    let twice = provisioner.provision(config.hub().unwrap()).await.unwrap();

    assert_eq!(once.host_org(), twice.host_org());
    assert_eq!(once.users().site_admin.id, twice.users().site_admin.id);
    assert_eq!(once.users().org_admin.id, twice.users().org_admin.id);
    assert_eq!(once.users().member.id, twice.users().member.id);
    assert_eq!(twice.site_admin().users().await.unwrap().len(), 4);
}

#[tokio::test]
async fn provision_unreachable_instance_fails() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    fed.set_reachable(HUB_URL, false).await;

    let err = Provisioner::new(Arc::new(fed))
        .provision(config.hub().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, TopologyError::Client(_)));
}

#[tokio::test]
async fn federation_provisions_hub_first() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let federation = Federation::provision(&config, Arc::new(fed)).await.unwrap();

    assert_eq!(federation.hub().name(), "Hub org");
    let spokes: Vec<&str> = federation.spokes().map(|s| s.name()).collect();
    assert_eq!(spokes, vec!["First org", "Second org"]);
    assert!(matches!(
        federation.instance("Nobody"),
        Err(TopologyError::UnknownInstance(_))
    ));
}

// ── Readiness ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn readiness_waits_for_workers() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let hub = Provisioner::new(Arc::new(fed.clone()))
        .provision(config.hub().unwrap())
        .await
        .unwrap();

    fed.set_worker_delay(HUB_URL, 3).await;
    let polls = wait_until_ready(&hub, &config.readiness).await.unwrap();
    assert_eq!(polls, 4);
}

#[tokio::test(start_paused = true)]
async fn readiness_gives_up_after_max_attempts() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let hub = Provisioner::new(Arc::new(fed.clone()))
        .provision(config.hub().unwrap())
        .await
        .unwrap();

    fed.set_worker_delay(HUB_URL, 50).await;
    let err = wait_until_ready(&hub, &config.readiness).await.unwrap_err();
    match err {
        TopologyError::NotReady {
            instance, attempts, ..
        } => {
            assert_eq!(instance, "Hub org");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn federation_readiness_includes_hub() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let federation = Federation::provision(&config, Arc::new(fed.clone()))
        .await
        .unwrap();

    fed.set_worker_delay(HUB_URL, 50).await;
    let err = federation
        .wait_until_ready(&config.readiness)
        .await
        .unwrap_err();
    assert!(matches!(err, TopologyError::NotReady { ref instance, .. } if instance == "Hub org"));
}

// ── Credential export ───────────────────────────────────────────

#[tokio::test]
async fn export_writes_every_user_spokes_first() {
    let config = federation_config();
    let fed = memory_federation(&config).await;
    let federation = Federation::setup(&config, Arc::new(fed.clone()))
        .await
        .unwrap();
    fed.mark_logged_in(HUB_URL, "hub@site-admin.local").await;

    let dir = tempfile::tempdir().unwrap();
    let credentials = export_credentials(&federation, dir.path()).await.unwrap();

    // Hub: bootstrap admin, three role users, one sync user per spoke.
    // Spokes: bootstrap admin, three role users, one sync user for the other spoke.
    assert_eq!(credentials.len(), 6 + 5 + 5);
    assert_eq!(credentials[0].url, FIRST_URL);
    assert_eq!(credentials.last().unwrap().url, HUB_URL);

    let hub_admin = credentials
        .iter()
        .find(|c| c.login == "hub@site-admin.local")
        .unwrap();
    assert_eq!(hub_admin.password, PASSWORD_PLACEHOLDER);

    let member = credentials
        .iter()
        .find(|c| c.login == "first@user.local")
        .unwrap();
    assert_eq!(member.password.len(), 16);
    assert_eq!(
        fed.password_of(FIRST_URL, "first@user.local").await,
        Some(member.password.clone())
    );

    let json = std::fs::read_to_string(dir.path().join("auth.json")).unwrap();
    let from_json: Vec<Credential> = serde_json::from_str(&json).unwrap();
    assert_eq!(from_json, credentials);

    let mut reader = csv::Reader::from_path(dir.path().join("auth.csv")).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["url", "login", "authkey", "password"]
    );
    let from_csv: Vec<Credential> = reader.deserialize().map(Result::unwrap).collect();
    assert_eq!(from_csv, credentials);
}
