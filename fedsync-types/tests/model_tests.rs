use fedsync_types::settings::ServerSettings;
use fedsync_types::{
    ConnectionTest, Distribution, Event, EventObject, FilterRules, Organisation, RemoteId, Role,
    ServerUpdate, SharingGroupServer, SyncDescriptor, SyncServer, User, counterpart_name,
    sync_user_email,
};
use pretty_assertions::assert_eq;
use serde_json::json;

// ── RemoteId ────────────────────────────────────────────────────

#[test]
fn remote_id_accepts_number_and_string() {
    let a: RemoteId = serde_json::from_value(json!(12)).unwrap();
    let b: RemoteId = serde_json::from_value(json!("12")).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_u64(), Some(12));
    assert_eq!(serde_json::to_value(&a).unwrap(), json!("12"));
}

#[test]
fn remote_id_display() {
    assert_eq!(RemoteId::from(7).to_string(), "7");
    assert_eq!(RemoteId::new("abc").as_u64(), None);
}

// ── Distribution ────────────────────────────────────────────────

#[test]
fn distribution_levels_roundtrip_through_wire_values() {
    for level in 0..=5u8 {
        let d = Distribution::from_level(level).unwrap();
        assert_eq!(d.level(), level);
    }
    assert!(Distribution::from_level(6).is_err());
}

#[test]
fn distribution_parses_string_levels() {
    let d: Distribution = serde_json::from_value(json!("2")).unwrap();
    assert_eq!(d, Distribution::ConnectedCommunities);
    let d: Distribution = serde_json::from_value(json!(0)).unwrap();
    assert_eq!(d, Distribution::YourOrganisationOnly);
}

#[test]
fn distribution_after_hop_narrows_community_levels() {
    assert_eq!(
        Distribution::ConnectedCommunities.after_hop(),
        Distribution::ThisCommunityOnly
    );
    assert_eq!(
        Distribution::ThisCommunityOnly.after_hop(),
        Distribution::YourOrganisationOnly
    );
    assert_eq!(
        Distribution::AllCommunities.after_hop(),
        Distribution::AllCommunities
    );
    assert_eq!(Distribution::SharingGroup.after_hop(), Distribution::SharingGroup);
}

#[test]
fn distribution_inherit_resolves_to_parent() {
    assert_eq!(
        Distribution::Inherit.resolve(Distribution::ConnectedCommunities),
        Distribution::ConnectedCommunities
    );
    assert_eq!(
        Distribution::YourOrganisationOnly.resolve(Distribution::AllCommunities),
        Distribution::YourOrganisationOnly
    );
}

#[test]
fn only_wide_levels_are_pushable() {
    assert!(!Distribution::YourOrganisationOnly.is_pushable());
    assert!(!Distribution::ThisCommunityOnly.is_pushable());
    assert!(Distribution::ConnectedCommunities.is_pushable());
    assert!(Distribution::AllCommunities.is_pushable());
    assert!(Distribution::SharingGroup.is_pushable());
}

// ── Organisations & users ───────────────────────────────────────

#[test]
fn organisation_parses_rest_shape() {
    let org: Organisation = serde_json::from_value(json!({
        "id": "3",
        "uuid": "5d1b4b3e-0000-4000-8000-000000000001",
        "name": "Second org",
        "local": "0",
        "date_created": "2024-01-01 00:00:00"
    }))
    .unwrap();
    assert_eq!(org.id, RemoteId::from(3));
    assert!(!org.local);
    assert_eq!(org.to_ref().name, "Second org");
}

#[test]
fn user_parses_role_and_change_pw_flag() {
    let user: User = serde_json::from_value(json!({
        "id": "5",
        "email": "sync_user@first-org.local",
        "org_id": "4",
        "role_id": "5",
        "authkey": "k",
        "change_pw": "1"
    }))
    .unwrap();
    assert_eq!(user.role, Role::SyncUser);
    assert!(user.change_pw);
}

#[test]
fn role_ids_match_stock_instance() {
    assert_eq!(Role::SiteAdmin.id(), 1);
    assert_eq!(Role::OrgAdmin.id(), 2);
    assert_eq!(Role::User.id(), 3);
    assert_eq!(Role::SyncUser.id(), 5);
    assert!(Role::from_id(42).is_err());
}

#[test]
fn sync_user_email_is_derived_from_org_name() {
    assert_eq!(sync_user_email("Second org"), "sync_user@second-org.local");
    assert_eq!(sync_user_email("ACME"), "sync_user@acme.local");
}

// ── Server records & rules ──────────────────────────────────────

#[test]
fn filter_rules_encode_as_json_string_on_records() {
    let update = ServerUpdate::push_rules(FilterRules::tags_only(RemoteId::from(9)));
    let value = serde_json::to_value(&update).unwrap();
    let encoded = value["push_rules"].as_str().unwrap();
    let decoded: serde_json::Value = serde_json::from_str(encoded).unwrap();
    assert_eq!(
        decoded,
        json!({"tags": {"OR": ["9"], "NOT": []}, "orgs": {"OR": [], "NOT": []}})
    );
    assert!(value.get("push").is_none());
}

#[test]
fn server_record_tolerates_empty_rules() {
    let server: SyncServer = serde_json::from_value(json!({
        "id": "1",
        "name": "Sync with First org",
        "url": "https://first.local",
        "authkey": "abc",
        "remote_org_id": "2",
        "pull": true,
        "push": "0",
        "push_rules": "",
        "pull_rules": "[]"
    }))
    .unwrap();
    assert!(server.pull);
    assert!(!server.push);
    assert!(server.push_rules.is_open());
    assert_eq!(server.counterpart(), "First org");
}

#[test]
fn rule_set_admits_by_or_and_not() {
    let rules = FilterRules::tags_only(RemoteId::from(1));
    let tagged = [RemoteId::from(1), RemoteId::from(2)];
    let untagged = [RemoteId::from(2)];
    assert!(rules.tags.admits(tagged.iter()));
    assert!(!rules.tags.admits(untagged.iter()));

    let mut deny = FilterRules::default();
    deny.tags.not.push(RemoteId::from(2));
    assert!(!deny.tags.admits(tagged.iter()));
    assert!(deny.tags.admits(std::iter::empty::<&RemoteId>()));
}

#[test]
fn server_update_applies_only_set_fields() {
    let mut server = SyncServer {
        id: RemoteId::from(1),
        name: "Sync with Hub".into(),
        url: "https://hub".into(),
        authkey: "k".into(),
        uuid: None,
        remote_org_id: RemoteId::from(2),
        pull: false,
        push: true,
        push_rules: FilterRules::tags_only(RemoteId::from(3)),
        pull_rules: FilterRules::default(),
    };
    ServerUpdate::pull_only().apply_to(&mut server);
    assert!(server.pull);
    assert!(!server.push);
    assert!(!server.push_rules.is_open());
}

#[test]
fn counterpart_name_strips_prefix_only_when_present() {
    assert_eq!(counterpart_name("Sync with Third org"), "Third org");
    assert_eq!(counterpart_name("Manual server"), "Manual server");
}

#[test]
fn descriptor_is_renamed_after_exporting_org() {
    let descriptor: SyncDescriptor = serde_json::from_value(json!({
        "name": "misp02",
        "url": "https://second.local",
        "authkey": "key",
        "Organisation": {"name": "Second org", "uuid": "5d1b4b3e-0000-4000-8000-000000000002"}
    }))
    .unwrap();
    assert_eq!(descriptor.named_after_org().name, "Sync with Second org");
}

#[test]
fn connection_test_status() {
    assert!(ConnectionTest::ok().is_ok());
    let failed: ConnectionTest = serde_json::from_value(json!({"status": 3})).unwrap();
    assert!(!failed.is_ok());
}

#[test]
fn local_sharing_group_server() {
    let local = SharingGroupServer {
        server_id: RemoteId::from(0),
        url: None,
    };
    assert!(local.is_local());
}

// ── Events ──────────────────────────────────────────────────────

#[test]
fn event_builder_defaults_attributes_to_inherit() {
    let mut event = Event::new("test", Distribution::AllCommunities);
    event.add_attribute("ip-src", "1.1.1.1");
    event
        .add_attribute("ip-dst", "8.8.8.9")
        .set_distribution(Distribution::ThisCommunityOnly)
        .add_tag("tlp:amber");
    let mut object = EventObject::new("file");
    object.add_attribute("filename", "testfile");
    event.add_object(object);

    assert_eq!(event.attributes[0].distribution, Distribution::Inherit);
    assert_eq!(event.attributes[1].tags[0].name, "tlp:amber");
    assert_eq!(event.object_attribute_count(), 1);
}

#[test]
fn event_parses_rest_shape_with_zero_sharing_group() {
    let event: Event = serde_json::from_value(json!({
        "id": "10",
        "uuid": "5d1b4b3e-0000-4000-8000-00000000000a",
        "info": "Complex Event",
        "distribution": "3",
        "sharing_group_id": "0",
        "published": true,
        "Orgc": {"name": "First org"},
        "Tag": [{"name": "tlp:white"}],
        "Attribute": [
            {"uuid": "5d1b4b3e-0000-4000-8000-00000000000b", "type": "md5", "value": "x", "distribution": "5", "sharing_group_id": "0"}
        ],
        "Object": []
    }))
    .unwrap();
    assert_eq!(event.id, Some(RemoteId::from(10)));
    assert_eq!(event.sharing_group_id, None);
    assert!(event.has_tag("tlp:white"));
    assert_eq!(event.attributes[0].distribution, Distribution::Inherit);
    assert_eq!(event.attributes[0].sharing_group_id, None);
}

// ── Settings ────────────────────────────────────────────────────

#[test]
fn settings_ready_requires_default_and_prio() {
    let settings: ServerSettings = serde_json::from_value(json!({
        "workers": {"default": {"ok": true}, "prio": {"ok": false}, "email": {"ok": false}}
    }))
    .unwrap();
    assert!(!settings.is_ready());
    assert_eq!(settings.unhealthy_queues(), vec!["prio"]);
    assert!(ServerSettings::healthy().is_ready());
    assert!(!ServerSettings::default().is_ready());
}
