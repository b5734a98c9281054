//! Release and ingest of events between simulated instances.
//!
//! A push is decided by the sending instance: the event must be published
//! and pushable, pass the record's push rules, and only content the
//! receiving instance is allowed to hold crosses the hop. A pull is decided
//! by what the sync user behind the record's key may see on the remote side.
//! Every hop narrows community levels by one step.

use super::node::Node;
use crate::api::normalize_url;
use fedsync_types::{Distribution, Event, FilterRules, OrgRef, RemoteId, SharingGroup, User};
use std::collections::HashMap;

/// True if the event passes the record's filter rules, evaluated against the
/// tag and organisation ids of `node`.
pub(crate) fn passes_rules(node: &Node, rules: &FilterRules, event: &Event) -> bool {
    if rules.is_open() {
        return true;
    }
    let tag_ids = node.tag_ids(event.tags.iter().map(|t| t.name.as_str()));
    if !rules.tags.admits(tag_ids.iter()) {
        return false;
    }
    let orgc_ids: Vec<RemoteId> = event
        .orgc
        .as_ref()
        .and_then(|o| o.uuid)
        .and_then(|uuid| node.org_by_uuid(&uuid))
        .map(|o| o.id.clone())
        .into_iter()
        .collect();
    rules.orgs.admits(orgc_ids.iter())
}

fn narrow(event: &mut Event) {
    event.distribution = event.distribution.after_hop();
    for attribute in &mut event.attributes {
        attribute.distribution = attribute.distribution.after_hop();
    }
    for object in &mut event.objects {
        object.distribution = object.distribution.after_hop();
        for attribute in &mut object.attributes {
            attribute.distribution = attribute.distribution.after_hop();
        }
    }
}

/// Copy of `event` that `source` sends to the instance at `dest_url`.
pub(crate) fn release_for_push(
    source: &Node,
    event: &Event,
    rules: &FilterRules,
    dest_url: &str,
) -> Option<Event> {
    if !event.published || !event.distribution.is_pushable() {
        return None;
    }
    let keep = |distribution: Distribution, group: Option<&RemoteId>| match distribution {
        Distribution::SharingGroup => source.group_releases_to(group, dest_url),
        other => other.is_pushable(),
    };
    if !keep(event.distribution, event.sharing_group_id.as_ref()) {
        return None;
    }
    if !passes_rules(source, rules, event) {
        return None;
    }

    let mut released = event.clone();
    let event_level = event.distribution;
    released
        .attributes
        .retain(|a| keep(a.distribution.resolve(event_level), a.sharing_group_id.as_ref()));
    released
        .objects
        .retain(|o| keep(o.distribution.resolve(event_level), o.sharing_group_id.as_ref()));
    for object in &mut released.objects {
        let object_level = object.distribution.resolve(event_level);
        object
            .attributes
            .retain(|a| keep(a.distribution.resolve(object_level), a.sharing_group_id.as_ref()));
    }
    narrow(&mut released);
    Some(released)
}

/// Copy of `event` handed to a remote instance pulling with `sync_user`'s key.
///
/// Objects only leave when they reach connected communities or wider.
pub(crate) fn release_for_pull(source: &Node, event: &Event, sync_user: &User) -> Option<Event> {
    if !event.published {
        return None;
    }
    let mut released = source.view_event(event, sync_user)?;
    let event_level = event.distribution;
    released.objects.retain(|o| {
        let level = o.distribution.resolve(event_level);
        level == Distribution::SharingGroup || level.is_pushable()
    });
    narrow(&mut released);
    Some(released)
}

/// Stores a received event on `dest`, owned by `owner`.
///
/// The creating organisation and any referenced sharing groups are created
/// locally when unknown; sharing group ids are rewritten to local ones. An
/// event with the same uuid is replaced in place.
pub(crate) fn ingest(
    dest: &mut Node,
    mut event: Event,
    owner: OrgRef,
    source_groups: &[SharingGroup],
) {
    if let Some(orgc) = event.orgc.take() {
        event.orgc = Some(dest.ensure_remote_org(&orgc).to_ref());
    }

    let mut remapped: HashMap<RemoteId, RemoteId> = HashMap::new();
    let mut remap = |dest: &mut Node, id: &mut Option<RemoteId>| {
        let Some(source_id) = id.take() else {
            return;
        };
        if let Some(local) = remapped.get(&source_id) {
            *id = Some(local.clone());
            return;
        }
        if let Some(group) = source_groups.iter().find(|g| g.id == source_id) {
            let local = ensure_sharing_group(dest, group);
            remapped.insert(source_id, local.clone());
            *id = Some(local);
        }
    };
    remap(&mut *dest, &mut event.sharing_group_id);
    for attribute in &mut event.attributes {
        remap(&mut *dest, &mut attribute.sharing_group_id);
    }
    for object in &mut event.objects {
        remap(&mut *dest, &mut object.sharing_group_id);
        for attribute in &mut object.attributes {
            remap(&mut *dest, &mut attribute.sharing_group_id);
        }
    }

    event.org = Some(owner);
    event.published = true;
    match dest.event_index(&event.uuid) {
        Some(index) => {
            event.id = dest.events[index].id.clone();
            dest.events[index] = event;
        }
        None => {
            event.id = Some(dest.next_id());
            dest.events.push(event);
        }
    }
}

fn ensure_sharing_group(dest: &mut Node, group: &SharingGroup) -> RemoteId {
    if let Some(existing) = dest.sharing_groups.iter().find(|g| g.uuid == group.uuid) {
        return existing.id.clone();
    }
    let organisations = group
        .organisations
        .iter()
        .map(|org| dest.ensure_remote_org(org).to_ref())
        .collect();
    let copy = SharingGroup {
        id: dest.next_id(),
        uuid: group.uuid,
        name: group.name.clone(),
        releasability: group.releasability.clone(),
        organisations,
        servers: group
            .servers
            .iter()
            .filter(|m| !m.is_local() && m.url.is_some())
            .cloned()
            .collect(),
    };
    let id = copy.id.clone();
    dest.sharing_groups.push(copy);
    id
}

/// True if `a` and `b` address the same instance.
pub(crate) fn same_instance(a: &str, b: &str) -> bool {
    normalize_url(a) == normalize_url(b)
}
