//! The propagation scenarios.
//!
//! Spokes are taken in configuration order: `source`, `middle`, `last`.
//! Every spoke holds an edge to every other spoke, so `source -> middle` and
//! `middle -> last` exist once the default topology is built.

use crate::error::{VerifyError, VerifyResult};
use crate::fixtures::{complex_event, simple_event};
use crate::scenario::{ScenarioContext, ScenarioState, Viewer, check, check_eq};
use fedsync_types::{Distribution, Event, RemoteId};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Name of the sharing group created by [`ScenarioKind::SharingGroup`].
pub const SHARING_GROUP_NAME: &str = "Testcases SG";
/// Tag that lets events through a restricted edge.
pub const PUSH_TAG: &str = "fedsync:push";

/// Every available scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    SimpleSync,
    SyncCommunity,
    SyncAllCommunities,
    ComplexEventPushPull,
    ComplexEventPull,
    SharingGroup,
    TagFilteredPush,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 7] = [
        ScenarioKind::SimpleSync,
        ScenarioKind::SyncCommunity,
        ScenarioKind::SyncAllCommunities,
        ScenarioKind::ComplexEventPushPull,
        ScenarioKind::ComplexEventPull,
        ScenarioKind::SharingGroup,
        ScenarioKind::TagFilteredPush,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::SimpleSync => "simple_sync",
            ScenarioKind::SyncCommunity => "sync_community",
            ScenarioKind::SyncAllCommunities => "sync_all_communities",
            ScenarioKind::ComplexEventPushPull => "complex_event_push_pull",
            ScenarioKind::ComplexEventPull => "complex_event_pull",
            ScenarioKind::SharingGroup => "sharing_group",
            ScenarioKind::TagFilteredPush => "tag_filtered_push",
        }
    }

    /// Number of spokes the scenario drives.
    pub fn spokes_needed(self) -> usize {
        match self {
            ScenarioKind::SimpleSync | ScenarioKind::SyncCommunity | ScenarioKind::TagFilteredPush => 2,
            _ => 3,
        }
    }

    pub(crate) async fn drive(self, ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
        match self {
            ScenarioKind::SimpleSync => simple_sync(ctx).await,
            ScenarioKind::SyncCommunity => sync_community(ctx).await,
            ScenarioKind::SyncAllCommunities => sync_all_communities(ctx).await,
            ScenarioKind::ComplexEventPushPull => complex_event_push_pull(ctx).await,
            ScenarioKind::ComplexEventPull => complex_event_pull(ctx).await,
            ScenarioKind::SharingGroup => sharing_group(ctx).await,
            ScenarioKind::TagFilteredPush => tag_filtered_push(ctx).await,
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| VerifyError::UnknownScenario(s.to_string()))
    }
}

// ── Shared steps ────────────────────────────────────────────────

/// Creates `event` on `instance` as `creator`; the org admin publishes it.
async fn create_and_publish(
    ctx: &mut ScenarioContext<'_>,
    instance: &str,
    creator: Viewer,
    event: &Event,
    reach: &[String],
) -> VerifyResult<Event> {
    let created = ctx.client(instance, creator)?.add_event(event).await?;
    ctx.track_event(created.uuid, reach);
    ctx.advance(ScenarioState::EventCreated);

    let id = event_id(&created)?;
    ctx.client(instance, Viewer::OrgAdmin)?.publish(&id).await?;
    ctx.advance(ScenarioState::Published);
    Ok(created)
}

fn event_id(event: &Event) -> VerifyResult<RemoteId> {
    event
        .id
        .clone()
        .ok_or_else(|| VerifyError::Assertion(format!("event {} has no id", event.uuid)))
}

fn edge_id(ctx: &ScenarioContext<'_>, holder: &str, counterpart: &str) -> VerifyResult<RemoteId> {
    Ok(ctx.instance(holder)?.edge(counterpart)?.id.clone())
}

fn first_value(event: &Event) -> Option<&str> {
    event.attributes.first().map(|a| a.value.as_str())
}

fn first_object_attributes(event: &Event) -> Option<usize> {
    event.objects.first().map(|o| o.attributes.len())
}

// ── Scenarios ───────────────────────────────────────────────────

/// Explicit push of one all-communities event to one spoke.
async fn simple_sync(ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
    let spokes = ctx.spokes(2)?;
    let (source, dest) = (&spokes[0], &spokes[1]);

    let event = simple_event(
        "Event created on first instance - simple_sync",
        Distribution::AllCommunities,
    );
    let created = create_and_publish(ctx, source, Viewer::OrgAdmin, &event, &spokes).await?;

    let server = edge_id(ctx, source, dest)?;
    let id = event_id(&created)?;
    ctx.client(source, Viewer::SiteAdmin)?
        .server_push(&server, Some(&id))
        .await?;
    ctx.advance(ScenarioState::PropagationTriggered);

    let seen = ctx.await_event(dest, Viewer::OrgAdmin, &created.uuid).await?;
    ctx.advance(ScenarioState::Settled);

    check_eq("attribute value on destination", first_value(&created), first_value(&seen))?;
    ctx.advance(ScenarioState::Asserted);
    Ok(())
}

/// A this-community-only event pulled by a community member arrives as
/// own-organisation-only.
async fn sync_community(ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
    let spokes = ctx.spokes(2)?;
    let (source, dest) = (&spokes[0], &spokes[1]);

    let event = simple_event(
        "Event created on first instance - sync_community",
        Distribution::ThisCommunityOnly,
    );
    let created = create_and_publish(ctx, source, Viewer::OrgAdmin, &event, &spokes).await?;

    let server = edge_id(ctx, dest, source)?;
    ctx.client(dest, Viewer::SiteAdmin)?.server_pull(&server).await?;
    ctx.advance(ScenarioState::PropagationTriggered);

    let seen = ctx.await_event(dest, Viewer::OrgAdmin, &created.uuid).await?;
    ctx.advance(ScenarioState::Settled);

    check_eq(
        "distribution on destination",
        Distribution::YourOrganisationOnly,
        seen.distribution,
    )?;
    ctx.advance(ScenarioState::Asserted);
    Ok(())
}

/// Automatic push along two hops, then an explicit push of everything.
async fn sync_all_communities(ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
    let spokes = ctx.spokes(3)?;
    let (source, middle, last) = (&spokes[0], &spokes[1], &spokes[2]);

    ctx.enable_push(source, middle).await?;
    ctx.enable_push(middle, last).await?;

    let event = simple_event(
        "Event created on first instance - sync_all_communities",
        Distribution::AllCommunities,
    );
    let created = create_and_publish(ctx, source, Viewer::User, &event, &spokes).await?;

    let server = edge_id(ctx, source, middle)?;
    ctx.client(source, Viewer::SiteAdmin)?
        .server_push(&server, None)
        .await?;
    ctx.advance(ScenarioState::PropagationTriggered);

    let on_middle = ctx.await_event(middle, Viewer::User, &created.uuid).await?;
    let on_last = ctx.await_event(last, Viewer::User, &created.uuid).await?;
    ctx.advance(ScenarioState::Settled);

    check_eq("attribute value on middle", first_value(&created), first_value(&on_middle))?;
    check_eq("attribute value on last", first_value(&created), first_value(&on_last))?;
    ctx.advance(ScenarioState::Asserted);
    Ok(())
}

/// Automatic push of the complex event along two hops.
async fn complex_event_push_pull(ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
    let spokes = ctx.spokes(3)?;
    let (source, middle, last) = (&spokes[0], &spokes[1], &spokes[2]);

    ctx.enable_push(source, middle).await?;
    ctx.enable_push(middle, last).await?;

    let created = create_and_publish(ctx, source, Viewer::OrgAdmin, &complex_event(), &spokes).await?;
    // Publishing with push enabled is the trigger.
    ctx.advance(ScenarioState::PropagationTriggered);

    let on_middle = ctx.await_event(middle, Viewer::User, &created.uuid).await?;
    let on_last = ctx.await_event(last, Viewer::User, &created.uuid).await?;
    let on_middle_admin = ctx.await_event(middle, Viewer::SiteAdmin, &created.uuid).await?;
    ctx.advance(ScenarioState::Settled);

    check_eq("attributes on middle", 2, on_middle.attributes.len())?;
    check_eq("object attributes on middle", Some(1), first_object_attributes(&on_middle))?;
    check_eq("attributes on last", 1, on_last.attributes.len())?;
    check(on_last.objects.is_empty(), "no object reaches last")?;
    check_eq(
        "attributes on middle as site admin",
        on_middle.attributes.len(),
        on_middle_admin.attributes.len(),
    )?;
    check_eq(
        "object attributes on middle as site admin",
        first_object_attributes(&on_middle),
        first_object_attributes(&on_middle_admin),
    )?;
    ctx.advance(ScenarioState::Asserted);
    Ok(())
}

/// Explicit pulls of the complex event along two hops.
async fn complex_event_pull(ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
    let spokes = ctx.spokes(3)?;
    let (source, middle, last) = (&spokes[0], &spokes[1], &spokes[2]);

    let created = create_and_publish(ctx, source, Viewer::OrgAdmin, &complex_event(), &spokes).await?;

    let from_source = edge_id(ctx, middle, source)?;
    ctx.client(middle, Viewer::SiteAdmin)?
        .server_pull(&from_source)
        .await?;
    ctx.await_event(middle, Viewer::SiteAdmin, &created.uuid).await?;
    let from_middle = edge_id(ctx, last, middle)?;
    ctx.client(last, Viewer::SiteAdmin)?
        .server_pull(&from_middle)
        .await?;
    ctx.advance(ScenarioState::PropagationTriggered);

    let on_middle = ctx.await_event(middle, Viewer::User, &created.uuid).await?;
    let on_last = ctx.await_event(last, Viewer::User, &created.uuid).await?;
    let on_middle_admin = ctx.await_event(middle, Viewer::SiteAdmin, &created.uuid).await?;
    ctx.advance(ScenarioState::Settled);

    check_eq("attributes on middle", 3, on_middle.attributes.len())?;
    check_eq("object attributes on middle", Some(1), first_object_attributes(&on_middle))?;
    check_eq("attributes on last", 2, on_last.attributes.len())?;
    check(on_last.objects.is_empty(), "no object reaches last")?;
    check_eq(
        "attributes on middle as site admin",
        on_middle.attributes.len(),
        on_middle_admin.attributes.len(),
    )?;
    check_eq(
        "object attributes on middle as site admin",
        first_object_attributes(&on_middle),
        first_object_attributes(&on_middle_admin),
    )?;
    ctx.advance(ScenarioState::Asserted);
    Ok(())
}

/// A sharing-group attribute whose group only has the local server as
/// member stays on the source.
async fn sharing_group(ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
    let spokes = ctx.spokes(3)?;
    let (source, middle, last) = (&spokes[0], &spokes[1], &spokes[2]);

    ctx.enable_push(source, middle).await?;
    ctx.enable_push(middle, last).await?;

    let middle_org = ctx.instance(middle)?.host_org().clone();
    ctx.track_sharing_group(SHARING_GROUP_NAME, &[source.clone(), middle.clone()]);
    let group = ctx
        .instance(source)?
        .create_sharing_group(
            SHARING_GROUP_NAME,
            "Testing",
            &[RemoteId::from(RemoteId::LOCAL_SERVER)],
            &[middle_org.to_ref()],
        )
        .await?;

    let mut event = complex_event();
    event
        .add_attribute("text", "SG only attr")
        .set_sharing_group(group.id.clone());
    let created = create_and_publish(ctx, source, Viewer::OrgAdmin, &event, &spokes).await?;
    ctx.advance(ScenarioState::PropagationTriggered);

    let on_middle = ctx.await_event(middle, Viewer::User, &created.uuid).await?;
    let on_middle_admin = ctx.await_event(middle, Viewer::SiteAdmin, &created.uuid).await?;
    let on_last = ctx.await_event(last, Viewer::User, &created.uuid).await?;
    let on_last_admin = ctx.await_event(last, Viewer::SiteAdmin, &created.uuid).await?;
    ctx.advance(ScenarioState::Settled);

    check_eq("attributes on middle", 2, on_middle.attributes.len())?;
    check_eq("objects on middle", 1, on_middle.objects.len())?;
    check_eq("object attributes on middle", Some(1), first_object_attributes(&on_middle))?;
    check(
        on_middle.attributes.iter().all(|a| a.value != "SG only attr"),
        "sharing group attribute stays on the source",
    )?;
    check_eq("attributes on middle as site admin", 2, on_middle_admin.attributes.len())?;
    check_eq("attributes on last", 1, on_last.attributes.len())?;
    check_eq("attributes on last as site admin", 1, on_last_admin.attributes.len())?;
    let groups_on_middle = ctx
        .client(middle, Viewer::SiteAdmin)?
        .sharing_groups()
        .await?;
    check_eq("sharing groups on middle", 0, groups_on_middle.len())?;
    ctx.advance(ScenarioState::Asserted);
    Ok(())
}

/// An edge restricted to a tag forwards tagged events only.
async fn tag_filtered_push(ctx: &mut ScenarioContext<'_>) -> VerifyResult<()> {
    let spokes = ctx.spokes(2)?;
    let (source, dest) = (&spokes[0], &spokes[1]);

    ctx.restrict_push(source, dest, PUSH_TAG).await?;
    ctx.enable_push(source, dest).await?;

    let mut untagged = simple_event(
        "Event created on first instance - untagged",
        Distribution::AllCommunities,
    );
    untagged.attributes[0].value = "2.2.2.2".to_string();
    let untagged = create_and_publish(ctx, source, Viewer::OrgAdmin, &untagged, &spokes).await?;

    let mut tagged = simple_event(
        "Event created on first instance - tagged",
        Distribution::AllCommunities,
    );
    tagged.add_tag(PUSH_TAG);
    let tagged = create_and_publish(ctx, source, Viewer::OrgAdmin, &tagged, &spokes).await?;
    ctx.advance(ScenarioState::PropagationTriggered);

    let seen = ctx.await_event(dest, Viewer::SiteAdmin, &tagged.uuid).await?;
    ctx.advance(ScenarioState::Settled);

    check_eq("attribute value on destination", first_value(&tagged), first_value(&seen))?;
    let withheld = ctx
        .client(dest, Viewer::SiteAdmin)?
        .get_event(&untagged.uuid)
        .await?;
    check(withheld.is_none(), "untagged event is withheld")?;
    ctx.advance(ScenarioState::Asserted);
    Ok(())
}
