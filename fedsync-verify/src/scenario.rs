//! Scenario lifecycle.
//!
//! A scenario moves through [`ScenarioState`]s while it drives the
//! federation. Everything it creates or toggles is registered with its
//! [`ScenarioContext`] and undone in [`ScenarioContext::clean_up`], which
//! runs whatever the outcome. Entities that are already gone at that point
//! are logged and skipped.

use crate::error::{VerifyError, VerifyResult};
use crate::settle::{SettlePolicy, settle};
use fedsync_client::{ClientError, InstanceApi};
use fedsync_topology::{Federation, Instance};
use fedsync_types::Event;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioState {
    Init,
    EventCreated,
    Published,
    PropagationTriggered,
    Settled,
    Asserted,
    CleanedUp,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioState::Init => "INIT",
            ScenarioState::EventCreated => "EVENT_CREATED",
            ScenarioState::Published => "PUBLISHED",
            ScenarioState::PropagationTriggered => "PROPAGATION_TRIGGERED",
            ScenarioState::Settled => "SETTLED",
            ScenarioState::Asserted => "ASSERTED",
            ScenarioState::CleanedUp => "CLEANED_UP",
        };
        f.write_str(name)
    }
}

/// Which of an instance's role-bound clients performs a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    SiteAdmin,
    OrgAdmin,
    User,
}

impl Viewer {
    pub fn client(self, instance: &Instance) -> &dyn InstanceApi {
        match self {
            Viewer::SiteAdmin => instance.site_admin(),
            Viewer::OrgAdmin => instance.org_admin(),
            Viewer::User => instance.user(),
        }
    }
}

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(String),
}

/// What a finished scenario reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub states: Vec<ScenarioState>,
    pub outcome: Outcome,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    /// Last state reached before cleanup.
    pub fn furthest_state(&self) -> ScenarioState {
        self.states
            .iter()
            .copied()
            .filter(|s| *s != ScenarioState::CleanedUp)
            .max()
            .unwrap_or(ScenarioState::Init)
    }
}

#[derive(Debug, Default)]
struct CleanupPlan {
    /// Event uuid and the instances it may have reached.
    events: Vec<(Uuid, Vec<String>)>,
    /// Instance and sharing group name.
    sharing_groups: Vec<(String, String)>,
    /// Holder and counterpart of edges whose push flag was switched on.
    pushes: Vec<(String, String)>,
    /// Holder and counterpart of edges whose push rules were restricted.
    push_rules: Vec<(String, String)>,
}

/// Mutable state of one running scenario.
pub struct ScenarioContext<'f> {
    name: &'static str,
    federation: &'f mut Federation,
    settle_policy: SettlePolicy,
    states: Vec<ScenarioState>,
    cleanup: CleanupPlan,
}

impl<'f> ScenarioContext<'f> {
    pub fn new(name: &'static str, federation: &'f mut Federation, settle_policy: SettlePolicy) -> Self {
        Self {
            name,
            federation,
            settle_policy,
            states: vec![ScenarioState::Init],
            cleanup: CleanupPlan::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Records a state transition.
    pub fn advance(&mut self, state: ScenarioState) {
        debug!("[{}] {}", self.name, state);
        self.states.push(state);
    }

    pub fn states(&self) -> &[ScenarioState] {
        &self.states
    }

    /// Names of the first `needed` spokes.
    pub fn spokes(&self, needed: usize) -> VerifyResult<Vec<String>> {
        let spokes: Vec<String> = self
            .federation
            .spokes()
            .map(|s| s.name().to_string())
            .collect();
        if spokes.len() < needed {
            return Err(VerifyError::NotEnoughSpokes {
                needed,
                available: spokes.len(),
            });
        }
        Ok(spokes.into_iter().take(needed).collect())
    }

    pub fn instance(&self, name: &str) -> VerifyResult<&Instance> {
        Ok(self.federation.instance(name)?)
    }

    pub fn client(&self, name: &str, viewer: Viewer) -> VerifyResult<&dyn InstanceApi> {
        Ok(viewer.client(self.instance(name)?))
    }

    // ── Registered changes ──────────────────────────────────────

    /// Registers an event for deletion on `instances`.
    pub fn track_event(&mut self, uuid: Uuid, instances: &[String]) {
        self.cleanup.events.push((uuid, instances.to_vec()));
    }

    /// Registers a sharing group for deletion on `instances`.
    pub fn track_sharing_group(&mut self, name: &str, instances: &[String]) {
        for instance in instances {
            self.cleanup
                .sharing_groups
                .push((instance.clone(), name.to_string()));
        }
    }

    /// Enables push on the edge and registers it for reverting.
    pub async fn enable_push(&mut self, holder: &str, counterpart: &str) -> VerifyResult<()> {
        let record = self
            .federation
            .instance_mut(holder)?
            .set_push(counterpart, true)
            .await?;
        self.cleanup
            .pushes
            .push((holder.to_string(), counterpart.to_string()));
        check(record.push, format!("push from {holder} to {counterpart} enabled"))
    }

    /// Restricts push on the edge to `tag` and registers it for reverting.
    pub async fn restrict_push(&mut self, holder: &str, counterpart: &str, tag: &str) -> VerifyResult<()> {
        self.federation
            .instance_mut(holder)?
            .restrict_push(counterpart, tag)
            .await?;
        self.cleanup
            .push_rules
            .push((holder.to_string(), counterpart.to_string()));
        Ok(())
    }

    // ── Waiting ─────────────────────────────────────────────────

    /// Waits until `viewer` on `instance` sees the event.
    pub async fn await_event(&self, instance: &str, viewer: Viewer, uuid: &Uuid) -> VerifyResult<Event> {
        let api = self.client(instance, viewer)?;
        let what = format!("event {uuid} on {instance}");
        settle(&self.settle_policy, &what, move || async move {
            Ok::<_, VerifyError>(api.get_event(uuid).await?)
        })
        .await
    }

    // ── Cleanup ─────────────────────────────────────────────────

    /// Deletes registered events and sharing groups, then reverts edge
    /// changes newest first. Never fails; problems are logged.
    pub async fn clean_up(&mut self) {
        let plan = std::mem::take(&mut self.cleanup);

        for (uuid, instances) in &plan.events {
            for instance in instances {
                let Ok(found) = self.federation.instance(instance) else {
                    warn!("[{}] cleanup: unknown instance {}", self.name, instance);
                    continue;
                };
                match found.site_admin().delete_event(uuid).await {
                    Ok(()) => debug!("[{}] deleted event {} on {}", self.name, uuid, instance),
                    Err(ClientError::NotFound(_)) => {
                        warn!("[{}] cleanup: event {} not on {}", self.name, uuid, instance)
                    }
                    Err(e) => warn!("[{}] cleanup: deleting event on {}: {}", self.name, instance, e),
                }
            }
        }

        for (instance, group) in plan.sharing_groups.iter().rev() {
            let result = match self.federation.instance(instance) {
                Ok(found) => found.delete_sharing_group(group).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => debug!("[{}] deleted sharing group {} on {}", self.name, group, instance),
                Ok(false) => warn!("[{}] cleanup: sharing group {} not on {}", self.name, group, instance),
                Err(e) => warn!("[{}] cleanup: sharing group on {}: {}", self.name, instance, e),
            }
        }

        for (holder, counterpart) in plan.push_rules.iter().rev() {
            if let Err(e) = self.clear_push_rules(holder, counterpart).await {
                warn!("[{}] cleanup: push rules {} -> {}: {}", self.name, holder, counterpart, e);
            }
        }

        for (holder, counterpart) in plan.pushes.iter().rev() {
            if let Err(e) = self.disable_push(holder, counterpart).await {
                warn!("[{}] cleanup: push {} -> {}: {}", self.name, holder, counterpart, e);
            }
        }

        self.advance(ScenarioState::CleanedUp);
    }

    async fn clear_push_rules(&mut self, holder: &str, counterpart: &str) -> VerifyResult<()> {
        self.federation
            .instance_mut(holder)?
            .clear_push_rules(counterpart)
            .await?;
        Ok(())
    }

    async fn disable_push(&mut self, holder: &str, counterpart: &str) -> VerifyResult<()> {
        self.federation
            .instance_mut(holder)?
            .set_push(counterpart, false)
            .await?;
        Ok(())
    }

    /// Turns the context into a report once cleanup ran.
    pub fn into_report(self, result: VerifyResult<()>) -> ScenarioReport {
        let outcome = match result {
            Ok(()) => {
                info!("[{}] passed", self.name);
                Outcome::Passed
            }
            Err(e) => {
                warn!("[{}] failed: {}", self.name, e);
                Outcome::Failed(e.to_string())
            }
        };
        ScenarioReport {
            name: self.name,
            states: self.states,
            outcome,
        }
    }
}

// ── Checks ──────────────────────────────────────────────────────

/// Fails with `message` unless `condition` holds.
pub fn check(condition: bool, message: impl Into<String>) -> VerifyResult<()> {
    if condition {
        Ok(())
    } else {
        Err(VerifyError::Assertion(message.into()))
    }
}

/// Fails unless `actual == expected`.
pub fn check_eq<T: PartialEq + fmt::Debug>(what: &str, expected: T, actual: T) -> VerifyResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(VerifyError::Assertion(format!(
            "{what}: expected {expected:?}, got {actual:?}"
        )))
    }
}
