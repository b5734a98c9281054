//! Worker readiness gate.
//!
//! Propagation is carried by background workers on each instance. Nothing
//! is verified before the `default` and `prio` queues report healthy.

use crate::error::{TopologyError, TopologyResult};
use crate::instance::Instance;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// How often and how long to poll worker health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            max_attempts: 600,
        }
    }
}

impl ReadinessPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Polls one instance until its required worker queues are healthy.
///
/// Returns the number of polls it took.
pub async fn wait_until_ready(instance: &Instance, policy: &ReadinessPolicy) -> TopologyResult<u32> {
    let mut unhealthy = Vec::new();
    for attempt in 1..=policy.max_attempts {
        let settings = instance.site_admin().server_settings().await?;
        if settings.is_ready() {
            debug!("{} ready after {} polls", instance.name(), attempt);
            return Ok(attempt);
        }
        unhealthy = settings.unhealthy_queues();
        debug!("Not ready: {} ({})", instance.name(), unhealthy.join(", "));
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval()).await;
        }
    }
    Err(TopologyError::NotReady {
        instance: instance.name().to_string(),
        attempts: policy.max_attempts,
        queues: unhealthy.join(", "),
    })
}

/// Waits for every given instance in turn.
pub async fn wait_until_all_ready<'a>(
    instances: impl IntoIterator<Item = &'a Instance>,
    policy: &ReadinessPolicy,
) -> TopologyResult<()> {
    for instance in instances {
        wait_until_ready(instance, policy).await?;
    }
    info!("All instances report healthy workers");
    Ok(())
}
