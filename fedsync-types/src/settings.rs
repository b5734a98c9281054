//! Instance-wide settings and background worker health.

use crate::flags::bool_flag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Internal base URL setting.
pub const SETTING_BASEURL: &str = "MISP.baseurl";
/// Externally reachable base URL setting.
pub const SETTING_EXTERNAL_BASEURL: &str = "MISP.external_baseurl";
/// Id of the organisation hosting the instance.
pub const SETTING_HOST_ORG_ID: &str = "MISP.host_org_id";

/// Worker queues that must be healthy before propagation can be exercised.
pub const REQUIRED_QUEUES: [&str; 2] = ["default", "prio"];

/// Health of one background worker queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerQueue {
    #[serde(default, deserialize_with = "bool_flag")]
    pub ok: bool,
}

/// The subset of the server settings report the harness reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerQueue>,
}

impl ServerSettings {
    /// Settings reporting every required queue as healthy.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            workers: REQUIRED_QUEUES
                .iter()
                .map(|q| (q.to_string(), WorkerQueue { ok: true }))
                .collect(),
        }
    }

    /// True once the `default` and `prio` queues both report ok.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        REQUIRED_QUEUES
            .iter()
            .all(|q| self.workers.get(*q).is_some_and(|w| w.ok))
    }

    /// Names of required queues that are not healthy yet.
    #[must_use]
    pub fn unhealthy_queues(&self) -> Vec<&'static str> {
        REQUIRED_QUEUES
            .iter()
            .copied()
            .filter(|q| !self.workers.get(*q).is_some_and(|w| w.ok))
            .collect()
    }
}
