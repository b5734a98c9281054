//! Propagation verification over a provisioned federation.
//!
//! Each scenario creates an event on one spoke, triggers propagation by
//! explicit push, explicit pull or automatic push, waits for the
//! destinations with a bounded [`settle`] poll and compares what different
//! role-bound clients see. Scenarios always clean up after themselves.

mod error;
pub mod fixtures;
mod runner;
mod scenario;
mod scenarios;
mod settle;

pub use error::{VerifyError, VerifyResult};
pub use runner::{RunSummary, run_scenario, run_scenarios};
pub use scenario::{
    Outcome, ScenarioContext, ScenarioReport, ScenarioState, Viewer, check, check_eq,
};
pub use scenarios::{PUSH_TAG, SHARING_GROUP_NAME, ScenarioKind};
pub use settle::{SettlePolicy, settle};
