//! Sequential scenario execution.

use crate::scenario::{ScenarioContext, ScenarioReport};
use crate::scenarios::ScenarioKind;
use crate::settle::SettlePolicy;
use fedsync_topology::Federation;
use serde::Serialize;
use tracing::info;

/// Runs one scenario; cleanup runs whatever the outcome.
pub async fn run_scenario(
    kind: ScenarioKind,
    federation: &mut Federation,
    settle_policy: &SettlePolicy,
) -> ScenarioReport {
    info!("Running {}", kind);
    let mut ctx = ScenarioContext::new(kind.name(), federation, *settle_policy);
    let result = kind.drive(&mut ctx).await;
    ctx.clean_up().await;
    ctx.into_report(result)
}

/// Runs `selection` in order. A failing scenario does not stop the run.
pub async fn run_scenarios(
    selection: &[ScenarioKind],
    federation: &mut Federation,
    settle_policy: &SettlePolicy,
) -> RunSummary {
    let mut reports = Vec::with_capacity(selection.len());
    for kind in selection {
        reports.push(run_scenario(*kind, federation, settle_policy).await);
    }
    let summary = RunSummary { reports };
    info!(
        "{} of {} scenarios passed",
        summary.passed_count(),
        summary.reports.len()
    );
    summary
}

/// Reports of a run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    pub fn passed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.passed()).count()
    }

    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(ScenarioReport::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.reports.iter().filter(|r| !r.passed())
    }
}
