//! Single-dashboard migrations
//!
//! `move` rebinds every report of a dashboard to another datasource;
//! `migrate` additionally rewrites one filter token in each report's query.
//! Both check the datasource and the dashboard first and ask for
//! confirmation before the first write.

use crate::api::DashboardApi;
use crate::confirm::{ConfirmationGate, Decision};
use crate::error::Result;
use crate::mutator::{FilterRewrite, RebindTarget, ReportMutator, StepFailure};
use crate::resolver::ResourceResolver;
use crate::walker::{describe_count, reports_of};
use tracing::{error, info};

/// What to do to one dashboard
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub dashboard_id: String,
    pub datasource_id: String,
    /// Filter token substitution applied after each rebind
    pub rewrite: Option<FilterRewrite>,
}

impl MigrationPlan {
    /// Rebind only
    pub fn move_to(dashboard_id: impl Into<String>, datasource_id: impl Into<String>) -> Self {
        Self {
            dashboard_id: dashboard_id.into(),
            datasource_id: datasource_id.into(),
            rewrite: None,
        }
    }

    pub fn with_rewrite(mut self, rewrite: FilterRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    /// Text shown at the confirmation prompt
    pub fn summary(&self, report_count: usize, datasource_name: &str) -> String {
        match &self.rewrite {
            None => format!(
                "The dashboard contains {}. Do you want to proceed and update these to use the '{}' datasource?",
                describe_count(report_count),
                datasource_name
            ),
            Some(rewrite) => format!(
                "The dashboard contains {}. Do you want to proceed using the '{}' datasource and replacing filter '{}' by '{}'?",
                describe_count(report_count),
                datasource_name,
                rewrite.from_token(),
                rewrite.to_token()
            ),
        }
    }
}

/// Counts of completed report writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub reports_rebound: usize,
    pub reports_rewritten: usize,
}

/// How a migration run ended, short of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The dashboard has no reports
    NothingToDo,
    /// The operator declined at the prompt
    Aborted,
    Completed(MigrationSummary),
}

/// Check, confirm, then process every report of the dashboard in order
///
/// Stops at the first failed write; reports processed before it keep their
/// new state.
pub fn run<S: DashboardApi + ?Sized>(
    api: &S,
    gate: &mut ConfirmationGate,
    plan: &MigrationPlan,
) -> Result<Outcome> {
    let resolver = ResourceResolver::new(api);
    let datasource = resolver.check_datasource(&plan.datasource_id)?;
    let dashboard = resolver.check_dashboard(&plan.dashboard_id)?;

    let total = dashboard.report_ids.len();
    if total == 0 {
        info!("The dashboard contains no reports, I've got nothing to do");
        return Ok(Outcome::NothingToDo);
    }

    if gate.confirm(&plan.summary(total, &datasource.name)) == Decision::Abort {
        return Ok(Outcome::Aborted);
    }

    let target = RebindTarget {
        datasource_id: &datasource.id,
        dashboard_id: dashboard.id(),
    };
    let mutator = ReportMutator::new(api);
    let mut summary = MigrationSummary::default();

    for report_id in reports_of(&dashboard) {
        if let Err(failure) = mutator.try_process(report_id, target, plan.rewrite.as_ref()) {
            error!("{}", stop_message(&failure, summary.reports_rebound, total));
            return Err(failure.error);
        }
        summary.reports_rebound += 1;
        if plan.rewrite.is_some() {
            summary.reports_rewritten += 1;
        }
    }

    info!("Updated {}", describe_count(summary.reports_rebound));
    Ok(Outcome::Completed(summary))
}

/// What the operator needs to know after a batch stopped at `failure`
pub fn stop_message(failure: &StepFailure, done: usize, total: usize) -> String {
    let state = if failure.left_half_written() {
        "rebound but its query was not rewritten"
    } else {
        "not changed"
    };
    format!(
        "Stopped at report {} ({} failed) after {} of {}. Report {} was {}; remaining reports were not touched",
        failure.report_id,
        failure.step,
        done,
        describe_count(total),
        failure.report_id,
        state
    )
}
