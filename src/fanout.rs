//! Per-customer dashboard duplication
//!
//! Each source dashboard is cloned once per configured customer. The clone is
//! renamed, its reports are rebound to the customer's datasource and the
//! source filter token in every query is replaced by the customer key. Work
//! proceeds in nested order (sources, then customers, then reports) and stops
//! at the first failure, leaving clones already created in place.

use crate::api::DashboardApi;
use crate::config::{Config, CustomerTarget};
use crate::confirm::{ConfirmationGate, Decision};
use crate::error::{MigrateError, Result};
use crate::mutator::{FilterRewrite, RebindTarget, ReportMutator, RewriteMode};
use crate::resolver::ResourceResolver;
use crate::resource::Dashboard;
use crate::migrate::stop_message;
use crate::walker::{describe_count, reports_of};
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Sources and customer targets for one duplication run
#[derive(Debug, Clone)]
pub struct DuplicationPlan {
    pub sources: Vec<String>,
    pub customers: Vec<CustomerTarget>,
    /// Replaced by the customer's display name in the clone's name
    pub name_placeholder: String,
    /// Filter name rewritten to the customer key
    pub source_filter: String,
    pub mode: RewriteMode,
}

impl DuplicationPlan {
    pub fn from_config(sources: Vec<String>, config: &Config) -> Self {
        Self {
            sources,
            customers: config.customers.clone(),
            name_placeholder: config.duplicate.name_placeholder.clone(),
            source_filter: config.duplicate.source_filter.clone(),
            mode: config.rewrite.mode,
        }
    }

    pub fn with_mode(mut self, mode: RewriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Text shown at the confirmation prompt
    pub fn summary(&self) -> String {
        let keys: Vec<String> = self
            .customers
            .iter()
            .map(|c| format!("\"{}\"", c.key))
            .collect();
        format!(
            "I will duplicate dashboards '{}' for customers [{}]. Do you want to proceed?",
            self.sources.join(","),
            keys.join(", ")
        )
    }

    /// One compiled rewrite per customer, in customer order
    fn rewrites(&self) -> Result<Vec<FilterRewrite>> {
        if self.sources.is_empty() {
            return Err(MigrateError::InvalidInput(
                "No source dashboards given".to_string(),
            ));
        }
        if self.customers.is_empty() {
            return Err(MigrateError::Config("No customers configured".to_string()));
        }
        self.customers
            .iter()
            .map(|c| FilterRewrite::new(&self.source_filter, &c.key, self.mode))
            .collect()
    }
}

/// A dashboard created by this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRecord {
    pub source_id: String,
    pub customer_key: String,
    pub clone_id: String,
    pub name: String,
    /// Reports migrated on the clone
    pub reports: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutOutcome {
    Aborted,
    Completed(Vec<CloneRecord>),
}

/// Duplicate every source dashboard for every customer
pub fn run<S: DashboardApi + ?Sized>(
    api: &S,
    gate: &mut ConfirmationGate,
    plan: &DuplicationPlan,
) -> Result<FanOutOutcome> {
    let rewrites = plan.rewrites()?;

    if gate.confirm(&plan.summary()) == Decision::Abort {
        return Ok(FanOutOutcome::Aborted);
    }

    let mut fan_out = FanOut {
        api,
        plan,
        known_ids: plan.sources.iter().cloned().collect(),
    };
    let mut clones = Vec::new();

    for source_id in &plan.sources {
        for (customer, rewrite) in plan.customers.iter().zip(&rewrites) {
            clones.push(fan_out.duplicate_for(source_id, customer, rewrite)?);
        }
    }

    info!("Created {} dashboard(s)", clones.len());
    Ok(FanOutOutcome::Completed(clones))
}

struct FanOut<'a, S: DashboardApi + ?Sized> {
    api: &'a S,
    plan: &'a DuplicationPlan,
    /// Sources and clones seen so far; a new clone must not collide
    known_ids: HashSet<String>,
}

impl<S: DashboardApi + ?Sized> FanOut<'_, S> {
    fn duplicate_for(
        &mut self,
        source_id: &str,
        customer: &CustomerTarget,
        rewrite: &FilterRewrite,
    ) -> Result<CloneRecord> {
        ResourceResolver::new(self.api).check_dashboard(source_id)?;

        info!("Duplicate dashboard {} for {} ...", source_id, customer.key);
        let mut clone = Dashboard::from_document(self.api.duplicate_dashboard(source_id)?)?;
        if !self.known_ids.insert(clone.id().to_string()) {
            return Err(MigrateError::CloneConflict {
                source_id: source_id.to_string(),
                clone_id: clone.id().to_string(),
            });
        }

        clone.rename(&self.plan.name_placeholder, &customer.name);
        self.api.update_dashboard(&clone.document.data)?;
        info!("Created dashboard {}, name: {}", clone.id(), clone.name());

        let mut record = CloneRecord {
            source_id: source_id.to_string(),
            customer_key: customer.key.clone(),
            clone_id: clone.id().to_string(),
            name: clone.name().to_string(),
            reports: 0,
        };

        if clone.report_ids.is_empty() {
            warn!(
                clone = clone.id(),
                "The dashboard contains no reports, moving on to the next customer"
            );
            return Ok(record);
        }

        let target = RebindTarget {
            datasource_id: &customer.datasource,
            dashboard_id: clone.id(),
        };
        let mutator = ReportMutator::new(self.api);
        let total = clone.report_ids.len();
        for report_id in reports_of(&clone) {
            if let Err(failure) = mutator.try_process(report_id, target, Some(rewrite)) {
                error!("{}", stop_message(&failure, record.reports, total));
                return Err(failure.error);
            }
            record.reports += 1;
        }
        info!(
            "Dashboard {} ready with {}",
            record.clone_id,
            describe_count(record.reports)
        );

        self.api.request_refresh(source_id);
        Ok(record)
    }
}
