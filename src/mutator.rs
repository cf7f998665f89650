//! Per-report mutations: relationship rebind and filter token rewrite
//!
//! The two writes are independent calls; a report can end up rebound but not
//! rewritten if the second call fails. Batches stop at the first failure and
//! never roll back reports already processed.

use crate::api::DashboardApi;
use crate::error::{MigrateError, Result};
use crate::resolver::ResourceResolver;
use crate::resource::RebindRequest;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Build the `filter_<name>` token for a filter name
pub fn filter_token(name: &str) -> String {
    format!("filter_{}", name)
}

/// How `filter_<from>` occurrences are found in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// Plain substring replacement. `filter_ab` is also hit when rewriting
    /// `filter_a`.
    #[default]
    Literal,
    /// Only whole tokens: not preceded or followed by a word character
    TokenBoundary,
}

/// A compiled `filter_<from>` → `filter_<to>` substitution
#[derive(Debug, Clone)]
pub struct FilterRewrite {
    from_token: String,
    to_token: String,
    boundary: Option<Regex>,
}

/// Result of applying a [`FilterRewrite`] to one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub query: String,
    pub replacements: usize,
}

impl FilterRewrite {
    pub fn new(from: &str, to: &str, mode: RewriteMode) -> Result<Self> {
        if from.is_empty() || to.is_empty() {
            return Err(MigrateError::InvalidInput(
                "Filter names to replace must not be empty".to_string(),
            ));
        }

        let from_token = filter_token(from);
        let boundary = match mode {
            RewriteMode::Literal => None,
            RewriteMode::TokenBoundary => {
                let mut pattern = format!(r"\b{}", regex::escape(&from_token));
                if from_token.ends_with(|c: char| c.is_alphanumeric() || c == '_') {
                    pattern.push_str(r"\b");
                }
                let re = Regex::new(&pattern).map_err(|e| {
                    MigrateError::InvalidInput(format!("Invalid filter name '{}': {}", from, e))
                })?;
                Some(re)
            }
        };

        Ok(Self {
            from_token,
            to_token: filter_token(to),
            boundary,
        })
    }

    pub fn from_token(&self) -> &str {
        &self.from_token
    }

    pub fn to_token(&self) -> &str {
        &self.to_token
    }

    /// Replace every matching occurrence; all other characters are untouched
    pub fn apply(&self, query: &str) -> Rewritten {
        if self.from_token == self.to_token {
            return Rewritten {
                query: query.to_string(),
                replacements: 0,
            };
        }

        match &self.boundary {
            None => Rewritten {
                replacements: query.matches(self.from_token.as_str()).count(),
                query: query.replace(&self.from_token, &self.to_token),
            },
            Some(re) => Rewritten {
                replacements: re.find_iter(query).count(),
                query: re
                    .replace_all(query, NoExpand(&self.to_token))
                    .into_owned(),
            },
        }
    }
}

/// Where a report gets rebound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebindTarget<'a> {
    pub datasource_id: &'a str,
    pub dashboard_id: &'a str,
}

/// Write step a report failed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStep {
    Rebind,
    Rewrite,
}

impl std::fmt::Display for ReportStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStep::Rebind => write!(f, "rebind"),
            ReportStep::Rewrite => write!(f, "rewrite"),
        }
    }
}

/// Applies rebind and rewrite to reports through a [`DashboardApi`]
pub struct ReportMutator<'a, S: DashboardApi + ?Sized> {
    api: &'a S,
}

impl<'a, S: DashboardApi + ?Sized> ReportMutator<'a, S> {
    pub fn new(api: &'a S) -> Self {
        Self { api }
    }

    /// Point the report at a new datasource and dashboard in one call
    pub fn rebind(&self, report_id: &str, target: RebindTarget<'_>) -> Result<()> {
        let request = RebindRequest::new(target.datasource_id, target.dashboard_id);
        self.api.rebind_report(report_id, &request)
    }

    /// Fetch the full report, rewrite its query and write the whole resource
    /// back. Returns the number of tokens replaced.
    ///
    /// A report whose query is `null` has nothing to rewrite and is not
    /// written.
    pub fn rewrite_query(&self, report_id: &str, rewrite: &FilterRewrite) -> Result<usize> {
        let mut report = ResourceResolver::new(self.api).resolve_report(report_id)?;
        let Some(query) = report.query() else {
            warn!(report = report_id, "Report has no query, skipping rewrite");
            return Ok(0);
        };
        let rewritten = rewrite.apply(query);
        report.set_query(rewritten.query);
        self.api.update_report(&report.document.data)?;
        Ok(rewritten.replacements)
    }

    /// Rebind, then rewrite when a rewrite is given
    pub fn process(
        &self,
        report_id: &str,
        target: RebindTarget<'_>,
        rewrite: Option<&FilterRewrite>,
    ) -> Result<()> {
        self.try_process(report_id, target, rewrite)
            .map_err(|failure| failure.error)
    }

    /// Like [`ReportMutator::process`], but the error says which report and
    /// step failed
    pub fn try_process(
        &self,
        report_id: &str,
        target: RebindTarget<'_>,
        rewrite: Option<&FilterRewrite>,
    ) -> std::result::Result<(), StepFailure> {
        self.rebind(report_id, target)
            .map_err(|e| StepFailure::new(report_id, ReportStep::Rebind, e))?;

        if let Some(rewrite) = rewrite {
            let replacements = self
                .rewrite_query(report_id, rewrite)
                .map_err(|e| StepFailure::new(report_id, ReportStep::Rewrite, e))?;
            debug!(
                report = report_id,
                replacements,
                "replaced {} with {}",
                rewrite.from_token(),
                rewrite.to_token()
            );
        }

        info!("Updating report {}... DONE", report_id);
        Ok(())
    }
}

/// A report write that was rejected, with the step it failed at
#[derive(Debug)]
pub struct StepFailure {
    pub report_id: String,
    pub step: ReportStep,
    pub error: MigrateError,
}

impl StepFailure {
    fn new(report_id: &str, step: ReportStep, error: MigrateError) -> Self {
        error!(report = report_id, %step, "Updating report {}... ERROR", report_id);
        Self {
            report_id: report_id.to_string(),
            step,
            error,
        }
    }

    /// The report was rebound before the failure, so it now points at the
    /// new datasource with its old query
    pub fn left_half_written(&self) -> bool {
        self.step == ReportStep::Rewrite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeDashboardService};
    use proptest::prelude::*;

    fn literal(from: &str, to: &str) -> FilterRewrite {
        FilterRewrite::new(from, to, RewriteMode::Literal).unwrap()
    }

    fn boundary(from: &str, to: &str) -> FilterRewrite {
        FilterRewrite::new(from, to, RewriteMode::TokenBoundary).unwrap()
    }

    #[test]
    fn test_literal_rewrite() {
        let out = literal("A", "B").apply("where x = {{filter_A}} and y = {{filter_A}}");
        assert_eq!(out.query, "where x = {{filter_B}} and y = {{filter_B}}");
        assert_eq!(out.replacements, 2);
    }

    #[test]
    fn test_literal_rewrite_hits_prefixed_names() {
        // Known hazard of literal mode: filter_standard_region shares the prefix
        let out = literal("standard", "cronos")
            .apply("{{filter_standard}} {{filter_standard_region}}");
        assert_eq!(out.query, "{{filter_cronos}} {{filter_cronos_region}}");
    }

    #[test]
    fn test_boundary_rewrite_skips_prefixed_names() {
        let out = boundary("standard", "cronos")
            .apply("{{filter_standard}} {{filter_standard_region}} myfilter_standard");
        assert_eq!(
            out.query,
            "{{filter_cronos}} {{filter_standard_region}} myfilter_standard"
        );
        assert_eq!(out.replacements, 1);
    }

    #[test]
    fn test_boundary_rewrite_at_text_edges() {
        let out = boundary("A", "B").apply("filter_A");
        assert_eq!(out.query, "filter_B");
    }

    #[test]
    fn test_rewrite_does_not_expand_dollar() {
        let out = boundary("A", "$1x").apply("filter_A");
        assert_eq!(out.query, "filter_$1x");
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(FilterRewrite::new("", "B", RewriteMode::Literal).is_err());
        assert!(FilterRewrite::new("A", "", RewriteMode::TokenBoundary).is_err());
    }

    #[test]
    fn test_rebind_sets_both_relationships() {
        let api = FakeDashboardService::new()
            .with_dashboard("d-1", "Ops")
            .with_dashboard("d-2", "Ops copy")
            .with_report("r-1", "d-1", "ds-old", "select 1");
        let mutator = ReportMutator::new(&api);
        mutator
            .rebind(
                "r-1",
                RebindTarget {
                    datasource_id: "ds-new",
                    dashboard_id: "d-2",
                },
            )
            .unwrap();

        let report = api.report("r-1").unwrap();
        assert_eq!(report.data.related_id("datasource"), Some("ds-new"));
        assert_eq!(report.data.related_id("dashboard"), Some("d-2"));
    }

    #[test]
    fn test_rewrite_query_writes_full_resource() {
        let api = FakeDashboardService::new()
            .with_dashboard("d-1", "Ops")
            .with_report("r-1", "d-1", "ds-1", "select * where {{filter_A}}");
        let before = api.report("r-1").unwrap();

        let replaced = ReportMutator::new(&api)
            .rewrite_query("r-1", &literal("A", "B"))
            .unwrap();
        assert_eq!(replaced, 1);

        let after = api.report("r-1").unwrap();
        assert_eq!(
            after.data.attributes.query.as_deref(),
            Some("select * where {{filter_B}}")
        );
        assert_eq!(after.data.attributes.other, before.data.attributes.other);
        assert_eq!(after.data.relationships, before.data.relationships);
        assert_eq!(
            api.mutation_calls(),
            vec![Call::UpdateReport {
                report_id: "r-1".to_string(),
                query: "select * where {{filter_B}}".to_string(),
            }]
        );
    }

    #[test]
    fn test_process_stops_after_failed_rebind() {
        let api = FakeDashboardService::new()
            .with_dashboard("d-1", "Ops")
            .with_report("r-1", "d-1", "ds-1", "{{filter_A}}")
            .fail_rebind_of("r-1");
        let rewrite = literal("A", "B");
        let err = ReportMutator::new(&api)
            .process(
                "r-1",
                RebindTarget {
                    datasource_id: "ds-2",
                    dashboard_id: "d-1",
                },
                Some(&rewrite),
            )
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        // no rewrite attempted after the failed rebind
        assert!(!api
            .calls()
            .iter()
            .any(|c| matches!(c, Call::GetReport(_) | Call::UpdateReport { .. })));
    }

    #[test]
    fn test_process_without_rewrite_only_rebinds() {
        let api = FakeDashboardService::new()
            .with_dashboard("d-1", "Ops")
            .with_report("r-1", "d-1", "ds-1", "{{filter_A}}");
        ReportMutator::new(&api)
            .process(
                "r-1",
                RebindTarget {
                    datasource_id: "ds-2",
                    dashboard_id: "d-1",
                },
                None,
            )
            .unwrap();
        assert_eq!(api.mutation_calls().len(), 1);
    }

    #[test]
    fn test_null_query_is_rebound_but_not_written() {
        let api = FakeDashboardService::new()
            .with_dashboard("d-1", "Ops")
            .with_queryless_report("r-1", "d-1", "ds-1");
        let rewrite = literal("A", "B");
        ReportMutator::new(&api)
            .process(
                "r-1",
                RebindTarget {
                    datasource_id: "ds-2",
                    dashboard_id: "d-1",
                },
                Some(&rewrite),
            )
            .unwrap();

        assert_eq!(
            api.mutation_calls(),
            vec![Call::RebindReport {
                report_id: "r-1".to_string(),
                datasource_id: "ds-2".to_string(),
                dashboard_id: "d-1".to_string(),
            }]
        );
        assert!(api.report("r-1").unwrap().data.attributes.query.is_none());
    }

    #[test]
    fn test_try_process_names_failed_step() {
        let api = FakeDashboardService::new()
            .with_dashboard("d-1", "Ops")
            .with_report("r-1", "d-1", "ds-1", "{{filter_A}}")
            .fail_update_of("r-1");
        let rewrite = literal("A", "B");
        let failure = ReportMutator::new(&api)
            .try_process(
                "r-1",
                RebindTarget {
                    datasource_id: "ds-2",
                    dashboard_id: "d-1",
                },
                Some(&rewrite),
            )
            .unwrap_err();

        assert_eq!(failure.report_id, "r-1");
        assert_eq!(failure.step, ReportStep::Rewrite);
        assert!(failure.left_half_written());
        assert_eq!(failure.error.exit_code(), 4);
        // rebind went through before the rejected PATCH
        assert_eq!(
            api.report("r-1").unwrap().data.related_id("datasource"),
            Some("ds-2")
        );
    }

    fn filter_name() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_same_token_is_noop(query in ".{0,80}", name in filter_name()) {
            let out = literal(&name, &name).apply(&query);
            prop_assert_eq!(out.query, query);
            prop_assert_eq!(out.replacements, 0);
        }

        #[test]
        fn prop_rewrite_counts(
            parts in proptest::collection::vec("[ ,;=()0-9]{0,6}", 1..6),
        ) {
            // N occurrences of filter_from separated by text without filter tokens
            let query = parts.join("{{filter_from}}");
            let n = parts.len() - 1;

            let out = literal("from", "to").apply(&query);
            prop_assert_eq!(out.query.matches("filter_to").count(), n);
            prop_assert_eq!(out.query.matches("filter_from").count(), 0);
            prop_assert_eq!(out.replacements, n);
        }

        #[test]
        fn prop_rewrite_round_trips(
            parts in proptest::collection::vec("[ ,;=()0-9]{0,6}", 1..6),
        ) {
            let query = parts.join("filter_alpha");
            let there = literal("alpha", "omega").apply(&query);
            let back = literal("omega", "alpha").apply(&there.query);
            prop_assert_eq!(back.query, query);
        }

        #[test]
        fn prop_boundary_matches_literal_without_prefix_clashes(
            parts in proptest::collection::vec("[ ,;=()]{1,6}", 1..6),
        ) {
            let query = parts.join("filter_alpha");
            let a = literal("alpha", "omega").apply(&query);
            let b = boundary("alpha", "omega").apply(&query);
            prop_assert_eq!(a, b);
        }
    }
}
