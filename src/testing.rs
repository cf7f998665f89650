//! In-memory dashboard service for tests
//!
//! [`FakeDashboardService`] implements [`DashboardApi`] over plain maps and
//! records every call in order, so tests can assert on the exact call
//! sequence a migration produced.

use crate::api::DashboardApi;
use crate::error::{MigrateError, ResourceKind, Result};
use crate::resource::{
    DashboardAttributes, DashboardDocument, DatasourceAttributes, DatasourceDocument, Document,
    RebindRequest, ReportAttributes, ReportDocument, Resource,
};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// One call received by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetDashboard(String),
    GetDatasource(String),
    GetReport(String),
    DuplicateDashboard(String),
    UpdateDashboard {
        dashboard_id: String,
        name: String,
    },
    RebindReport {
        report_id: String,
        datasource_id: String,
        dashboard_id: String,
    },
    UpdateReport {
        report_id: String,
        query: String,
    },
    RequestRefresh(String),
}

impl Call {
    /// Whether the call changes a dashboard, report or datasource
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::DuplicateDashboard(_)
                | Call::UpdateDashboard { .. }
                | Call::RebindReport { .. }
                | Call::UpdateReport { .. }
        )
    }
}

#[derive(Default)]
struct State {
    dashboards: BTreeMap<String, Resource<DashboardAttributes>>,
    dashboard_reports: BTreeMap<String, Vec<String>>,
    datasources: BTreeMap<String, DatasourceDocument>,
    reports: BTreeMap<String, Resource<ReportAttributes>>,
    calls: Vec<Call>,
    failing_rebinds: HashSet<String>,
    failing_report_updates: HashSet<String>,
    forced_clone_ids: VecDeque<String>,
    clones_made: usize,
}

fn to_one(id: &str, kind: &str) -> Value {
    json!({"data": {"id": id, "type": kind}})
}

fn not_found(kind: ResourceKind, id: &str) -> MigrateError {
    MigrateError::NotFound {
        kind,
        id: id.to_string(),
        status: 404,
    }
}

impl State {
    fn render_dashboard(&self, id: &str) -> Option<DashboardDocument> {
        let mut data = self.dashboards.get(id)?.clone();
        let reports: Vec<Value> = self
            .dashboard_reports
            .get(id)
            .map(|ids| {
                ids.iter()
                    .map(|r| json!({"id": r, "type": "reports"}))
                    .collect()
            })
            .unwrap_or_default();
        data.set_relationship("reports", json!({ "data": reports }));
        Some(Document {
            data,
            extra: Map::new(),
        })
    }

    fn insert_report(
        &mut self,
        id: &str,
        dashboard_id: &str,
        datasource_id: &str,
        query: Option<String>,
    ) {
        let mut other = Map::new();
        other.insert("name".to_string(), json!(format!("Report {}", id)));
        other.insert("settings".to_string(), json!({"chart": "table", "limit": 500}));

        let mut relationships = Map::new();
        relationships.insert("datasource".to_string(), to_one(datasource_id, "datasources"));
        relationships.insert("dashboard".to_string(), to_one(dashboard_id, "dashboards"));

        let data = Resource {
            id: id.to_string(),
            kind: Some(json!("reports")),
            attributes: ReportAttributes { query, other },
            relationships: Some(Value::Object(relationships)),
            extra: Map::new(),
        };
        self.reports.insert(id.to_string(), data);
        self.move_report(id, None, dashboard_id);
    }

    fn move_report(&mut self, report_id: &str, from: Option<&str>, to: &str) {
        if from == Some(to) {
            return;
        }
        if let Some(from) = from {
            if let Some(ids) = self.dashboard_reports.get_mut(from) {
                ids.retain(|id| id != report_id);
            }
        }
        self.dashboard_reports
            .entry(to.to_string())
            .or_default()
            .push(report_id.to_string());
    }
}

/// Recording in-memory implementation of [`DashboardApi`]
#[derive(Default)]
pub struct FakeDashboardService {
    state: RefCell<State>,
}

impl FakeDashboardService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datasource(mut self, id: &str, name: &str) -> Self {
        let doc = Document {
            data: Resource {
                id: id.to_string(),
                kind: Some(json!("datasources")),
                attributes: DatasourceAttributes {
                    name: name.to_string(),
                    other: Map::new(),
                },
                relationships: None,
                extra: Map::new(),
            },
            extra: Map::new(),
        };
        self.state.get_mut().datasources.insert(id.to_string(), doc);
        self
    }

    pub fn with_dashboard(mut self, id: &str, name: &str) -> Self {
        let mut other = Map::new();
        other.insert("description".to_string(), json!(format!("{} dashboard", name)));
        let data = Resource {
            id: id.to_string(),
            kind: Some(json!("dashboards")),
            attributes: DashboardAttributes {
                name: name.to_string(),
                other,
            },
            relationships: Some(Value::Object(Map::new())),
            extra: Map::new(),
        };
        let state = self.state.get_mut();
        state.dashboards.insert(id.to_string(), data);
        state.dashboard_reports.entry(id.to_string()).or_default();
        self
    }

    /// Add a report, appended to its dashboard's report list
    pub fn with_report(
        mut self,
        id: &str,
        dashboard_id: &str,
        datasource_id: &str,
        query: &str,
    ) -> Self {
        self.state.get_mut().insert_report(
            id,
            dashboard_id,
            datasource_id,
            Some(query.to_string()),
        );
        self
    }

    /// Add a report whose query is `null`, such as a text block
    pub fn with_queryless_report(
        mut self,
        id: &str,
        dashboard_id: &str,
        datasource_id: &str,
    ) -> Self {
        self.state
            .get_mut()
            .insert_report(id, dashboard_id, datasource_id, None);
        self
    }

    /// Reject `PUT /reports/{id}` for this report
    pub fn fail_rebind_of(mut self, report_id: &str) -> Self {
        self.state.get_mut().failing_rebinds.insert(report_id.to_string());
        self
    }

    /// Reject `PATCH /reports/{id}` for this report
    pub fn fail_update_of(mut self, report_id: &str) -> Self {
        self.state
            .get_mut()
            .failing_report_updates
            .insert(report_id.to_string());
        self
    }

    /// Use these ids, in order, for the next clones instead of generated ones
    pub fn with_clone_ids(mut self, ids: &[&str]) -> Self {
        self.state
            .get_mut()
            .forced_clone_ids
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    /// Dashboards that received a refresh request, in order
    pub fn refreshes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RequestRefresh(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn report(&self, id: &str) -> Option<ReportDocument> {
        let state = self.state.borrow();
        state.reports.get(id).map(|data| Document {
            data: data.clone(),
            extra: Map::new(),
        })
    }

    pub fn dashboard(&self, id: &str) -> Option<DashboardDocument> {
        self.state.borrow().render_dashboard(id)
    }

    pub fn dashboard_ids(&self) -> Vec<String> {
        self.state.borrow().dashboards.keys().cloned().collect()
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl DashboardApi for FakeDashboardService {
    fn get_dashboard(&self, id: &str) -> Result<DashboardDocument> {
        self.record(Call::GetDashboard(id.to_string()));
        self.state
            .borrow()
            .render_dashboard(id)
            .ok_or_else(|| not_found(ResourceKind::Dashboard, id))
    }

    fn get_datasource(&self, id: &str) -> Result<DatasourceDocument> {
        self.record(Call::GetDatasource(id.to_string()));
        self.state
            .borrow()
            .datasources
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Datasource, id))
    }

    fn get_report(&self, id: &str) -> Result<ReportDocument> {
        self.record(Call::GetReport(id.to_string()));
        self.report(id)
            .ok_or_else(|| not_found(ResourceKind::Report, id))
    }

    fn duplicate_dashboard(&self, id: &str) -> Result<DashboardDocument> {
        self.record(Call::DuplicateDashboard(id.to_string()));
        let mut state = self.state.borrow_mut();

        let source = state.dashboards.get(id).cloned().ok_or_else(|| {
            MigrateError::mutation(format!("POST /dashboards/{}/duplicate", id), 404, "")
        })?;

        state.clones_made += 1;
        let n = state.clones_made;
        let clone_id = state
            .forced_clone_ids
            .pop_front()
            .unwrap_or_else(|| format!("{}-copy{}", id, n));

        if !state.dashboards.contains_key(&clone_id) {
            let mut clone = source;
            clone.id = clone_id.clone();
            state.dashboards.insert(clone_id.clone(), clone);
            state.dashboard_reports.insert(clone_id.clone(), Vec::new());

            let source_reports = state.dashboard_reports.get(id).cloned().unwrap_or_default();
            for report_id in source_reports {
                let Some(mut copy) = state.reports.get(&report_id).cloned() else {
                    continue;
                };
                let copy_id = format!("{}-copy{}", report_id, n);
                copy.id = copy_id.clone();
                copy.set_relationship("dashboard", to_one(&clone_id, "dashboards"));
                state.reports.insert(copy_id.clone(), copy);
                state.move_report(&copy_id, None, &clone_id);
            }
        }

        state
            .render_dashboard(&clone_id)
            .ok_or_else(|| not_found(ResourceKind::Dashboard, &clone_id))
    }

    fn update_dashboard(&self, dashboard: &Resource<DashboardAttributes>) -> Result<()> {
        self.record(Call::UpdateDashboard {
            dashboard_id: dashboard.id.clone(),
            name: dashboard.attributes.name.clone(),
        });
        let mut state = self.state.borrow_mut();
        match state.dashboards.get_mut(&dashboard.id) {
            Some(stored) => {
                *stored = dashboard.clone();
                Ok(())
            }
            None => Err(MigrateError::mutation(
                format!("PATCH /dashboards/{}", dashboard.id),
                404,
                "",
            )),
        }
    }

    fn rebind_report(&self, report_id: &str, request: &RebindRequest<'_>) -> Result<()> {
        let datasource_id = request.data.relationships.datasource.data.id;
        let dashboard_id = request.data.relationships.dashboard.data.id;
        self.record(Call::RebindReport {
            report_id: report_id.to_string(),
            datasource_id: datasource_id.to_string(),
            dashboard_id: dashboard_id.to_string(),
        });

        let call = format!("PUT /reports/{}", report_id);
        let mut state = self.state.borrow_mut();
        if state.failing_rebinds.contains(report_id) {
            return Err(MigrateError::mutation(call, 422, "{\"errors\":[\"rejected\"]}"));
        }
        let Some(report) = state.reports.get_mut(report_id) else {
            return Err(MigrateError::mutation(call, 404, ""));
        };

        let previous = report.related_id("dashboard").map(String::from);
        report.set_relationship("datasource", to_one(datasource_id, "datasources"));
        report.set_relationship("dashboard", to_one(dashboard_id, "dashboards"));
        state.move_report(report_id, previous.as_deref(), dashboard_id);
        Ok(())
    }

    fn update_report(&self, report: &Resource<ReportAttributes>) -> Result<()> {
        self.record(Call::UpdateReport {
            report_id: report.id.clone(),
            query: report.attributes.query.clone().unwrap_or_default(),
        });

        let call = format!("PATCH /reports/{}", report.id);
        let mut state = self.state.borrow_mut();
        if state.failing_report_updates.contains(&report.id) {
            return Err(MigrateError::mutation(call, 422, "{\"errors\":[\"rejected\"]}"));
        }
        match state.reports.get_mut(&report.id) {
            Some(stored) => {
                *stored = report.clone();
                Ok(())
            }
            None => Err(MigrateError::mutation(call, 404, "")),
        }
    }

    fn request_refresh(&self, dashboard_id: &str) {
        self.record(Call::RequestRefresh(dashboard_id.to_string()));
    }
}
