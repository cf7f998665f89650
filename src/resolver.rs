//! Fetches and validates dashboards, datasources and reports by id
//!
//! Read-only; nothing is cached between calls.

use crate::api::DashboardApi;
use crate::error::Result;
use crate::resource::{Dashboard, Datasource, Report};
use tracing::info;

pub struct ResourceResolver<'a, S: DashboardApi + ?Sized> {
    api: &'a S,
}

impl<'a, S: DashboardApi + ?Sized> ResourceResolver<'a, S> {
    pub fn new(api: &'a S) -> Self {
        Self { api }
    }

    /// Dashboard with its ordered report ids
    pub fn resolve_dashboard(&self, id: &str) -> Result<Dashboard> {
        Dashboard::from_document(self.api.get_dashboard(id)?)
    }

    pub fn resolve_datasource(&self, id: &str) -> Result<Datasource> {
        Ok(Datasource::from(self.api.get_datasource(id)?))
    }

    /// Full report representation, for read-modify-write
    pub fn resolve_report(&self, id: &str) -> Result<Report> {
        Ok(Report {
            document: self.api.get_report(id)?,
        })
    }

    /// Resolve a datasource and log it the way operators expect
    pub fn check_datasource(&self, id: &str) -> Result<Datasource> {
        let datasource = self.resolve_datasource(id)?;
        info!("Checking datasource... OK, name: {}", datasource.name);
        Ok(datasource)
    }

    /// Resolve a dashboard and log it the way operators expect
    pub fn check_dashboard(&self, id: &str) -> Result<Dashboard> {
        let dashboard = self.resolve_dashboard(id)?;
        info!("Checking dashboard... OK, name: {}", dashboard.name());
        Ok(dashboard)
    }
}
