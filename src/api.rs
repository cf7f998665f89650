//! Dashboard service API
//!
//! [`DashboardApi`] is the seam between the migration logic and the remote
//! service. [`HttpClient`] implements it with blocking `ureq` calls against
//! the REST endpoints; tests substitute an in-memory fake.

use crate::auth::Session;
use crate::config::ServerConfig;
use crate::error::{MigrateError, ResourceKind, Result};
use crate::resource::{
    DashboardAttributes, DashboardDocument, DataEnvelope, DatasourceDocument, RebindRequest,
    ReportAttributes, ReportDocument, Resource,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Calls the migration needs from the dashboard service
pub trait DashboardApi {
    /// `GET /dashboards/{id}`
    fn get_dashboard(&self, id: &str) -> Result<DashboardDocument>;

    /// `GET /datasources/{id}`
    fn get_datasource(&self, id: &str) -> Result<DatasourceDocument>;

    /// `GET /reports/{id}`
    fn get_report(&self, id: &str) -> Result<ReportDocument>;

    /// `POST /dashboards/{id}/duplicate`, returns the clone
    fn duplicate_dashboard(&self, id: &str) -> Result<DashboardDocument>;

    /// `PATCH /dashboards/{id}` with the full resource
    fn update_dashboard(&self, dashboard: &Resource<DashboardAttributes>) -> Result<()>;

    /// `PUT /reports/{id}` with new datasource and dashboard relationships
    fn rebind_report(&self, report_id: &str, request: &RebindRequest<'_>) -> Result<()>;

    /// `PATCH /reports/{id}` with the full resource
    fn update_report(&self, report: &Resource<ReportAttributes>) -> Result<()>;

    /// `POST /dashboards/{id}/refresh`
    ///
    /// Fire-and-forget: implementations must not block on the response and
    /// the outcome never reaches the caller.
    fn request_refresh(&self, dashboard_id: &str);
}

/// Build the shared HTTP agent with the configured timeouts
pub fn build_agent(server: &ServerConfig) -> ureq::Agent {
    let (timeout, connect_timeout) = server.timeouts();
    build_agent_with_timeouts(timeout, connect_timeout)
}

pub fn build_agent_with_timeouts(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .timeout_connect(connect_timeout)
        .build()
}

/// Strip trailing slashes so paths can be appended directly
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// How a single HTTP call failed, before it is given a domain meaning
#[derive(Debug)]
pub(crate) enum CallFailure {
    Status { code: u16, body: String },
    Transport(String),
}

impl CallFailure {
    pub(crate) fn from_ureq(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => CallFailure::Status {
                code,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => CallFailure::Transport(transport.to_string()),
        }
    }

    fn into_lookup_error(self, server: &str, kind: ResourceKind, id: &str) -> MigrateError {
        match self {
            CallFailure::Status { code, .. } => MigrateError::NotFound {
                kind,
                id: id.to_string(),
                status: code,
            },
            CallFailure::Transport(message) => transport_error(server, message),
        }
    }

    fn into_mutation_error(self, server: &str, call: String) -> MigrateError {
        match self {
            CallFailure::Status { code, body } => MigrateError::mutation(call, code, body),
            CallFailure::Transport(message) => transport_error(server, message),
        }
    }
}

pub(crate) fn transport_error(server: &str, message: impl Into<String>) -> MigrateError {
    MigrateError::Transport {
        server: server.to_string(),
        message: message.into(),
    }
}

/// Read and decode a JSON response body
pub(crate) fn read_json<T: DeserializeOwned>(server: &str, response: ureq::Response) -> Result<T> {
    let body = response
        .into_string()
        .map_err(|e| transport_error(server, e.to_string()))?;
    Ok(serde_json::from_str(&body)?)
}

/// Authenticated blocking client for the dashboard service
pub struct HttpClient {
    base_url: String,
    agent: ureq::Agent,
    session: Session,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpClient {
    pub fn new(base_url: &str, agent: ureq::Agent, session: Session) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            agent,
            session,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait for outstanding fire-and-forget requests to finish sending
    ///
    /// Their outcomes are still ignored; this only keeps the process alive
    /// long enough for the requests to leave.
    pub fn wait_for_background(&self) {
        let handles: Vec<JoinHandle<()>> = match self.background.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}{}", self.base_url, path))
            .set("Content-Type", "application/json")
            .set("token", self.session.token())
    }

    fn execute(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> std::result::Result<ureq::Response, CallFailure> {
        let request = self.request(method, path);
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => {
                debug!(method, path, status = response.status(), "request ok");
                Ok(response)
            }
            Err(err) => {
                let failure = CallFailure::from_ureq(err);
                debug!(method, path, failure = ?failure, "request failed");
                Err(failure)
            }
        }
    }

    fn lookup<T: DeserializeOwned>(&self, kind: ResourceKind, path: &str, id: &str) -> Result<T> {
        let response = self
            .execute("GET", path, None)
            .map_err(|f| f.into_lookup_error(&self.base_url, kind, id))?;
        read_json(&self.base_url, response)
    }

    fn write(&self, method: &str, path: &str, body: Value) -> Result<ureq::Response> {
        self.execute(method, path, Some(body))
            .map_err(|f| f.into_mutation_error(&self.base_url, format!("{} {}", method, path)))
    }
}

impl DashboardApi for HttpClient {
    fn get_dashboard(&self, id: &str) -> Result<DashboardDocument> {
        self.lookup(ResourceKind::Dashboard, &format!("/dashboards/{}", id), id)
    }

    fn get_datasource(&self, id: &str) -> Result<DatasourceDocument> {
        self.lookup(ResourceKind::Datasource, &format!("/datasources/{}", id), id)
    }

    fn get_report(&self, id: &str) -> Result<ReportDocument> {
        self.lookup(ResourceKind::Report, &format!("/reports/{}", id), id)
    }

    fn duplicate_dashboard(&self, id: &str) -> Result<DashboardDocument> {
        let path = format!("/dashboards/{}/duplicate", id);
        let response = self
            .execute("POST", &path, None)
            .map_err(|f| f.into_mutation_error(&self.base_url, format!("POST {}", path)))?;
        read_json(&self.base_url, response)
    }

    fn update_dashboard(&self, dashboard: &Resource<DashboardAttributes>) -> Result<()> {
        let body = serde_json::to_value(DataEnvelope { data: dashboard })?;
        self.write("PATCH", &format!("/dashboards/{}", dashboard.id), body)?;
        Ok(())
    }

    fn rebind_report(&self, report_id: &str, request: &RebindRequest<'_>) -> Result<()> {
        let body = serde_json::to_value(request)?;
        self.write("PUT", &format!("/reports/{}", report_id), body)?;
        Ok(())
    }

    fn update_report(&self, report: &Resource<ReportAttributes>) -> Result<()> {
        let body = serde_json::to_value(DataEnvelope { data: report })?;
        self.write("PATCH", &format!("/reports/{}", report.id), body)?;
        Ok(())
    }

    fn request_refresh(&self, dashboard_id: &str) {
        let path = format!("/dashboards/{}/refresh", dashboard_id);
        let request = self.request("POST", &path);
        let handle = std::thread::spawn(move || match request.call() {
            Ok(response) => debug!(path = %path, status = response.status(), "refresh requested"),
            Err(err) => warn!(path = %path, "refresh request failed: {}", err),
        });
        if let Ok(mut pending) = self.background.lock() {
            pending.push(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://api.cluvio.com/"), "https://api.cluvio.com");
        assert_eq!(normalize_base_url("http://localhost:8080//"), "http://localhost:8080");
        assert_eq!(normalize_base_url("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn test_lookup_failure_maps_to_not_found() {
        let failure = CallFailure::Status {
            code: 404,
            body: String::new(),
        };
        let err = failure.into_lookup_error("http://x", ResourceKind::Dashboard, "d-1");
        assert!(matches!(
            err,
            MigrateError::NotFound {
                kind: ResourceKind::Dashboard,
                status: 404,
                ..
            }
        ));
    }

    #[test]
    fn test_write_failure_maps_to_mutation() {
        let failure = CallFailure::Status {
            code: 422,
            body: "{\"errors\":[]}".to_string(),
        };
        let err = failure.into_mutation_error("http://x", "PUT /reports/r-1".to_string());
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("PUT /reports/r-1"));
    }

    #[test]
    fn test_transport_failure_keeps_kind() {
        let failure = CallFailure::Transport("connection refused".to_string());
        let err = failure.into_lookup_error("http://x", ResourceKind::Report, "r-1");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_client_strips_trailing_slash() {
        let agent = build_agent_with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
        let client = HttpClient::new("http://localhost:1/", agent, Session::new("t"));
        assert_eq!(client.base_url(), "http://localhost:1");
    }
}
