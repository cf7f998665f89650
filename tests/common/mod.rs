//! Local stand-in for the dashboard service, served with tiny_http
//!
//! Routes are plain functions of (method, path, body) returning a status and
//! a JSON body. Every request is recorded for later assertions.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tiny_http::{Header, Response, Server};

pub const TOKEN: &str = "tok-3f9a";
pub const DASHBOARD: &str = "wm73-peg8-y0qv";
pub const DATASOURCE: &str = "6pz0-wr2q-rgdn";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub token: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub struct MockServer {
    server: Arc<Server>,
    addr: SocketAddr,
    log: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start<F>(route: F) -> Self
    where
        F: Fn(&str, &str, &str) -> (u16, String) + Send + 'static,
    {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let addr = server.server_addr().to_ip().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let srv = Arc::clone(&server);
        let seen = Arc::clone(&log);
        let handle = std::thread::spawn(move || {
            for mut request in srv.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let header = |name: &'static str| {
                    request
                        .headers()
                        .iter()
                        .find(|h| h.field.equiv(name))
                        .map(|h| h.value.as_str().to_string())
                };
                let recorded = Recorded {
                    method: request.method().as_str().to_string(),
                    path: request.url().to_string(),
                    token: header("token"),
                    content_type: header("Content-Type"),
                    body,
                };
                let (status, reply) = route(&recorded.method, &recorded.path, &recorded.body);
                seen.lock().unwrap().push(recorded);

                let response = Response::from_string(reply)
                    .with_status_code(status)
                    .with_header(
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .unwrap(),
                    );
                let _ = request.respond(response);
            }
        });

        Self {
            server,
            addr,
            log,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// Requests other than sign-in and GETs
    pub fn writes(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method != "GET" && r.path != "/users/sign_in")
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn ok(body: Value) -> (u16, String) {
    (200, body.to_string())
}

pub fn status(code: u16) -> (u16, String) {
    (code, json!({"errors": [{"status": code.to_string()}]}).to_string())
}

pub fn report_json(id: &str, datasource: &str, query: &str) -> Value {
    json!({
        "data": {
            "id": id,
            "type": "reports",
            "attributes": {
                "query": query,
                "name": format!("Report {}", id),
                "chart_settings": {"type": "bar"}
            },
            "relationships": {
                "datasource": {"data": {"id": datasource, "type": "datasources"}},
                "dashboard": {"data": {"id": DASHBOARD, "type": "dashboards"}}
            }
        }
    })
}

/// The two-report dashboard every scenario starts from
///
/// Writes are accepted except `PUT /reports/r-2`, which fails with `reject_r2`
/// when given.
pub fn dashboard_service(
    reject_r2: Option<u16>,
) -> impl Fn(&str, &str, &str) -> (u16, String) + Send + 'static {
    move |method: &str, path: &str, _body: &str| match (method, path) {
        ("POST", "/users/sign_in") => ok(json!({ "token": TOKEN })),
        ("GET", p) if p == format!("/datasources/{}", DATASOURCE) => ok(json!({
            "data": {"id": DATASOURCE, "type": "datasources", "attributes": {"name": "Cronos warehouse"}}
        })),
        ("GET", p) if p == format!("/dashboards/{}", DASHBOARD) => ok(json!({
            "data": {
                "id": DASHBOARD,
                "type": "dashboards",
                "attributes": {"name": "Standard Overview"},
                "relationships": {"reports": {"data": [
                    {"id": "r-1", "type": "reports"},
                    {"id": "r-2", "type": "reports"}
                ]}}
            }
        })),
        ("GET", "/reports/r-1") => ok(report_json("r-1", "ds-old", "where {{filter_A}}")),
        ("GET", "/reports/r-2") => ok(report_json(
            "r-2",
            "ds-old",
            "{{filter_A}} or {{filter_AB}}",
        )),
        ("PUT", "/reports/r-2") if reject_r2.is_some() => status(reject_r2.unwrap_or(422)),
        ("PUT", _) | ("PATCH", _) => ok(json!({})),
        ("POST", p) if p.ends_with("/refresh") => ok(json!({})),
        _ => status(404),
    }
}
