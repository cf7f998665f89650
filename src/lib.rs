//! Dashboard Migrator - bulk maintenance for a hosted dashboard service
//!
//! Rebind a dashboard's reports to another datasource, rewrite filter tokens
//! in report queries, and clone dashboards per customer.
//!
//! # Overview
//!
//! Every run follows the same path: sign in, check that the referenced
//! resources exist, ask the operator to confirm, then walk the dashboard's
//! reports in server order and write each one. The first failed write stops
//! the run; nothing already written is rolled back.
//!
//! | Flow | Per report |
//! |------|------------|
//! | `move` | rebind datasource |
//! | `migrate` | rebind datasource, rewrite `filter_<from>` to `filter_<to>` |
//! | `duplicate` | on each clone: rebind to customer datasource, rewrite source filter to customer key |
//!
//! # Quick Start
//!
//! ```no_run
//! use dashboard_migrator::{
//!     api, migrate, ConfirmationGate, Config, HttpClient, MigrationPlan, SessionAuthenticator,
//! };
//!
//! # fn main() -> dashboard_migrator::Result<()> {
//! let config = Config::resolve(None)?;
//! let agent = api::build_agent(&config.server);
//! let base = api::normalize_base_url(&config.server.url);
//!
//! let session = SessionAuthenticator::new(&base, &agent).authenticate("ops@example.com", "secret")?;
//! let client = HttpClient::new(&base, agent, session);
//!
//! let mut gate = ConfirmationGate::interactive();
//! let plan = MigrationPlan::move_to("wm73-peg8-y0qv", "6pz0-wr2q-rgdn");
//! let outcome = migrate::run(&client, &mut gate, &plan)?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod confirm;
pub mod error;
pub mod fanout;
pub mod migrate;
pub mod mutator;
pub mod resolver;
pub mod resource;
pub mod testing;
pub mod walker;

pub use api::{DashboardApi, HttpClient};
pub use auth::{Session, SessionAuthenticator};
pub use config::{Config, CustomerTarget};
pub use confirm::{Approver, ConfirmationGate, Decision};
pub use error::{MigrateError, ResourceKind, Result};
pub use fanout::{CloneRecord, DuplicationPlan, FanOutOutcome};
pub use migrate::{MigrationPlan, MigrationSummary, Outcome};
pub use mutator::{FilterRewrite, ReportStep, RewriteMode, StepFailure};
pub use resource::{Dashboard, Datasource, Report};
