//! Error type shared by every migration step
//!
//! Every failure is fatal for the run in progress. Nothing is retried and
//! nothing already written to the service is rolled back, so each variant
//! carries enough context for an operator to inspect the remote state.

use thiserror::Error;

/// Kind of remote resource a lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Dashboard,
    Datasource,
    Report,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Dashboard => write!(f, "Dashboard"),
            ResourceKind::Datasource => write!(f, "Datasource"),
            ResourceKind::Report => write!(f, "Report"),
        }
    }
}

/// Error type for migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The service rejected the credentials
    #[error("Login failed (HTTP {status})")]
    Auth { status: u16 },

    /// A dashboard, datasource or report lookup was unsuccessful
    #[error("{kind} {id} not found (HTTP {status})")]
    NotFound {
        kind: ResourceKind,
        id: String,
        status: u16,
    },

    /// Connection refused, DNS failure, timeout
    #[error("Error connecting to server {server}: {message}")]
    Transport { server: String, message: String },

    /// A response body could not be understood
    #[error("Error parsing json body from response: {0}")]
    Decode(String),

    /// A write call was rejected by the service
    #[error("{call} was rejected (HTTP {status}): {body}")]
    Mutation {
        call: String,
        status: u16,
        body: String,
    },

    /// The service returned a clone whose id is already in use this run
    #[error("Duplicating dashboard {source_id} returned id {clone_id}, which is not a new dashboard")]
    CloneConflict { source_id: String, clone_id: String },

    /// Configuration file missing, malformed or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Arguments that parse but cannot be acted on
    #[error("{0}")]
    InvalidInput(String),
}

impl MigrateError {
    /// Process exit status an operator sees for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrateError::InvalidInput(_) | MigrateError::Config(_) | MigrateError::Decode(_) => 1,
            MigrateError::Auth { .. } | MigrateError::NotFound { .. } => 2,
            MigrateError::Transport { .. } => 3,
            MigrateError::Mutation { .. } | MigrateError::CloneConflict { .. } => 4,
        }
    }

    pub(crate) fn mutation(call: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        MigrateError::Mutation {
            call: call.into(),
            status,
            body: body.into(),
        }
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(e: serde_json::Error) -> Self {
        MigrateError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::Decode("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::Auth { status: 401 }.exit_code(), 2);
        assert_eq!(
            MigrateError::NotFound {
                kind: ResourceKind::Report,
                id: "r1".into(),
                status: 404
            }
            .exit_code(),
            2
        );
        assert_eq!(
            MigrateError::Transport {
                server: "http://localhost".into(),
                message: "refused".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(MigrateError::mutation("PUT /reports/r1", 422, "").exit_code(), 4);
        assert_eq!(
            MigrateError::CloneConflict {
                source_id: "d".into(),
                clone_id: "d".into()
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = MigrateError::NotFound {
            kind: ResourceKind::Datasource,
            id: "6pz0-wr2q-rgdn".into(),
            status: 404,
        };
        assert_eq!(err.to_string(), "Datasource 6pz0-wr2q-rgdn not found (HTTP 404)");
    }

    #[test]
    fn test_json_error_is_decode() {
        let err: MigrateError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, MigrateError::Decode(_)));
    }
}
