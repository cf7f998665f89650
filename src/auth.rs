//! Sign-in against the dashboard service
//!
//! One `POST /users/sign_in` per run. The returned token is attached as the
//! `token` header on every later call; it is never refreshed.

use crate::api::{normalize_base_url, read_json, transport_error, CallFailure};
use crate::error::{MigrateError, Result};
use crate::resource::{Credentials, SignInRequest, SignInResponse};
use tracing::{debug, info};

/// Bearer token obtained at sign-in
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}

/// Exchanges credentials for a [`Session`]
pub struct SessionAuthenticator<'a> {
    base_url: String,
    agent: &'a ureq::Agent,
}

impl<'a> SessionAuthenticator<'a> {
    pub fn new(base_url: &str, agent: &'a ureq::Agent) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            agent,
        }
    }

    /// Sign in; any non-success status is an [`MigrateError::Auth`]
    pub fn authenticate(&self, user: &str, password: &str) -> Result<Session> {
        let url = format!("{}/users/sign_in", self.base_url);
        let body = SignInRequest {
            user: Credentials {
                email: user,
                password,
            },
        };

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|err| match CallFailure::from_ureq(err) {
                CallFailure::Status { code, .. } => MigrateError::Auth { status: code },
                CallFailure::Transport(message) => transport_error(&self.base_url, message),
            })?;
        debug!(status = response.status(), "sign-in accepted");

        let signed_in: SignInResponse = read_json(&self.base_url, response)?;
        if signed_in.token.is_empty() {
            return Err(MigrateError::Decode(
                "sign-in response contained an empty token".to_string(),
            ));
        }

        info!("Signed in as {}", user);
        Ok(Session::new(signed_in.token))
    }
}
