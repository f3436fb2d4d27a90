//! GitHub credential resolution.
//!
//! Ordered fallback chain: explicit token, `GITHUB_TOKEN`, an authenticated
//! `gh` CLI session, and finally (only when requested) the interactive
//! OAuth flow. Missing credentials are not fatal to the run as a whole;
//! the pipeline degrades to a local-only dry run.

use crate::error::AuthError;
use crate::oauth;
use log::{debug, info};
use std::process::Command;

/// How a credential was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Explicit,
    Environment,
    GhCli,
    Oauth,
}

/// A process-scoped bearer token. Never written to disk.
#[derive(Clone)]
pub struct Credential {
    token: String,
    method: AuthMethod,
}

impl Credential {
    pub fn new(token: String, method: AuthMethod) -> Self {
        Self { token, method }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }
}

// Tokens must not leak through debug logging of surrounding structs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("method", &self.method)
            .finish()
    }
}

/// Resolve a credential, first success wins.
pub fn resolve(explicit_token: Option<&str>, use_oauth: bool) -> Result<Credential, AuthError> {
    if let Some(token) = explicit_token {
        if !token.trim().is_empty() {
            info!("using explicitly provided token");
            return Ok(Credential::new(token.trim().to_string(), AuthMethod::Explicit));
        }
    }

    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        if !token.trim().is_empty() {
            info!("using GITHUB_TOKEN from environment");
            return Ok(Credential::new(token.trim().to_string(), AuthMethod::Environment));
        }
    }

    if let Some(token) = token_from_gh_cli() {
        info!("using GitHub CLI authentication");
        return Ok(Credential::new(token, AuthMethod::GhCli));
    }

    if use_oauth {
        let token = oauth::authenticate()?;
        return Ok(Credential::new(token, AuthMethod::Oauth));
    }

    Err(AuthError::NoCredential)
}

/// Check for an authenticated `gh` session. The status probe matters:
/// an installed but logged-out CLI returns a non-zero `gh auth status`.
fn is_gh_authenticated() -> bool {
    Command::new("gh")
        .args(["auth", "status"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn token_from_gh_cli() -> Option<String> {
    if !is_gh_authenticated() {
        debug!("gh CLI not installed or not authenticated");
        return None;
    }
    let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
