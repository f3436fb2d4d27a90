//! GitHub REST API client.
//!
//! Covers exactly the host operations the pipeline needs: authenticated
//! user lookup, fork creation and readiness polling, tag listing and pull
//! request creation/update. Transient failures (network, 5xx) are retried
//! with bounded exponential backoff; 4xx responses fail immediately.

use crate::auth::Credential;
use crate::error::{RepoError, Result, WizardError};
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const API_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("ce-lib-wizard/", env!("CARGO_PKG_VERSION"));

/// Transient retry policy: 3 attempts, base 500ms, doubling.
const TRANSIENT_ATTEMPTS: u32 = 3;
const TRANSIENT_BASE: Duration = Duration::from_millis(500);

/// Fork readiness polling: 5 attempts, base 1s, doubling.
const FORK_POLL_ATTEMPTS: u32 = 5;
const FORK_POLL_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct ApiUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiRepo {
    pub full_name: String,
    pub default_branch: String,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPullRequest {
    pub number: u64,
    pub html_url: String,
}

pub struct GithubClient {
    http: Client,
    token: String,
}

impl GithubClient {
    pub fn new(credential: &Credential) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            token: credential.token().to_string(),
        })
    }

    /// Login of the user the token belongs to; fork owner and PR head.
    pub fn authenticated_user(&self) -> Result<ApiUser> {
        self.get_json(&format!("{}/user", API_ROOT))
    }

    /// Repository metadata, or None on 404.
    pub fn get_repo(&self, full_name: &str) -> Result<Option<ApiRepo>> {
        let url = format!("{}/repos/{}", API_ROOT, full_name);
        match self.get_json::<ApiRepo>(&url) {
            Ok(repo) => Ok(Some(repo)),
            Err(WizardError::Api(msg)) if msg.starts_with("404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ensure the authenticated user has a fork of `upstream`, creating one
    /// if needed and polling until the host reports it ready. Forks are
    /// created asynchronously on the host side, so creation is followed by
    /// a bounded backoff poll.
    pub fn ensure_fork(&self, upstream: &str, username: &str) -> Result<ApiRepo> {
        let repo_name = upstream.split('/').nth(1).unwrap_or(upstream);
        let fork_full_name = format!("{}/{}", username, repo_name);

        if let Some(existing) = self.get_repo(&fork_full_name)? {
            debug!("using existing fork {}", existing.full_name);
            return Ok(existing);
        }

        debug!("creating fork of {}", upstream);
        let url = format!("{}/repos/{}/forks", API_ROOT, upstream);
        let response = self.with_transient_retries(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .send()
        })?;
        match response.status() {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(RepoError::Forbidden(upstream.to_string()).into());
            }
            s if !s.is_success() && s != StatusCode::ACCEPTED => {
                return Err(WizardError::Api(format!(
                    "{} creating fork of {}",
                    s.as_u16(),
                    upstream
                )));
            }
            _ => {}
        }

        // Poll until the fork is clonable.
        let mut delay = FORK_POLL_BASE;
        for attempt in 1..=FORK_POLL_ATTEMPTS {
            std::thread::sleep(delay);
            if let Some(fork) = self.get_repo(&fork_full_name)? {
                return Ok(fork);
            }
            warn!(
                "fork of {} not ready (attempt {}/{})",
                upstream, attempt, FORK_POLL_ATTEMPTS
            );
            delay *= 2;
        }

        Err(RepoError::ForkTimeout(upstream.to_string()).into())
    }

    /// All tag names of a repository, paginated.
    pub fn list_tags(&self, full_name: &str) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        for page in 1..=10 {
            let url = format!(
                "{}/repos/{}/tags?per_page=100&page={}",
                API_ROOT, full_name, page
            );
            let batch: Vec<ApiTag> = self.get_json(&url)?;
            let done = batch.len() < 100;
            tags.extend(batch.into_iter().map(|t| t.name));
            if done {
                break;
            }
        }
        Ok(tags)
    }

    /// Open a PR on `upstream` from `head` (user:branch) to `base`.
    pub fn create_pull_request(
        &self,
        upstream: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<ApiPullRequest> {
        let url = format!("{}/repos/{}/pulls", API_ROOT, upstream);
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
        });
        let response = self.with_transient_retries(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .json(&payload)
                .send()
        })?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(WizardError::Api(format!(
                "{} creating PR on {}: {}",
                status.as_u16(),
                upstream,
                detail
            )));
        }
        Ok(response.json()?)
    }

    /// Edit an existing PR's body (used to backfill the cross-link).
    pub fn update_pull_request_body(
        &self,
        upstream: &str,
        number: u64,
        body: &str,
    ) -> Result<()> {
        let url = format!("{}/repos/{}/pulls/{}", API_ROOT, upstream, number);
        let payload = json!({ "body": body });
        let response = self.with_transient_retries(|| {
            self.http
                .patch(&url)
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .json(&payload)
                .send()
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(WizardError::Api(format!(
                "{} updating PR #{} on {}",
                status.as_u16(),
                number,
                upstream
            )));
        }
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.with_transient_retries(|| {
            self.http
                .get(url)
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .send()
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(WizardError::Api(format!("{} from {}", status.as_u16(), url)));
        }
        Ok(response.json()?)
    }

    /// Retry `send` on network errors and 5xx responses with exponential
    /// backoff. 4xx responses are returned to the caller unretried.
    fn with_transient_retries<F>(&self, mut send: F) -> Result<reqwest::blocking::Response>
    where
        F: FnMut() -> reqwest::Result<reqwest::blocking::Response>,
    {
        let mut delay = TRANSIENT_BASE;
        let mut last_err: Option<WizardError> = None;

        for attempt in 1..=TRANSIENT_ATTEMPTS {
            match send() {
                Ok(response) if response.status().is_server_error() => {
                    warn!(
                        "server error {} (attempt {}/{})",
                        response.status(),
                        attempt,
                        TRANSIENT_ATTEMPTS
                    );
                    last_err = Some(WizardError::Api(format!(
                        "{} after {} attempts",
                        response.status().as_u16(),
                        attempt
                    )));
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("request error (attempt {}/{}): {}", attempt, TRANSIENT_ATTEMPTS, e);
                    last_err = Some(e.into());
                }
            }
            if attempt < TRANSIENT_ATTEMPTS {
                std::thread::sleep(delay);
                delay *= 2;
            }
        }

        Err(last_err.unwrap_or_else(|| WizardError::Api("request failed".into())))
    }
}
