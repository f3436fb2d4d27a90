//! Temp workspace and two-repository synchronization.
//!
//! The workspace is an explicitly passed context object owning the
//! temporary directory both clones live in; it cleans up on every exit
//! path via its `Drop` unless the keep flag is set. Repository sync runs
//! the two independent targets (main catalog repo, infra repo) in
//! parallel and joins before the pipeline proceeds.

use crate::auth::Credential;
use crate::error::{RepoError, Result, WizardError};
use crate::gitcmd;
use crate::github::{ApiRepo, GithubClient};
use crate::model::{ChangeUnit, RepoRole};
use log::{info, warn};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scoped working area for one run.
pub struct Workspace {
    /// Present while cleanup is armed; `keep()` disarms by leaking the
    /// TempDir into a plain path.
    temp: Option<TempDir>,
    root: PathBuf,
}

impl Workspace {
    pub fn create(keep: bool) -> Result<Self> {
        let temp = TempDir::with_prefix("ce-lib-wizard-")?;
        let root = temp.path().to_path_buf();
        info!("workspace at {}", root.display());
        if keep {
            // Disarm cleanup: the directory outlives the run for inspection.
            let kept = temp.keep();
            warn!("keeping temporary directory {}", kept.display());
            Ok(Self { temp: None, root: kept })
        } else {
            Ok(Self { temp: Some(temp), root })
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_kept(&self) -> bool {
        self.temp.is_none()
    }
}

/// One repository's working copy, fork information and current branch.
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    pub role: RepoRole,
    pub path: PathBuf,
    /// Fork full name (owner/name) when pushing through a fork.
    pub fork: Option<String>,
    pub base_branch: String,
    /// Branch currently checked out for the active unit.
    pub branch: Option<String>,
}

impl RepositoryHandle {
    /// Whether commits can be pushed anywhere.
    pub fn pushable(&self) -> bool {
        self.fork.is_some()
    }
}

/// Synchronizes the two target repositories into a workspace.
pub struct RepoSync<'a> {
    workspace: &'a Workspace,
    client: Option<&'a GithubClient>,
    credential: Option<&'a Credential>,
    username: Option<String>,
}

impl<'a> RepoSync<'a> {
    pub fn new(
        workspace: &'a Workspace,
        client: Option<&'a GithubClient>,
        credential: Option<&'a Credential>,
    ) -> Result<Self> {
        let username = match client {
            Some(c) => Some(c.authenticated_user()?.login),
            None => None,
        };
        Ok(Self {
            workspace,
            client,
            credential,
            username,
        })
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Sync both repositories, in parallel, and return their handles.
    /// The two targets are independent so exactly two concurrent tasks run.
    pub fn sync_pair(&self) -> Result<(RepositoryHandle, RepositoryHandle)> {
        let (main, infra) = std::thread::scope(|scope| {
            let main = scope.spawn(|| self.ensure(RepoRole::Main));
            let infra = scope.spawn(|| self.ensure(RepoRole::Infra));
            (join_sync(main), join_sync(infra))
        });
        Ok((main?, infra?))
    }

    /// Ensure one repository is cloned and up to date.
    ///
    /// With a credential: the user's fork is found or lazily created,
    /// cloned shallowly, and wired with an authenticated push URL plus an
    /// `upstream` remote. Without: the upstream itself is cloned read-only.
    pub fn ensure(&self, role: RepoRole) -> Result<RepositoryHandle> {
        let path = self.workspace.root().join(role.dir_name());
        let upstream = role.upstream();
        let upstream_url = format!("https://github.com/{}.git", upstream);

        let (clone_url, fork) = match (self.client, self.username.as_deref()) {
            (Some(client), Some(username)) => {
                let fork = client.ensure_fork(upstream, username)?;
                let url = format!("https://github.com/{}.git", fork.full_name);
                (url, Some(fork.full_name))
            }
            _ => (upstream_url.clone(), None),
        };

        // PRs target the upstream's default branch, whatever it is named;
        // the fork's own default is irrelevant.
        let base_branch = match self.client {
            Some(client) => base_branch_of(client.get_repo(upstream)?),
            None => base_branch_of(None),
        };

        if !path.exists() {
            info!("cloning {} into {}", clone_url, path.display());
            gitcmd::clone_shallow(&clone_url, &path, &base_branch).map_err(|e| {
                sync_failed(upstream, e)
            })?;
            gitcmd::add_remote(&path, "upstream", &upstream_url)
                .map_err(|e| sync_failed(upstream, e))?;
            if let (Some(cred), Some(_)) = (self.credential, &fork) {
                gitcmd::set_authenticated_remote(&path, "origin", cred.token())
                    .map_err(|e| sync_failed(upstream, e))?;
            }
        }

        gitcmd::fetch(&path, "upstream", &base_branch).map_err(|e| sync_failed(upstream, e))?;

        Ok(RepositoryHandle {
            role,
            path,
            fork,
            base_branch,
            branch: None,
        })
    }

    /// Check out the unit's deterministic branch, reset onto the upstream
    /// base tip. A leftover branch from a prior partial run is discarded
    /// rather than merged, so every run starts from a clean linear base.
    pub fn prepare_branch(&self, handle: &mut RepositoryHandle, unit: &ChangeUnit) -> Result<()> {
        let branch = unit.branch_name(handle.role);
        let upstream = handle.role.upstream();

        gitcmd::fetch(&handle.path, "upstream", &handle.base_branch)
            .map_err(|e| sync_failed(upstream, e))?;

        if handle.pushable() {
            // Refresh the remote-tracking ref so a later push-with-lease
            // compares against current remote state.
            match gitcmd::remote_branch_exists(&handle.path, "origin", &branch) {
                Ok(true) => info!("branch {} exists on fork, resetting to base", branch),
                Ok(false) => {}
                Err(e) => warn!("could not probe origin/{}: {}", branch, e),
            }
        }

        let base = format!("upstream/{}", handle.base_branch);
        gitcmd::checkout_reset(&handle.path, &branch, &base)
            .map_err(|e| sync_failed(upstream, e))?;

        handle.branch = Some(branch);
        Ok(())
    }
}

fn base_branch_of(upstream_meta: Option<ApiRepo>) -> String {
    upstream_meta
        .map(|repo| repo.default_branch)
        .unwrap_or_else(|| "main".to_string())
}

fn join_sync(
    handle: std::thread::ScopedJoinHandle<'_, Result<RepositoryHandle>>,
) -> Result<RepositoryHandle> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(WizardError::Git("repository sync task panicked".into())),
    }
}

fn sync_failed(repo: &str, err: WizardError) -> WizardError {
    match err {
        e @ WizardError::Repo(_) => e,
        other => RepoError::SyncFailed {
            repo: repo.to_string(),
            reason: other.to_string(),
        }
        .into(),
    }
}
