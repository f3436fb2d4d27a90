//! Commit-and-push stage for one repository.
//!
//! Only tracked modifications are staged; an empty staging area is a
//! first-class outcome (the change is already present upstream), not an
//! error. Pushes use lease semantics against the branch state fetched
//! during sync.

use crate::error::Result;
use crate::gitcmd;
use crate::model::ChangeUnit;
use crate::workspace::RepositoryHandle;
use log::{info, warn};

/// What happened when a repository's changes were committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The working copy matched the base: nothing to commit.
    NoOp,
    /// A commit was created (and pushed, unless dry-run or unpushable).
    Committed { sha: String, pushed: bool },
}

impl CommitOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, CommitOutcome::NoOp)
    }
}

pub struct ChangeCommitter {
    dry_run: bool,
}

impl ChangeCommitter {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Stage, commit and push the unit's changes in one repository.
    ///
    /// Dry-run stops before committing and prints the accumulated diff so
    /// the operator can inspect exactly what a real run would publish.
    pub fn commit_and_push(
        &self,
        handle: &RepositoryHandle,
        unit: &ChangeUnit,
    ) -> Result<CommitOutcome> {
        gitcmd::stage_tracked(&handle.path)?;

        if gitcmd::staged_is_empty(&handle.path)? {
            info!(
                "{}: no changes for {}, already present",
                handle.role.slug(),
                unit.display_name()
            );
            return Ok(CommitOutcome::NoOp);
        }

        if self.dry_run {
            let diff = gitcmd::working_diff(&handle.path)?;
            println!(
                "--- dry run: {} changes for {} ---\n{}",
                handle.role.slug(),
                unit.display_name(),
                diff
            );
            // Report as a no-op so no PR stage runs against it.
            return Ok(CommitOutcome::NoOp);
        }

        gitcmd::commit(&handle.path, &unit.commit_message())?;
        let sha = gitcmd::head_sha(&handle.path)?;
        info!("{}: committed {}", handle.role.slug(), &sha[..sha.len().min(12)]);

        let pushed = if handle.pushable() {
            let branch = handle
                .branch
                .as_deref()
                .ok_or_else(|| crate::error::WizardError::Git("no branch prepared".into()))?;
            gitcmd::push_with_lease(&handle.path, "origin", branch)?;
            info!("{}: pushed {} to fork", handle.role.slug(), branch);
            true
        } else {
            warn!(
                "{}: no fork to push to, commit stays local",
                handle.role.slug()
            );
            false
        };

        Ok(CommitOutcome::Committed { sha, pushed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Language, LibrarySource, RepoRole};
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn run(cwd: &Path, args: &[&str]) {
        assert!(Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .unwrap()
            .status
            .success());
    }

    fn repo_with_file(dir: &Path) {
        run(dir, &["init", "-b", "main"]);
        run(dir, &["config", "user.email", "test@example.com"]);
        run(dir, &["config", "user.name", "Test"]);
        std::fs::write(dir.join("catalog.txt"), "libs=old\n").unwrap();
        run(dir, &["add", "catalog.txt"]);
        run(dir, &["commit", "-m", "initial"]);
    }

    fn handle(path: &Path) -> RepositoryHandle {
        RepositoryHandle {
            role: RepoRole::Infra,
            path: path.to_path_buf(),
            fork: None,
            base_branch: "main".into(),
            branch: Some("add-rust-serde-1-0-195-infra".into()),
        }
    }

    fn unit() -> ChangeUnit {
        ChangeUnit::new(
            Language::Rust,
            LibrarySource::Name("serde".into()),
            "1.0.195",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_clean_tree_is_noop() {
        let dir = TempDir::new().unwrap();
        repo_with_file(dir.path());

        let outcome = ChangeCommitter::new(false)
            .commit_and_push(&handle(dir.path()), &unit())
            .unwrap();
        assert_eq!(outcome, CommitOutcome::NoOp);
    }

    #[test]
    fn test_modified_tree_commits_with_unit_message() {
        let dir = TempDir::new().unwrap();
        repo_with_file(dir.path());
        std::fs::write(dir.path().join("catalog.txt"), "libs=old:serde\n").unwrap();

        let outcome = ChangeCommitter::new(false)
            .commit_and_push(&handle(dir.path()), &unit())
            .unwrap();
        match outcome {
            CommitOutcome::Committed { sha, pushed } => {
                assert_eq!(sha.len(), 40);
                // No fork configured, so the commit stays local.
                assert!(!pushed);
            }
            other => panic!("expected a commit, got {:?}", other),
        }

        let message = gitcmd::run_git(dir.path(), &["log", "-1", "--format=%s"]).unwrap();
        assert_eq!(message, "Add Rust library serde 1.0.195");
    }

    #[test]
    fn test_dry_run_commits_nothing() {
        let dir = TempDir::new().unwrap();
        repo_with_file(dir.path());
        std::fs::write(dir.path().join("catalog.txt"), "libs=old:serde\n").unwrap();
        let before = gitcmd::head_sha(dir.path()).unwrap();

        let outcome = ChangeCommitter::new(true)
            .commit_and_push(&handle(dir.path()), &unit())
            .unwrap();
        assert!(outcome.is_noop());
        assert_eq!(gitcmd::head_sha(dir.path()).unwrap(), before);
    }

    #[test]
    fn test_untracked_files_do_not_trigger_commit() {
        let dir = TempDir::new().unwrap();
        repo_with_file(dir.path());
        std::fs::write(dir.path().join("scratch.log"), "noise\n").unwrap();

        let outcome = ChangeCommitter::new(false)
            .commit_and_push(&handle(dir.path()), &unit())
            .unwrap();
        assert_eq!(outcome, CommitOutcome::NoOp);
    }
}
