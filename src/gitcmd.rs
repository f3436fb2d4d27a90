//! Git porcelain wrappers.
//!
//! All version-control operations are invoked as subprocesses with captured
//! stdout/stderr; callers get either trimmed stdout or a `WizardError::Git`
//! carrying stderr.

use crate::error::{Result, WizardError};
use log::debug;
use std::path::Path;
use std::process::Command;

/// Run a git command in `cwd`, returning trimmed stdout on success.
pub fn run_git(cwd: &Path, args: &[&str]) -> Result<String> {
    debug!("git {} (in {})", args.join(" "), cwd.display());
    let output = Command::new("git").args(args).current_dir(cwd).output()?;

    if !output.status.success() {
        return Err(WizardError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a git command where a non-zero exit is an expected answer, not an
/// error (e.g. `diff --cached --quiet`). Returns the success flag.
pub fn run_git_status(cwd: &Path, args: &[&str]) -> Result<bool> {
    debug!("git {} (in {})", args.join(" "), cwd.display());
    let output = Command::new("git").args(args).current_dir(cwd).output()?;
    Ok(output.status.success())
}

/// Shallow, single-branch clone of `url` into `dest`.
pub fn clone_shallow(url: &str, dest: &Path, branch: &str) -> Result<()> {
    debug!("cloning {} (branch {}) into {}", url, branch, dest.display());
    let output = Command::new("git")
        .args([
            "clone",
            "--depth",
            "1",
            "--branch",
            branch,
            "--single-branch",
            url,
            &dest.to_string_lossy(),
        ])
        .output()?;

    if !output.status.success() {
        return Err(WizardError::Git(format!(
            "clone of {} failed: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Shallow clone of whatever the remote's default branch is. Used for
/// probing a library's own checkout, where the branch name is unknown.
pub fn clone_shallow_default(url: &str, dest: &Path) -> Result<()> {
    debug!("cloning {} (default branch) into {}", url, dest.display());
    let output = Command::new("git")
        .args(["clone", "--depth", "1", url, &dest.to_string_lossy()])
        .output()?;

    if !output.status.success() {
        return Err(WizardError::Git(format!(
            "clone of {} failed: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

pub fn add_remote(cwd: &Path, name: &str, url: &str) -> Result<()> {
    run_git(cwd, &["remote", "add", name, url])?;
    Ok(())
}

pub fn fetch(cwd: &Path, remote: &str, refspec: &str) -> Result<()> {
    run_git(cwd, &["fetch", "--depth", "1", remote, refspec])?;
    Ok(())
}

/// Whether `remote/branch` resolves after a fetch attempt.
///
/// Single-branch clones only configure a refspec for the base branch, so
/// the fetch names the remote-tracking ref explicitly. Without it the
/// branch lands in FETCH_HEAD only and a later `push --force-with-lease`
/// has no remote state to compare against, rejecting every rerun push.
pub fn remote_branch_exists(cwd: &Path, remote: &str, branch: &str) -> Result<bool> {
    let refspec = format!("+refs/heads/{branch}:refs/remotes/{remote}/{branch}");
    if !run_git_status(cwd, &["fetch", "--depth", "1", remote, &refspec])? {
        return Ok(false);
    }
    run_git_status(
        cwd,
        &["rev-parse", "--verify", "--quiet", &format!("{}/{}", remote, branch)],
    )
}

/// Create-or-reset `branch` at `start_point` and check it out.
///
/// `checkout -B` gives the reset-to-base semantics: an existing branch from
/// a prior partial run is discarded, never merged.
pub fn checkout_reset(cwd: &Path, branch: &str, start_point: &str) -> Result<()> {
    run_git(cwd, &["checkout", "-B", branch, start_point])?;
    Ok(())
}

/// Stage modified tracked files only. Untracked stray files (tool caches,
/// virtualenvs) must never end up in the commit.
pub fn stage_tracked(cwd: &Path) -> Result<()> {
    run_git(cwd, &["add", "-u"])?;
    Ok(())
}

/// True when the staging area matches HEAD (nothing to commit).
pub fn staged_is_empty(cwd: &Path) -> Result<bool> {
    run_git_status(cwd, &["diff", "--cached", "--quiet"])
}

/// Combined staged + unstaged diff of tracked files.
pub fn working_diff(cwd: &Path) -> Result<String> {
    let staged = run_git(cwd, &["diff", "--cached"])?;
    let unstaged = run_git(cwd, &["diff"])?;
    if staged.is_empty() {
        Ok(unstaged)
    } else if unstaged.is_empty() {
        Ok(staged)
    } else {
        Ok(format!("{}\n{}", staged, unstaged))
    }
}

pub fn commit(cwd: &Path, message: &str) -> Result<()> {
    run_git(cwd, &["commit", "-m", message])?;
    Ok(())
}

pub fn head_sha(cwd: &Path) -> Result<String> {
    run_git(cwd, &["rev-parse", "HEAD"])
}

/// Push `branch` to `remote` with lease semantics: the remote branch is only
/// overwritten if it still matches the last-fetched state.
pub fn push_with_lease(cwd: &Path, remote: &str, branch: &str) -> Result<()> {
    run_git(
        cwd,
        &[
            "push",
            "--force-with-lease",
            remote,
            &format!("{}:{}", branch, branch),
        ],
    )?;
    Ok(())
}

/// Rewrite an https remote URL to carry the token for pushing.
pub fn set_authenticated_remote(cwd: &Path, remote: &str, token: &str) -> Result<()> {
    let url = run_git(cwd, &["remote", "get-url", remote])?;
    if let Some(rest) = url.strip_prefix("https://") {
        let auth_url = format!("https://{}@{}", token, rest);
        run_git(cwd, &["remote", "set-url", remote, &auth_url])?;
    }
    Ok(())
}

/// `git ls-remote --tags` against an arbitrary URL; generic tag source for
/// hosts the API client does not recognize.
pub fn ls_remote_tags(url: &str) -> Result<Vec<String>> {
    let output = Command::new("git")
        .args(["ls-remote", "--tags", "--refs", url])
        .output()?;

    if !output.status.success() {
        return Err(WizardError::Git(format!(
            "ls-remote of {} failed: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .filter_map(|r| r.strip_prefix("refs/tags/"))
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            assert!(Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap()
                .status
                .success());
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        dir
    }

    #[test]
    fn test_run_git_captures_stdout() {
        // `branch --show-current` works on an unborn branch; rev-parse of
        // HEAD would not until the first commit exists.
        let repo = init_repo();
        let branch = run_git(repo.path(), &["branch", "--show-current"]).unwrap();
        assert_eq!(branch, "main");
    }

    #[test]
    fn test_run_git_surfaces_stderr_on_failure() {
        let repo = init_repo();
        let err = run_git(repo.path(), &["rev-parse", "--verify", "nonexistent"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rev-parse"), "unexpected message: {}", msg);
    }

    #[test]
    fn test_staged_is_empty_reflects_staging_area() {
        let repo = init_repo();
        std::fs::write(repo.path().join("file.txt"), "one\n").unwrap();
        run_git(repo.path(), &["add", "file.txt"]).unwrap();
        assert!(!staged_is_empty(repo.path()).unwrap());
        commit(repo.path(), "initial").unwrap();
        assert!(staged_is_empty(repo.path()).unwrap());
    }

    #[test]
    fn test_stage_tracked_ignores_untracked() {
        let repo = init_repo();
        std::fs::write(repo.path().join("tracked.txt"), "one\n").unwrap();
        run_git(repo.path(), &["add", "tracked.txt"]).unwrap();
        commit(repo.path(), "initial").unwrap();

        // A modification plus an untracked stray file
        std::fs::write(repo.path().join("tracked.txt"), "two\n").unwrap();
        std::fs::write(repo.path().join("stray.log"), "noise\n").unwrap();
        stage_tracked(repo.path()).unwrap();

        assert!(!staged_is_empty(repo.path()).unwrap());
        let staged = run_git(repo.path(), &["diff", "--cached", "--name-only"]).unwrap();
        assert!(staged.contains("tracked.txt"));
        assert!(!staged.contains("stray.log"));
    }

    #[test]
    fn test_checkout_reset_resets_existing_branch() {
        let repo = init_repo();
        std::fs::write(repo.path().join("file.txt"), "base\n").unwrap();
        run_git(repo.path(), &["add", "file.txt"]).unwrap();
        commit(repo.path(), "base").unwrap();
        let base = head_sha(repo.path()).unwrap();

        // Branch with an extra commit
        checkout_reset(repo.path(), "feature", "main").unwrap();
        std::fs::write(repo.path().join("file.txt"), "extra\n").unwrap();
        stage_tracked(repo.path()).unwrap();
        commit(repo.path(), "extra").unwrap();
        assert_ne!(head_sha(repo.path()).unwrap(), base);

        // Reset back onto main's tip discards the extra commit
        checkout_reset(repo.path(), "feature", "main").unwrap();
        assert_eq!(head_sha(repo.path()).unwrap(), base);
    }

    #[test]
    fn test_working_diff_combines_staged_and_unstaged() {
        let repo = init_repo();
        std::fs::write(repo.path().join("a.txt"), "a\n").unwrap();
        std::fs::write(repo.path().join("b.txt"), "b\n").unwrap();
        run_git(repo.path(), &["add", "."]).unwrap();
        commit(repo.path(), "initial").unwrap();

        std::fs::write(repo.path().join("a.txt"), "a2\n").unwrap();
        run_git(repo.path(), &["add", "a.txt"]).unwrap();
        std::fs::write(repo.path().join("b.txt"), "b2\n").unwrap();

        let diff = working_diff(repo.path()).unwrap();
        assert!(diff.contains("a.txt"));
        assert!(diff.contains("b.txt"));
    }
}
