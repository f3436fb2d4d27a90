//! Bridge to the external `ce_install` catalog tool.
//!
//! The tool is a black box: it gets a working directory (the synced infra
//! clone) and a subcommand, and either exits zero with the catalog files
//! mutated in place or exits non-zero. This module is the only place in the
//! core that shells out to it.

use crate::error::ToolError;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ToolOutput {
    /// stdout and stderr combined, for diagnostics.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        if !self.stderr.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

/// Handle to a bootstrapped ce_install inside one infra working copy.
#[derive(Debug, Clone)]
pub struct CeInstall {
    infra_path: PathBuf,
}

impl CeInstall {
    /// Bootstrap the tool in the given infra clone by running `make ce`.
    /// The bootstrap is idempotent, so reuse across units is safe.
    pub fn bootstrap(infra_path: &Path) -> Result<Self, ToolError> {
        info!("bootstrapping ce_install in {}", infra_path.display());
        let output = Command::new("make")
            .arg("ce")
            .current_dir(infra_path)
            .env_clear()
            .envs(clean_env())
            .output()
            .map_err(|e| ToolError::Bootstrap(e.to_string()))?;

        if !output.status.success() {
            return Err(ToolError::Bootstrap(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(Self {
            infra_path: infra_path.to_path_buf(),
        })
    }

    /// Wrap an already-bootstrapped infra clone (tests, reruns).
    pub fn assume_bootstrapped(infra_path: &Path) -> Self {
        Self {
            infra_path: infra_path.to_path_buf(),
        }
    }

    pub fn infra_path(&self) -> &Path {
        &self.infra_path
    }

    /// Invoke `bin/ce_install <args>`, capturing output. Zero exit means
    /// the catalog files were mutated correctly; anything else is `Failed`
    /// with the raw output attached for diagnosis.
    pub fn run(&self, args: &[&str]) -> Result<ToolOutput, ToolError> {
        debug!("ce_install {}", args.join(" "));
        let output = Command::new("bin/ce_install")
            .args(args)
            .current_dir(&self.infra_path)
            .env_clear()
            .envs(clean_env())
            .output()
            .map_err(|e| ToolError::Spawn(e.to_string()))?;

        let result = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !output.status.success() {
            return Err(ToolError::Failed {
                command: args.join(" "),
                exit_code: result.exit_code,
                output: result.combined(),
            });
        }

        Ok(result)
    }
}

/// Environment for tool subprocesses: the current environment minus the
/// wrapper's own virtualenv markers, which confuse the tool's poetry setup.
fn clean_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(k, _)| k != "VIRTUAL_ENV" && k != "POETRY_ACTIVE")
        .collect()
}
