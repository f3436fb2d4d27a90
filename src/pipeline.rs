//! Batch orchestration.
//!
//! Drives each change unit through the stage machine:
//! Pending -> VersionResolved -> Synced -> ToolInvoked -> Committed ->
//! PrsOpened | AlreadyPresent | Failed. Versions for every unit are
//! resolved before the first mutation; a failing unit is recorded and the
//! batch moves on. The two working copies and the bootstrapped tool are
//! shared across the whole batch, each unit getting its own branch pair.

use crate::auth::Credential;
use crate::commit::{ChangeCommitter, CommitOutcome};
use crate::error::{Result, WizardError};
use crate::gitcmd;
use crate::github::GithubClient;
use crate::handlers::LibraryHandler;
use crate::model::{ChangeUnit, Language, LibrarySource};
use crate::pr::PrLinker;
use crate::progress::StageSpinner;
use crate::tool::CeInstall;
use crate::versions;
use crate::workspace::{RepoSync, RepositoryHandle, Workspace};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Where a unit currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum UnitStage {
    Pending,
    VersionResolved,
    Synced,
    ToolInvoked,
    Committed,
    PrsOpened {
        main_url: Option<String>,
        infra_url: Option<String>,
    },
    AlreadyPresent,
    Failed { stage: String, reason: String },
}

impl UnitStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStage::PrsOpened { .. } | UnitStage::AlreadyPresent | UnitStage::Failed { .. }
        )
    }
}

/// Final record for one unit, rendered in the batch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub display_name: String,
    #[serde(flatten)]
    pub stage: UnitStage,
    pub duration_secs: u64,
}

pub struct BatchOptions {
    pub dry_run: bool,
    pub keep_temp: bool,
}

pub struct BatchOrchestrator<'a> {
    client: Option<&'a GithubClient>,
    credential: Option<&'a Credential>,
    options: BatchOptions,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        client: Option<&'a GithubClient>,
        credential: Option<&'a Credential>,
        options: BatchOptions,
    ) -> Self {
        Self {
            client,
            credential,
            options,
        }
    }

    /// Run the whole batch and return one report per unit.
    pub fn run(&self, units: Vec<ChangeUnit>) -> Result<Vec<UnitReport>> {
        let started = Utc::now();
        let mut reports = Vec::with_capacity(units.len());

        // Version resolution happens for every unit before anything is
        // cloned or mutated; units with bad versions fail here and the
        // rest of the batch is unaffected.
        let mut resolved_units = Vec::new();
        for unit in units {
            match versions::resolve_all(&unit.source, &[unit.version.clone()], self.client) {
                Ok(resolved) => match resolved.into_iter().next() {
                    Some(r) => {
                        if r.tag != unit.version {
                            info!(
                                "{}: requested version matches tag {}",
                                unit.display_name(),
                                r.tag
                            );
                        }
                        resolved_units.push(unit.with_resolved_tag(r.tag));
                    }
                    None => resolved_units.push(unit),
                },
                Err(e) => {
                    warn!("{}: version resolution failed: {}", unit.display_name(), e);
                    reports.push(UnitReport {
                        display_name: unit.display_name(),
                        stage: UnitStage::Failed {
                            stage: "versions".to_string(),
                            reason: e.to_string(),
                        },
                        duration_secs: 0,
                    });
                }
            }
        }

        if resolved_units.is_empty() {
            return Ok(reports);
        }

        let workspace = Workspace::create(self.options.keep_temp)?;
        let sync = RepoSync::new(&workspace, self.client, self.credential)?;
        let (mut main, mut infra) = sync.sync_pair()?;

        let tool = CeInstall::bootstrap(&infra.path)?;

        for unit in resolved_units {
            let report = self.run_unit(&workspace, &sync, &mut main, &mut infra, &tool, &unit);
            reports.push(report);
        }

        let elapsed = (Utc::now() - started).num_seconds().max(0);
        info!("batch finished in {}s", elapsed);
        if workspace.is_kept() {
            println!("Workspace kept at {}", workspace.root().display());
        }
        Ok(reports)
    }

    /// One unit through all stages. Errors are converted into a `Failed`
    /// report naming the stage they were raised in.
    #[allow(clippy::too_many_arguments)]
    fn run_unit(
        &self,
        workspace: &Workspace,
        sync: &RepoSync<'_>,
        main: &mut RepositoryHandle,
        infra: &mut RepositoryHandle,
        tool: &CeInstall,
        unit: &ChangeUnit,
    ) -> UnitReport {
        let spinner = StageSpinner::new(&unit.display_name());
        let mut stage_label = "branches";

        let result = (|| -> Result<UnitStage> {
            spinner.stage("preparing branches");
            sync.prepare_branch(main, unit)?;
            sync.prepare_branch(infra, unit)?;

            stage_label = "tool";
            spinner.stage("running ce_install");
            let handler = LibraryHandler::new(unit.language);
            let library_type = self.detect_type(workspace, &handler, unit)?;
            for command in handler.tool_commands(unit, library_type, &main.path) {
                let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
                match tool.run(&args) {
                    Ok(output) => {
                        if !output.stdout.trim().is_empty() {
                            info!("ce_install: {}", output.stdout.trim());
                        }
                    }
                    Err(e) if command.allow_failure => {
                        warn!("tolerated tool failure: {}", e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            handler.finalize(unit, &infra.path, &main.path)?;

            stage_label = "commit";
            spinner.stage("committing");
            let committer = ChangeCommitter::new(self.options.dry_run);
            let main_outcome = committer.commit_and_push(main, unit)?;
            let infra_outcome = committer.commit_and_push(infra, unit)?;

            if main_outcome.is_noop() && infra_outcome.is_noop() {
                return if self.options.dry_run {
                    Ok(UnitStage::Committed)
                } else {
                    Ok(UnitStage::AlreadyPresent)
                };
            }

            let pushed = matches!(main_outcome, CommitOutcome::Committed { pushed: true, .. })
                || matches!(infra_outcome, CommitOutcome::Committed { pushed: true, .. });
            if !pushed {
                // Local-only mode: commits exist but nothing can be
                // published without a credential.
                return Ok(UnitStage::Committed);
            }

            stage_label = "pull requests";
            spinner.stage("opening pull requests");
            let (client, username) = match (self.client, sync.username()) {
                (Some(c), Some(u)) => (c, u),
                _ => return Ok(UnitStage::Committed),
            };
            let committed_side = |outcome: &CommitOutcome, handle: &RepositoryHandle| {
                matches!(outcome, CommitOutcome::Committed { pushed: true, .. })
                    .then(|| handle.clone())
            };
            let main_side = committed_side(&main_outcome, main);
            let infra_side = committed_side(&infra_outcome, infra);

            let linker = PrLinker::new(client, username);
            let linked = linker.open_linked(unit, main_side.as_ref(), infra_side.as_ref())?;
            crate::output::print_pr_pair(
                linked.infra.as_ref().map(|pr| pr.url.as_str()),
                linked.main.as_ref().map(|pr| pr.url.as_str()),
            );

            Ok(UnitStage::PrsOpened {
                main_url: linked.main.map(|pr| pr.url),
                infra_url: linked.infra.map(|pr| pr.url),
            })
        })();

        let stage = match result {
            Ok(stage) => {
                let outcome = match &stage {
                    UnitStage::PrsOpened { .. } => "published",
                    UnitStage::AlreadyPresent => "already present",
                    _ => "done",
                };
                spinner.finish_success(outcome);
                stage
            }
            Err(e) => {
                spinner.finish_error(&e.to_string());
                UnitStage::Failed {
                    stage: stage_label.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        UnitReport {
            display_name: unit.display_name(),
            stage,
            duration_secs: spinner.elapsed_secs(),
        }
    }

    /// Resolve the library type, probing a shallow checkout of the library
    /// itself when the language needs it and no override was given.
    fn detect_type(
        &self,
        workspace: &Workspace,
        handler: &LibraryHandler,
        unit: &ChangeUnit,
    ) -> Result<crate::model::LibraryType> {
        let needs_probe = unit.library_type.is_none()
            && matches!(unit.language, Language::C | Language::Cpp);
        if !needs_probe {
            return Ok(handler.detect_type(unit, None));
        }

        match &unit.source {
            LibrarySource::GithubUrl(url) => {
                let probe = workspace.root().join(format!("probe-{}", unit.library_id));
                if !probe.exists() {
                    gitcmd::clone_shallow_default(url, &probe)?;
                }
                Ok(handler.detect_type(unit, Some(&probe)))
            }
            LibrarySource::Name(_) => Ok(handler.detect_type(unit, None)),
        }
    }
}

/// Expand CLI input (one library, many versions) into change units.
pub fn build_units(
    language: Language,
    source: &LibrarySource,
    requested_versions: &[String],
    library_type: Option<crate::model::LibraryType>,
) -> Result<Vec<ChangeUnit>> {
    if requested_versions.is_empty() {
        return Err(WizardError::Git("at least one version is required".into()));
    }
    let handler = LibraryHandler::new(language);
    requested_versions
        .iter()
        .map(|v| {
            ChangeUnit::new(
                language,
                source.clone(),
                handler.normalize_version(v),
                library_type,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LibraryType;

    #[test]
    fn test_stage_terminality() {
        assert!(!UnitStage::Pending.is_terminal());
        assert!(!UnitStage::Committed.is_terminal());
        assert!(UnitStage::AlreadyPresent.is_terminal());
        assert!(UnitStage::Failed {
            stage: "tool".into(),
            reason: "x".into()
        }
        .is_terminal());
        assert!(UnitStage::PrsOpened {
            main_url: Some("m".into()),
            infra_url: Some("i".into())
        }
        .is_terminal());
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&UnitStage::AlreadyPresent).unwrap();
        assert!(json.contains("already_present"));

        let failed = UnitStage::Failed {
            stage: "versions".into(),
            reason: "not found".into(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        assert!(json.contains("not found"));
    }

    #[test]
    fn test_build_units_one_per_version() {
        let units = build_units(
            Language::Rust,
            &LibrarySource::Name("serde".into()),
            &["1.0.194".to_string(), "1.0.195".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].version, "1.0.194");
        assert_eq!(units[1].version, "1.0.195");
    }

    #[test]
    fn test_build_units_normalizes_go_versions() {
        let units = build_units(
            Language::Go,
            &LibrarySource::Name("github_com_stretchr_testify".into()),
            &["1.9.0".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(units[0].version, "v1.9.0");
    }

    #[test]
    fn test_build_units_requires_versions() {
        let err = build_units(
            Language::Rust,
            &LibrarySource::Name("serde".into()),
            &[],
            Some(LibraryType::PackagedHeaders),
        )
        .unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_report_serialization_flattens_stage() {
        let report = UnitReport {
            display_name: "serde 1.0.195".into(),
            stage: UnitStage::PrsOpened {
                main_url: Some("https://example/m".into()),
                infra_url: Some("https://example/i".into()),
            },
            duration_secs: 12,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("prs_opened"));
        assert!(json.contains("serde 1.0.195"));
    }
}
