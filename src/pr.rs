//! Cross-linked pull request creation.
//!
//! The infra PR is opened first, the main PR carries a link to it, and the
//! infra PR body is then edited to carry the main link back. Reviewers on
//! either side can reach the sibling, whichever lands in front of them.

use crate::error::{PrError, Result};
use crate::github::GithubClient;
use crate::model::{ChangeUnit, RepoRole};
use crate::workspace::RepositoryHandle;
use log::{info, warn};

const PR_FOOTER: &str =
    "\n\n---\n_PR created with [ce-lib-wizard](https://github.com/compiler-explorer/ce-library-wizard)_";

/// One created pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestLink {
    pub role: RepoRole,
    pub number: u64,
    pub url: String,
}

/// The published halves of a change. A side stays `None` when its
/// repository had no diff to publish.
#[derive(Debug, Clone, Default)]
pub struct LinkedPullRequests {
    pub main: Option<PullRequestLink>,
    pub infra: Option<PullRequestLink>,
}

pub struct PrLinker<'a> {
    client: &'a GithubClient,
    username: &'a str,
}

impl<'a> PrLinker<'a> {
    pub fn new(client: &'a GithubClient, username: &'a str) -> Self {
        Self { client, username }
    }

    /// Open PRs for the sides that carry a commit. When both sides do, the
    /// infra PR is opened first, the main PR references it, and the infra
    /// body is then edited with the reverse link.
    pub fn open_linked(
        &self,
        unit: &ChangeUnit,
        main: Option<&RepositoryHandle>,
        infra: Option<&RepositoryHandle>,
    ) -> Result<LinkedPullRequests> {
        let title = unit.commit_message();
        let body = format!(
            "This PR adds the {} library **{}** version {} to Compiler Explorer.",
            unit.language, unit.library_id, unit.version
        );

        let infra_pr = match infra {
            Some(handle) => {
                let pr = self.open_one(handle, &title, &format!("{}{}", body, PR_FOOTER))?;
                info!("infra PR: {}", pr.url);
                Some(pr)
            }
            None => None,
        };

        let main_pr = match main {
            Some(handle) => {
                let main_body = match &infra_pr {
                    Some(pr) => format!("{}\n\nRelated PR: {}{}", body, pr.url, PR_FOOTER),
                    None => format!("{}{}", body, PR_FOOTER),
                };
                let pr = self.open_one(handle, &title, &main_body)?;
                info!("main PR: {}", pr.url);
                Some(pr)
            }
            None => None,
        };

        // Backfill the reverse link. Both PRs already exist at this point,
        // so a failure here degrades the cross-link, not the publication.
        if let (Some(infra_pr), Some(main_pr)) = (&infra_pr, &main_pr) {
            let infra_body = format!("{}\n\nRelated PR: {}{}", body, main_pr.url, PR_FOOTER);
            if let Err(e) = self.client.update_pull_request_body(
                RepoRole::Infra.upstream(),
                infra_pr.number,
                &infra_body,
            ) {
                warn!("could not backfill infra PR link: {}", e);
            }
        }

        Ok(LinkedPullRequests {
            main: main_pr,
            infra: infra_pr,
        })
    }

    fn open_one(
        &self,
        handle: &RepositoryHandle,
        title: &str,
        body: &str,
    ) -> Result<PullRequestLink> {
        let branch = handle.branch.as_deref().ok_or_else(|| PrError::CreateFailed {
            repo: handle.role.upstream().to_string(),
            reason: "no branch prepared".to_string(),
        })?;
        let head = format!("{}:{}", self.username, branch);

        let pr = self
            .client
            .create_pull_request(
                handle.role.upstream(),
                &head,
                &handle.base_branch,
                title,
                body,
            )
            .map_err(|e| PrError::CreateFailed {
                repo: handle.role.upstream().to_string(),
                reason: e.to_string(),
            })?;

        Ok(PullRequestLink {
            role: handle.role,
            number: pr.number,
            url: pr.html_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Language, LibrarySource};

    #[test]
    fn test_pr_footer_is_attribution_only() {
        assert!(PR_FOOTER.starts_with("\n\n---\n"));
        assert!(PR_FOOTER.contains("ce-lib-wizard"));
    }

    #[test]
    fn test_pr_body_shape() {
        let unit = ChangeUnit::new(
            Language::Cpp,
            LibrarySource::GithubUrl("https://github.com/fmtlib/fmt".into()),
            "10.2.1",
            None,
        )
        .unwrap();
        let body = format!(
            "This PR adds the {} library **{}** version {} to Compiler Explorer.",
            unit.language, unit.library_id, unit.version
        );
        assert_eq!(
            body,
            "This PR adds the C++ library **fmt** version 10.2.1 to Compiler Explorer."
        );

        let linked = format!("{}\n\nRelated PR: {}{}", body, "https://example/pr/1", PR_FOOTER);
        assert!(linked.contains("Related PR: https://example/pr/1"));
        assert!(linked.ends_with(PR_FOOTER));
    }

    #[test]
    fn test_head_ref_carries_username() {
        let head = format!("{}:{}", "someone", "add-cpp-fmt-10-2-1-main");
        assert_eq!(head, "someone:add-cpp-fmt-10-2-1-main");
    }
}
