//! Version validation against a repository's actual tags.
//!
//! Repositories disagree about whether tags carry a `v` prefix; the
//! resolver samples the existing tags to learn the convention, then matches
//! the requested version exactly, stripped, or prefixed. Every version of a
//! unit must resolve before any mutation begins, so a bad batch fails
//! before the first file is touched.

use crate::error::{Result, VersionError, WizardError};
use crate::gitcmd;
use crate::github::GithubClient;
use crate::model::LibrarySource;
use log::debug;

/// One requested version matched to an actual tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// The version as requested (what goes into branch names and catalogs).
    pub requested: String,
    /// The tag that proves it exists upstream.
    pub tag: String,
}

/// Resolve all requested versions for one library, failing fast on the
/// first version that does not exist.
///
/// Sources without a tag authority (bare crate names, Go module paths with
/// no recognized GitHub mirror) skip validation; for those the external
/// tool is the existence check.
pub fn resolve_all(
    source: &LibrarySource,
    versions: &[String],
    client: Option<&GithubClient>,
) -> Result<Vec<ResolvedVersion>> {
    let tags = match fetch_tags(source, client)? {
        Some(tags) => tags,
        None => {
            debug!("no tag authority for {}, deferring to the tool", source);
            return Ok(versions
                .iter()
                .map(|v| ResolvedVersion {
                    requested: v.clone(),
                    tag: v.clone(),
                })
                .collect());
        }
    };
    debug!(
        "{}: {} tags, convention {}",
        source,
        tags.len(),
        if uses_v_prefix(&tags) {
            "v-prefixed"
        } else {
            "unprefixed"
        }
    );

    let mut resolved = Vec::with_capacity(versions.len());
    for version in versions {
        match match_version(&tags, version) {
            Some(tag) => resolved.push(ResolvedVersion {
                requested: version.clone(),
                tag,
            }),
            None => {
                return Err(VersionError::NotFound {
                    repo: source.to_string(),
                    version: version.clone(),
                }
                .into())
            }
        }
    }
    Ok(resolved)
}

/// Tag list for the source: host API when a GitHub repo (or a module
/// path's GitHub mirror) is recognized and a client is available, generic
/// `ls-remote` listing otherwise. Bare names with no mirror have no tag
/// authority at all.
fn fetch_tags(source: &LibrarySource, client: Option<&GithubClient>) -> Result<Option<Vec<String>>> {
    let tags = match (source, source.github_repo()) {
        (_, Some((owner, name))) => {
            let repo = format!("{}/{}", owner, name);
            match client {
                Some(client) => client
                    .list_tags(&repo)
                    .map_err(|e| tag_list_failed(source, e))?,
                None => gitcmd::ls_remote_tags(&format!("https://github.com/{}.git", repo))
                    .map_err(|e| tag_list_failed(source, e))?,
            }
        }
        (LibrarySource::GithubUrl(url), None) => {
            gitcmd::ls_remote_tags(url).map_err(|e| tag_list_failed(source, e))?
        }
        (LibrarySource::Name(_), None) => return Ok(None),
    };
    Ok(Some(tags))
}

fn tag_list_failed(source: &LibrarySource, e: WizardError) -> WizardError {
    VersionError::TagListFailed {
        repo: source.to_string(),
        reason: e.to_string(),
    }
    .into()
}

/// Match a requested version against the tag list: exact first, then the
/// opposite prefix convention. Unknown conventions default to no prefix,
/// which exact-match-first already gives us.
fn match_version(tags: &[String], requested: &str) -> Option<String> {
    if tags.iter().any(|t| t == requested) {
        return Some(requested.to_string());
    }

    let candidate = if let Some(stripped) = requested.strip_prefix('v') {
        stripped.to_string()
    } else {
        format!("v{}", requested)
    };
    if tags.iter().any(|t| *t == candidate) {
        return Some(candidate);
    }

    None
}

/// Whether the repository's tags conventionally carry a `v` prefix.
/// Diagnostic only; matching itself tries both forms.
fn uses_v_prefix(tags: &[String]) -> bool {
    let versionish = tags
        .iter()
        .filter(|t| {
            t.strip_prefix('v')
                .map(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
                .unwrap_or(false)
                || t.starts_with(|c: char| c.is_ascii_digit())
        })
        .count();
    if versionish == 0 {
        return false;
    }
    let prefixed = tags
        .iter()
        .filter(|t| {
            t.strip_prefix('v')
                .map(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
                .unwrap_or(false)
        })
        .count();
    prefixed * 2 > versionish
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WizardError;
    use crate::model::LibrarySource;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_is_verbatim() {
        let t = tags(&["1.0.194", "1.0.195"]);
        assert_eq!(match_version(&t, "1.0.195"), Some("1.0.195".to_string()));
    }

    #[test]
    fn test_prefixed_repo_unprefixed_request() {
        let t = tags(&["v10.2.0", "v10.2.1"]);
        assert_eq!(match_version(&t, "10.2.1"), Some("v10.2.1".to_string()));
    }

    #[test]
    fn test_unprefixed_repo_prefixed_request() {
        let t = tags(&["10.2.0", "10.2.1"]);
        assert_eq!(match_version(&t, "v10.2.1"), Some("10.2.1".to_string()));
    }

    #[test]
    fn test_missing_version_is_none() {
        let t = tags(&["v10.2.0", "v10.2.1"]);
        assert_eq!(match_version(&t, "10.3.0"), None);
        assert_eq!(match_version(&t, "v10.3.0"), None);
    }

    #[test]
    fn test_uses_v_prefix_detection() {
        assert!(uses_v_prefix(&tags(&["v1.0.0", "v1.1.0", "v2.0.0"])));
        assert!(!uses_v_prefix(&tags(&["1.0.0", "1.1.0", "2.0.0"])));
        assert!(!uses_v_prefix(&tags(&["release-candidate", "latest"])));
    }

    #[test]
    fn test_bare_name_skips_validation() {
        let resolved = resolve_all(
            &LibrarySource::Name("serde".into()),
            &["1.0.195".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].requested, "1.0.195");
        assert_eq!(resolved[0].tag, "1.0.195");
    }

    #[test]
    fn test_resolve_all_fails_fast_on_first_missing() {
        // All versions must resolve before any is accepted.
        let t = tags(&["v1.0.0"]);
        let versions = vec!["1.0.0".to_string(), "9.9.9".to_string()];
        let mut resolved = Vec::new();
        let mut failed = None;
        for v in &versions {
            match match_version(&t, v) {
                Some(tag) => resolved.push(tag),
                None => {
                    failed = Some(v.clone());
                    break;
                }
            }
        }
        assert_eq!(failed.as_deref(), Some("9.9.9"));
    }

    #[test]
    fn test_not_found_error_names_version() {
        let t = tags(&["v1.0.0"]);
        assert!(match_version(&t, "2.0.0").is_none());
        let err: WizardError = VersionError::NotFound {
            repo: "https://github.com/fmtlib/fmt".into(),
            version: "2.0.0".into(),
        }
        .into();
        assert!(err.to_string().contains("2.0.0"));
    }
}
