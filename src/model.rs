//! Core data model: languages, change units and branch naming.

use crate::error::{Result, WizardError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Languages with catalog support. Adding a language means adding a variant
/// here and a matching arm in `handlers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Rust,
    Fortran,
    Go,
}

impl Language {
    /// Short identifier used in branch names and commit messages.
    pub fn slug(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Rust => "rust",
            Language::Fortran => "fortran",
            Language::Go => "go",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Rust => "Rust",
            Language::Fortran => "Fortran",
            Language::Go => "Go",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" => Ok(Language::C),
            "cpp" | "c++" => Ok(Language::Cpp),
            "rust" => Ok(Language::Rust),
            "fortran" => Ok(Language::Fortran),
            "go" => Ok(Language::Go),
            other => Err(format!(
                "unknown language '{}' (expected c, cpp, rust, fortran or go)",
                other
            )),
        }
    }
}

/// How a library is installed and consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LibraryType {
    HeaderOnly,
    PackagedHeaders,
    Static,
    Shared,
}

impl LibraryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::HeaderOnly => "header-only",
            LibraryType::PackagedHeaders => "packaged-headers",
            LibraryType::Static => "static",
            LibraryType::Shared => "shared",
        }
    }
}

impl std::str::FromStr for LibraryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "header-only" => Ok(LibraryType::HeaderOnly),
            "packaged-headers" => Ok(LibraryType::PackagedHeaders),
            "static" => Ok(LibraryType::Static),
            "shared" => Ok(LibraryType::Shared),
            other => Err(format!("unknown library type '{}'", other)),
        }
    }
}

/// The library being added: either a bare name (Rust crates, Go module
/// paths) or a GitHub repository URL (C, C++, Fortran).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibrarySource {
    Name(String),
    GithubUrl(String),
}

impl LibrarySource {
    /// owner/name pair when the source is a recognized github.com URL, or
    /// a module path (Go) with a GitHub mirror to validate tags against.
    pub fn github_repo(&self) -> Option<(String, String)> {
        let url = match self {
            LibrarySource::GithubUrl(u) => u,
            LibrarySource::Name(n) if n.contains("github.com/") => n,
            LibrarySource::Name(_) => return None,
        };
        let re = github_repo_regex();
        let caps = re.captures(url)?;
        let owner = caps.get(1)?.as_str().to_string();
        let name = caps.get(2)?.as_str().trim_end_matches(".git").to_string();
        Some((owner, name))
    }
}

impl fmt::Display for LibrarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibrarySource::Name(n) => write!(f, "{}", n),
            LibrarySource::GithubUrl(u) => write!(f, "{}", u),
        }
    }
}

fn github_repo_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"github\.com/([^/\s]+)/([^/\s]+)").unwrap())
}

fn library_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap())
}

/// One (language, library, version) change request, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeUnit {
    pub language: Language,
    pub source: LibrarySource,
    /// Normalized library identifier (lowercase_with_underscores).
    pub library_id: String,
    pub version: String,
    /// Explicit type override; when absent the handler detects it.
    pub library_type: Option<LibraryType>,
    /// Tag the requested version matched, once a tag authority resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_tag: Option<String>,
}

impl ChangeUnit {
    pub fn new(
        language: Language,
        source: LibrarySource,
        version: impl Into<String>,
        library_type: Option<LibraryType>,
    ) -> Result<Self> {
        let library_id = match &source {
            // Module paths (Go) key off their final meaningful segment.
            LibrarySource::Name(name) if name.contains('/') => {
                sanitize_library_id(module_base_segment(name))
            }
            LibrarySource::Name(name) => name.clone(),
            LibrarySource::GithubUrl(url) => suggest_library_id(url),
        };
        if !validate_library_id(&library_id) {
            return Err(WizardError::InvalidLibraryId(library_id));
        }
        Ok(Self {
            language,
            source,
            library_id,
            version: version.into(),
            library_type,
            resolved_tag: None,
        })
    }

    /// Record the tag a version resolver matched for this unit.
    pub fn with_resolved_tag(mut self, tag: impl Into<String>) -> Self {
        self.resolved_tag = Some(tag.into());
        self
    }

    /// The upstream tag for this unit; falls back to the requested version
    /// when no tag authority was consulted.
    pub fn tag(&self) -> &str {
        self.resolved_tag.as_deref().unwrap_or(&self.version)
    }

    /// Human-readable display name, e.g. "serde 1.0.195".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.library_id, self.version)
    }

    /// Commit message used for both repositories.
    pub fn commit_message(&self) -> String {
        format!(
            "Add {} library {} {}",
            self.language, self.library_id, self.version
        )
    }

    /// Deterministic branch name for the given repository role.
    ///
    /// Reruns with the same unit target the same branch, so a rerun resets
    /// and replays rather than stacking commits. Dots are not valid in the
    /// slug scheme, so versions are sanitized to dashes.
    pub fn branch_name(&self, role: RepoRole) -> String {
        let version = self.version.replace('.', "-");
        format!(
            "add-{}-{}-{}-{}",
            self.language.slug(),
            self.library_id.replace('_', "-"),
            version,
            role.slug()
        )
    }
}

/// Which of the two target repositories a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoRole {
    /// compiler-explorer/compiler-explorer (properties files)
    Main,
    /// compiler-explorer/infra (libraries.yaml, ce_install)
    Infra,
}

impl RepoRole {
    pub fn upstream(&self) -> &'static str {
        match self {
            RepoRole::Main => "compiler-explorer/compiler-explorer",
            RepoRole::Infra => "compiler-explorer/infra",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            RepoRole::Main => "main",
            RepoRole::Infra => "infra",
        }
    }

    /// Directory name for the working copy inside the temp workspace.
    pub fn dir_name(&self) -> &'static str {
        match self {
            RepoRole::Main => "compiler-explorer",
            RepoRole::Infra => "infra",
        }
    }
}

/// Validate the lowercase_with_underscores library id convention.
pub fn validate_library_id(id: &str) -> bool {
    library_id_regex().is_match(id)
}

/// Derive a library id from a GitHub URL: repo name lowercased,
/// non-alphanumerics collapsed to single underscores, trimmed, and given a
/// `lib_` prefix when it does not start with a letter.
pub fn suggest_library_id(github_url: &str) -> String {
    let repo_name = github_repo_regex()
        .captures(github_url)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim_end_matches(".git").to_string())
        .unwrap_or_default();

    if repo_name.is_empty() {
        return "unknown_library".to_string();
    }

    sanitize_library_id(&repo_name)
}

/// Final path segment of a module path, skipping a trailing major-version
/// suffix such as `/v5`.
fn module_base_segment(path: &str) -> &str {
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let last = segments.next().unwrap_or(path);
    let is_major_suffix = last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit());
    if is_major_suffix {
        segments.next().unwrap_or(last)
    } else {
        last
    }
}

/// Normalize a raw name into the lowercase_with_underscores convention.
fn sanitize_library_id(raw: &str) -> String {
    let mut id = String::with_capacity(raw.len());
    let mut last_was_underscore = false;
    for ch in raw.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            id.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore {
            id.push('_');
            last_was_underscore = true;
        }
    }
    let id = id.trim_matches('_').to_string();

    if id.is_empty() {
        "unknown_library".to_string()
    } else if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
        format!("lib_{}", id)
    } else {
        id
    }
}
