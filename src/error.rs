use thiserror::Error;

/// Failure to obtain a usable GitHub credential.
///
/// Non-fatal for local-only paths: without a credential the pipeline still
/// clones, runs the tool and reports diffs, skipping only push and PRs.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no usable GitHub credential found (tried explicit token, GITHUB_TOKEN, gh CLI)")]
    NoCredential,

    #[error("GitHub OAuth is not configured: {0}")]
    OauthNotConfigured(String),

    #[error("OAuth callback state mismatch (possible CSRF)")]
    StateMismatch,

    #[error("OAuth flow timed out after {0} seconds")]
    OauthTimeout(u64),

    #[error("OAuth flow failed: {0}")]
    OauthFailed(String),
}

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("version '{version}' not found in tags of {repo}")]
    NotFound { repo: String, version: String },

    #[error("failed to list tags for {repo}: {reason}")]
    TagListFailed { repo: String, reason: String },
}

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("fork of {0} was not ready after bounded polling")]
    ForkTimeout(String),

    #[error("repository sync failed for {repo}: {reason}")]
    SyncFailed { repo: String, reason: String },

    #[error("insufficient permissions for {0} (check the token's 'repo' scope)")]
    Forbidden(String),
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("ce_install {command} failed (exit {exit_code}):\n{output}")]
    Failed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("failed to spawn ce_install: {0}")]
    Spawn(String),

    #[error("ce_install bootstrap (make ce) failed: {0}")]
    Bootstrap(String),
}

#[derive(Error, Debug)]
pub enum PrError {
    #[error("failed to create pull request on {repo}: {reason}")]
    CreateFailed { repo: String, reason: String },

    #[error("failed to update pull request body on {repo}: {reason}")]
    UpdateFailed { repo: String, reason: String },
}

/// Umbrella error for the wizard.
///
/// Stage-specific errors are classified at the unit boundary by the
/// pipeline; this type exists so `?` composes across modules.
#[derive(Error, Debug)]
pub enum WizardError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Pr(#[from] PrError),

    #[error("git command failed: {0}")]
    Git(String),

    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("invalid library identifier '{0}' (expected lowercase letters, digits, underscores, leading letter)")]
    InvalidLibraryId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, WizardError>;
