pub mod auth;
pub mod commit;
pub mod error;
pub mod gitcmd;
pub mod github;
pub mod handlers;
pub mod model;
pub mod oauth;
pub mod output;
pub mod pipeline;
pub mod pr;
pub mod progress;
pub mod tool;
pub mod versions;
pub mod workspace;

pub use auth::{AuthMethod, Credential};
pub use error::{Result, WizardError};
pub use github::GithubClient;
pub use model::{ChangeUnit, Language, LibrarySource, LibraryType, RepoRole};
pub use pipeline::{BatchOptions, BatchOrchestrator, UnitReport, UnitStage};
pub use workspace::Workspace;
