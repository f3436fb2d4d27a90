//! ce-lib-wizard CLI entry point.
//!
//! Parses command-line arguments and drives the batch pipeline.

use ce_lib_wizard::error::AuthError;
use ce_lib_wizard::output::{print_error, print_warning};
use ce_lib_wizard::pipeline::{build_units, BatchOptions, BatchOrchestrator};
use ce_lib_wizard::{auth, output, GithubClient, Language, LibrarySource, LibraryType};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ce-lib-wizard")]
#[command(
    version,
    about = "Add libraries to Compiler Explorer as linked pull requests",
    after_help = "EXAMPLES:
    # Add a Rust crate (token from GITHUB_TOKEN or gh CLI)
    ce-lib-wizard add --language rust serde --version 1.0.195

    # Add a C++ library from GitHub, two versions at once
    ce-lib-wizard add --language cpp https://github.com/fmtlib/fmt \\
        --version 10.2.0 --version 10.2.1

    # Force the library type instead of probing the checkout
    ce-lib-wizard add --language cpp https://github.com/nlohmann/json \\
        --version 3.11.3 --library-type header-only

    # Inspect the would-be changes without committing or pushing
    ce-lib-wizard add --language rust serde --version 1.0.195 --dry-run"
)]
struct Cli {
    /// Log internal progress to stderr (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a library to the catalogs and open the PR pair
    Add {
        /// Library to add: a bare name (Rust crate, Go module) or a
        /// GitHub repository URL (C, C++, Fortran)
        library: String,

        /// Target language
        #[arg(short, long)]
        language: Language,

        /// Version to add (repeat for multiple versions)
        #[arg(short = 'V', long = "version", required = true)]
        versions: Vec<String>,

        /// Library type override (header-only, packaged-headers, static, shared)
        #[arg(long)]
        library_type: Option<LibraryType>,

        /// GitHub token (overrides GITHUB_TOKEN and gh CLI)
        #[arg(long, env = "CE_WIZARD_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// Fall back to the interactive browser OAuth flow when no other
        /// credential is found
        #[arg(long)]
        oauth: bool,

        /// Show the changes without committing, pushing or opening PRs
        #[arg(long)]
        dry_run: bool,

        /// Keep the temporary workspace for inspection
        #[arg(long)]
        keep_temp: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let exit_code = match cli.command {
        Commands::Add {
            library,
            language,
            versions,
            library_type,
            github_token,
            oauth,
            dry_run,
            keep_temp,
        } => run_add(
            &library,
            language,
            &versions,
            library_type,
            github_token.as_deref(),
            oauth,
            dry_run,
            keep_temp,
        ),
    };

    std::process::exit(exit_code);
}

#[allow(clippy::too_many_arguments)]
fn run_add(
    library: &str,
    language: Language,
    versions: &[String],
    library_type: Option<LibraryType>,
    github_token: Option<&str>,
    oauth: bool,
    dry_run: bool,
    keep_temp: bool,
) -> i32 {
    let source = parse_source(library, language);

    let units = match build_units(language, &source, versions, library_type) {
        Ok(units) => units,
        Err(e) => {
            print_error(&e.to_string());
            return 2;
        }
    };

    // A missing credential degrades the run to local-only rather than
    // aborting it; any other auth failure is fatal.
    let credential = match auth::resolve(github_token, oauth) {
        Ok(cred) => Some(cred),
        Err(AuthError::NoCredential) => {
            print_warning(
                "no GitHub credential found; changes will be prepared locally but not \
                 pushed (set GITHUB_TOKEN, log in with `gh auth login`, or pass --oauth)",
            );
            None
        }
        Err(e) => {
            print_error(&e.to_string());
            return 2;
        }
    };

    let client = match &credential {
        Some(cred) => match GithubClient::new(cred) {
            Ok(client) => Some(client),
            Err(e) => {
                print_error(&e.to_string());
                return 2;
            }
        },
        None => None,
    };

    let orchestrator = BatchOrchestrator::new(
        client.as_ref(),
        credential.as_ref(),
        BatchOptions { dry_run, keep_temp },
    );

    match orchestrator.run(units) {
        Ok(reports) => {
            let failed = output::print_batch_summary(&reports);
            if failed > 0 {
                1
            } else {
                0
            }
        }
        Err(e) => {
            print_error(&e.to_string());
            2
        }
    }
}

/// A bare name stays a name; anything that looks like a GitHub URL becomes
/// a repository source. Go inputs are module paths and stay bare names
/// even when they point at github.com — the catalog is keyed by the module
/// path, not by a URL — with any pasted scheme stripped.
fn parse_source(library: &str, language: Language) -> LibrarySource {
    if language == Language::Go {
        let module = library
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        return LibrarySource::Name(module.to_string());
    }
    if library.contains("github.com/") {
        let url = if library.starts_with("http") {
            library.to_string()
        } else {
            format!("https://{}", library)
        };
        LibrarySource::GithubUrl(url)
    } else {
        LibrarySource::Name(library.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_add() {
        let cli = Cli::parse_from([
            "ce-lib-wizard",
            "add",
            "--language",
            "rust",
            "serde",
            "--version",
            "1.0.195",
        ]);
        match cli.command {
            Commands::Add {
                library,
                language,
                versions,
                dry_run,
                ..
            } => {
                assert_eq!(library, "serde");
                assert_eq!(language, Language::Rust);
                assert_eq!(versions, vec!["1.0.195"]);
                assert!(!dry_run);
            }
        }
    }

    #[test]
    fn test_cli_repeatable_versions() {
        let cli = Cli::parse_from([
            "ce-lib-wizard",
            "add",
            "--language",
            "cpp",
            "https://github.com/fmtlib/fmt",
            "--version",
            "10.2.0",
            "--version",
            "10.2.1",
        ]);
        match cli.command {
            Commands::Add { versions, .. } => assert_eq!(versions.len(), 2),
        }
    }

    #[test]
    fn test_cli_requires_version() {
        let result =
            Cli::try_parse_from(["ce-lib-wizard", "add", "--language", "rust", "serde"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_source_variants() {
        assert_eq!(
            parse_source("serde", Language::Rust),
            LibrarySource::Name("serde".to_string())
        );
        assert_eq!(
            parse_source("https://github.com/fmtlib/fmt", Language::Cpp),
            LibrarySource::GithubUrl("https://github.com/fmtlib/fmt".to_string())
        );
        assert_eq!(
            parse_source("github.com/fmtlib/fmt", Language::Cpp),
            LibrarySource::GithubUrl("https://github.com/fmtlib/fmt".to_string())
        );
    }

    #[test]
    fn test_parse_source_go_keeps_module_path() {
        assert_eq!(
            parse_source("github.com/google/uuid", Language::Go),
            LibrarySource::Name("github.com/google/uuid".to_string())
        );
        // A pasted URL is normalized back to the module path.
        assert_eq!(
            parse_source("https://github.com/google/uuid", Language::Go),
            LibrarySource::Name("github.com/google/uuid".to_string())
        );
    }
}
