//! Per-language library handlers.
//!
//! A closed capability set per language: detect the library type, build
//! the ce_install commands for the unit, name the main-repo properties
//! files the unit touches, and apply any main-repo follow-up the tool
//! itself does not cover. Adding a language means adding match arms here
//! and a `Language` variant, nothing else.

use crate::error::{Result, WizardError};
use crate::model::{ChangeUnit, Language, LibraryType};
use log::{info, warn};
use std::path::Path;

/// One ce_install invocation. `allow_failure` marks steps whose failure is
/// tolerated (e.g. Windows properties generation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub args: Vec<String>,
    pub allow_failure: bool,
}

impl ToolCommand {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            allow_failure: false,
        }
    }

    fn tolerated<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_failure: true,
            ..Self::new(args)
        }
    }
}

/// Handler dispatch for one language.
#[derive(Debug, Clone, Copy)]
pub struct LibraryHandler {
    language: Language,
}

impl LibraryHandler {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// Determine the library type. The explicit override always wins; for
    /// C and C++ a checkout of the library itself is probed for CMake
    /// build files (present means buildable, absent means header-only).
    pub fn detect_type(&self, unit: &ChangeUnit, probe_dir: Option<&Path>) -> LibraryType {
        if let Some(explicit) = unit.library_type {
            return explicit;
        }
        match self.language {
            Language::C | Language::Cpp => match probe_dir {
                Some(dir) if has_cmake_build(dir) => LibraryType::Static,
                Some(_) => LibraryType::HeaderOnly,
                None => {
                    warn!("no checkout to probe for {}, assuming header-only", unit.library_id);
                    LibraryType::HeaderOnly
                }
            },
            // Non-C languages install packaged sources; the distinction
            // does not apply.
            Language::Rust | Language::Fortran | Language::Go => LibraryType::PackagedHeaders,
        }
    }

    /// Version normalization: Go versions always carry the `v` prefix.
    pub fn normalize_version(&self, version: &str) -> String {
        match self.language {
            Language::Go if !version.starts_with('v') => format!("v{}", version),
            _ => version.to_string(),
        }
    }

    /// The ce_install invocations (run in the infra clone) for this unit.
    /// `main_path` is the main-repo working copy, for commands that write
    /// properties files in place.
    pub fn tool_commands(
        &self,
        unit: &ChangeUnit,
        library_type: LibraryType,
        main_path: &Path,
    ) -> Vec<ToolCommand> {
        // Library targets in infra are git refs; pass the matched tag, not
        // the requested spelling, so a v-prefix mismatch still checks out.
        let version = self.normalize_version(unit.tag());
        match self.language {
            Language::Rust => vec![
                ToolCommand::new(["add-crate", &unit.library_id, &version]),
                ToolCommand::new(["generate-rust-props"]),
            ],
            Language::Cpp | Language::C => {
                let url = unit.source.to_string();
                // C shared libraries ride the cpp-library machinery with a
                // dedicated type.
                let type_arg = if self.language == Language::C {
                    "cshared".to_string()
                } else {
                    library_type.as_str().to_string()
                };
                let props = main_path
                    .join(self.properties_paths()[0])
                    .to_string_lossy()
                    .to_string();
                vec![
                    ToolCommand::new([
                        "cpp-library",
                        "add",
                        url.as_str(),
                        version.as_str(),
                        "--type",
                        type_arg.as_str(),
                    ]),
                    ToolCommand::new([
                        "cpp-library",
                        "generate-linux-props",
                        "--input-file",
                        props.as_str(),
                        "--output-file",
                        props.as_str(),
                        "--library",
                        unit.library_id.as_str(),
                        "--version",
                        version.as_str(),
                    ]),
                    ToolCommand::tolerated(["cpp-library", "generate-windows-props"]),
                ]
            }
            Language::Fortran => {
                let url = unit.source.to_string();
                vec![ToolCommand::new([
                    "fortran-library",
                    "add",
                    url.as_str(),
                    version.as_str(),
                ])]
            }
            Language::Go => {
                let module = unit.source.to_string();
                vec![ToolCommand::new([
                    "go-library",
                    "add",
                    module.as_str(),
                    version.as_str(),
                ])]
            }
        }
    }

    /// Main-repo properties files this language's units touch, relative to
    /// the main working copy root.
    pub fn properties_paths(&self) -> &'static [&'static str] {
        match self.language {
            Language::C => &["etc/config/c.amazon.properties"],
            Language::Cpp => &["etc/config/c++.amazon.properties"],
            Language::Rust => &["etc/config/rust.amazon.properties"],
            Language::Fortran => &["etc/config/fortran.amazon.properties"],
            Language::Go => &["etc/config/go.amazon.properties"],
        }
    }

    /// Main-repo follow-up the tool does not write itself.
    ///
    /// Rust: `generate-rust-props` leaves a `props` file in the infra
    /// clone; its content replaces the `libs=` section of the main repo's
    /// rust properties (and the scratch file must not be committed).
    /// Fortran: the new library's properties block is appended and the
    /// `libs=` list extended.
    pub fn finalize(&self, unit: &ChangeUnit, infra_path: &Path, main_path: &Path) -> Result<()> {
        match self.language {
            Language::Rust => {
                let scratch = infra_path.join("props");
                if !scratch.exists() {
                    return Err(WizardError::Git(
                        "generate-rust-props did not produce a props file".into(),
                    ));
                }
                let new_props = std::fs::read_to_string(&scratch)?;
                std::fs::remove_file(&scratch)?;

                let props_path = main_path.join(self.properties_paths()[0]);
                let current = std::fs::read_to_string(&props_path)?;
                let updated = splice_libs_section(&current, &new_props)?;
                std::fs::write(&props_path, updated)?;
                info!("updated {}", props_path.display());
                Ok(())
            }
            Language::Fortran => {
                let props_path = main_path.join(self.properties_paths()[0]);
                let current = std::fs::read_to_string(&props_path)?;
                let url = unit.source.to_string();
                let version = self.normalize_version(unit.tag());
                let block = fortran_properties_block(&unit.library_id, &url, &version);
                let updated = update_properties_libs_line(&current, &unit.library_id);
                let updated = format!("{}\n{}\n", updated.trim_end(), block);
                std::fs::write(&props_path, updated)?;
                info!("updated {}", props_path.display());
                Ok(())
            }
            Language::C | Language::Cpp | Language::Go => Ok(()),
        }
    }
}

/// CMake build files at the checkout root mean the library builds
/// artifacts rather than shipping headers only.
fn has_cmake_build(dir: &Path) -> bool {
    dir.join("CMakeLists.txt").exists()
}

/// Add `library_id` to the colon-separated `libs=` line, idempotently.
pub fn update_properties_libs_line(content: &str, library_id: &str) -> String {
    let mut out = Vec::new();
    let mut updated = false;
    for line in content.lines() {
        if !updated {
            if let Some(libs) = line.strip_prefix("libs=") {
                updated = true;
                if !libs.split(':').any(|l| l == library_id) {
                    out.push(format!("libs={}:{}", libs, library_id));
                    continue;
                }
            }
        }
        out.push(line.to_string());
    }
    let mut result = out.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    result
}

/// Replace the `libs=`-to-tools section of a properties file with freshly
/// generated content.
fn splice_libs_section(current: &str, new_props: &str) -> Result<String> {
    let libs_start = current
        .lines()
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len() + 1;
            Some((start, line))
        })
        .find(|(_, line)| line.starts_with("libs="))
        .map(|(start, _)| start)
        .ok_or_else(|| WizardError::Git("no libs= line in properties file".into()))?;

    // The libs section ends at the delimiter banner or the tools= line,
    // whichever comes first.
    let tail = &current[libs_start..];
    let mut libs_end = current.len();
    for marker in ["\n#################################", "\ntools="] {
        if let Some(pos) = tail.find(marker) {
            libs_end = libs_end.min(libs_start + pos + 1);
        }
    }

    let mut new_props = new_props.to_string();
    if !new_props.ends_with('\n') {
        new_props.push('\n');
    }

    Ok(format!(
        "{}{}{}",
        &current[..libs_start],
        new_props,
        &current[libs_end..]
    ))
}

/// Properties block for a newly added Fortran library.
fn fortran_properties_block(library_id: &str, url: &str, version: &str) -> String {
    let version_key = version_to_key(version);
    format!(
        "libs.{id}.name={id}\n\
         libs.{id}.url={url}\n\
         libs.{id}.staticliblink={id}\n\
         libs.{id}.versions={key}\n\
         libs.{id}.packagedheaders=true\n\
         libs.{id}.versions.{key}.version={version}",
        id = library_id,
        url = url,
        key = version_key,
        version = version
    )
}

/// Properties version keys are the version lowercased with everything but
/// letters and digits removed.
pub fn version_to_key(version: &str) -> String {
    version
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeUnit, LibrarySource};
    use tempfile::TempDir;

    fn cpp_unit(type_override: Option<LibraryType>) -> ChangeUnit {
        ChangeUnit::new(
            Language::Cpp,
            LibrarySource::GithubUrl("https://github.com/fmtlib/fmt".into()),
            "10.2.1",
            type_override,
        )
        .unwrap()
    }

    #[test]
    fn test_detect_type_cmake_means_buildable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("CMakeLists.txt"), "project(fmt)\n").unwrap();
        let handler = LibraryHandler::new(Language::Cpp);
        assert_eq!(
            handler.detect_type(&cpp_unit(None), Some(dir.path())),
            LibraryType::Static
        );
    }

    #[test]
    fn test_detect_type_no_cmake_means_header_only() {
        let dir = TempDir::new().unwrap();
        let handler = LibraryHandler::new(Language::Cpp);
        assert_eq!(
            handler.detect_type(&cpp_unit(None), Some(dir.path())),
            LibraryType::HeaderOnly
        );
    }

    #[test]
    fn test_detect_type_override_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("CMakeLists.txt"), "project(fmt)\n").unwrap();
        let handler = LibraryHandler::new(Language::Cpp);
        assert_eq!(
            handler.detect_type(&cpp_unit(Some(LibraryType::HeaderOnly)), Some(dir.path())),
            LibraryType::HeaderOnly
        );
    }

    #[test]
    fn test_rust_tool_commands() {
        let unit = ChangeUnit::new(
            Language::Rust,
            LibrarySource::Name("serde".into()),
            "1.0.195",
            None,
        )
        .unwrap();
        let handler = LibraryHandler::new(Language::Rust);
        let commands =
            handler.tool_commands(&unit, LibraryType::PackagedHeaders, Path::new("/work/main"));
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].args, vec!["add-crate", "serde", "1.0.195"]);
        assert_eq!(commands[1].args, vec!["generate-rust-props"]);
        assert!(!commands[0].allow_failure);
    }

    #[test]
    fn test_cpp_tool_commands_carry_type_and_props_paths() {
        let handler = LibraryHandler::new(Language::Cpp);
        let commands = handler.tool_commands(
            &cpp_unit(None),
            LibraryType::Static,
            Path::new("/work/main"),
        );
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].args[..2], ["cpp-library", "add"]);
        assert!(commands[0].args.contains(&"--type".to_string()));
        assert!(commands[0].args.contains(&"static".to_string()));
        assert!(commands[1]
            .args
            .iter()
            .any(|a| a.ends_with("etc/config/c++.amazon.properties")));
        // Windows props generation may fail without failing the unit.
        assert!(commands[2].allow_failure);
    }

    #[test]
    fn test_c_uses_cshared_type() {
        let unit = ChangeUnit::new(
            Language::C,
            LibrarySource::GithubUrl("https://github.com/madler/zlib".into()),
            "1.3.1",
            None,
        )
        .unwrap();
        let handler = LibraryHandler::new(Language::C);
        let commands = handler.tool_commands(&unit, LibraryType::Shared, Path::new("/m"));
        assert!(commands[0].args.contains(&"cshared".to_string()));
    }

    #[test]
    fn test_tool_commands_prefer_resolved_tag() {
        // The repo tags v-prefixed, the user asked without; the matched
        // tag is what reaches ce_install.
        let unit = cpp_unit(None).with_resolved_tag("v10.2.1");
        let handler = LibraryHandler::new(Language::Cpp);
        let commands =
            handler.tool_commands(&unit, LibraryType::HeaderOnly, Path::new("/work/main"));
        assert!(commands[0].args.contains(&"v10.2.1".to_string()));
        assert!(!commands[0].args.contains(&"10.2.1".to_string()));
    }

    #[test]
    fn test_go_version_gets_v_prefix() {
        let handler = LibraryHandler::new(Language::Go);
        assert_eq!(handler.normalize_version("1.6.0"), "v1.6.0");
        assert_eq!(handler.normalize_version("v1.6.0"), "v1.6.0");

        let rust = LibraryHandler::new(Language::Rust);
        assert_eq!(rust.normalize_version("1.0.195"), "1.0.195");
    }

    #[test]
    fn test_update_properties_libs_line_appends_once() {
        let content = "compilers=gcc\nlibs=fmt:abseil\ntools=\n";
        let updated = update_properties_libs_line(content, "zlib");
        assert!(updated.contains("libs=fmt:abseil:zlib"));
        // Idempotent
        let again = update_properties_libs_line(&updated, "zlib");
        assert_eq!(updated, again);
    }

    #[test]
    fn test_splice_libs_section_replaces_up_to_tools() {
        let current = "header\nlibs=old_a:old_b\nlibs.old_a.name=A\ntools=none\nfooter\n";
        let updated = splice_libs_section(current, "libs=new\nlibs.new.name=N").unwrap();
        assert!(updated.starts_with("header\nlibs=new\n"));
        assert!(updated.contains("libs.new.name=N"));
        assert!(!updated.contains("old_a"));
        assert!(updated.contains("tools=none"));
        assert!(updated.contains("footer"));
    }

    #[test]
    fn test_splice_libs_section_requires_libs_line() {
        let err = splice_libs_section("no libs here\n", "libs=x\n").unwrap_err();
        assert!(err.to_string().contains("libs="));
    }

    #[test]
    fn test_fortran_properties_block() {
        let block = fortran_properties_block(
            "json_fortran",
            "https://github.com/jacobwilliams/json-fortran",
            "8.3.0",
        );
        assert!(block.contains("libs.json_fortran.versions=830"));
        assert!(block.contains("libs.json_fortran.versions.830.version=8.3.0"));
        assert!(block.contains("packagedheaders=true"));
    }

    #[test]
    fn test_version_to_key() {
        assert_eq!(version_to_key("8.3.0"), "830");
        assert_eq!(version_to_key("v1.2.3-RC1"), "v123rc1");
    }

    #[test]
    fn test_rust_finalize_splices_props(){
        let infra = TempDir::new().unwrap();
        let main = TempDir::new().unwrap();
        std::fs::create_dir_all(main.path().join("etc/config")).unwrap();
        std::fs::write(
            main.path().join("etc/config/rust.amazon.properties"),
            "compilers=rustc\nlibs=old\ntools=\n",
        )
        .unwrap();
        std::fs::write(infra.path().join("props"), "libs=old:serde\nlibs.serde.name=serde")
            .unwrap();

        let unit = ChangeUnit::new(
            Language::Rust,
            LibrarySource::Name("serde".into()),
            "1.0.195",
            None,
        )
        .unwrap();
        let handler = LibraryHandler::new(Language::Rust);
        handler.finalize(&unit, infra.path(), main.path()).unwrap();

        let updated =
            std::fs::read_to_string(main.path().join("etc/config/rust.amazon.properties")).unwrap();
        assert!(updated.contains("libs=old:serde"));
        assert!(updated.contains("libs.serde.name=serde"));
        // Scratch file must not survive to be committed.
        assert!(!infra.path().join("props").exists());
    }
}
