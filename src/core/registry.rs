//! # Command Registry
//!
//! Compiles discovered scripts (parse, then validate) and indexes them by
//! command name. Local scripts and cached remote scripts are merged here; when
//! both provide the same name, the local script wins and the remote one is
//! recorded as shadowed.

use crate::constants::SCRIPT_EXTENSION;
use crate::core::annotations::{ParseWarning, parse_annotations};
use crate::core::reserved::ReservedSet;
use crate::core::validator::{SchemaValidationError, SchemaWarning, validate};
use crate::models::{CommandSchema, ScriptOrigin, ScriptText};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised while discovering local scripts.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The scripts directory does not exist.
    #[error("scripts directory '{0}' does not exist")]
    MissingDirectory(PathBuf),
    /// The scripts path is a file.
    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),
    /// A script could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A script that made it into the registry.
#[derive(Debug, Clone)]
pub struct RegisteredCommand {
    /// The validated schema.
    pub schema: CommandSchema,
    /// Where the script came from.
    pub origin: ScriptOrigin,
    /// The script text handed to the shell.
    pub content: String,
    /// Annotation lines that were skipped.
    pub parse_warnings: Vec<ParseWarning>,
    /// Adjustments made by the validator.
    pub schema_warnings: Vec<SchemaWarning>,
}

impl RegisteredCommand {
    /// Parse and schema warnings of this script, one line each.
    pub fn warnings(&self) -> Vec<String> {
        let name = &self.schema.name;
        self.parse_warnings
            .iter()
            .map(|w| format!("script '{}', {}", name, w))
            .chain(
                self.schema_warnings
                    .iter()
                    .map(|w| format!("script '{}': {}", name, w)),
            )
            .collect()
    }
}

/// A script rejected by the validator.
#[derive(Debug, Clone)]
pub struct ExcludedScript {
    /// Script name.
    pub name: String,
    /// Where the script came from.
    pub origin: ScriptOrigin,
    /// Why it was rejected.
    pub reason: SchemaValidationError,
}

/// A remote script hidden by a local script of the same name.
#[derive(Debug, Clone)]
pub struct ShadowedScript {
    /// Script name.
    pub name: String,
    /// The remote script that is no longer reachable.
    pub hidden: ScriptOrigin,
    /// The local script that replaces it.
    pub by: ScriptOrigin,
}

/// Parses and validates one script.
pub fn compile_script(
    text: ScriptText,
    reserved: &ReservedSet,
) -> Result<RegisteredCommand, ExcludedScript> {
    let (schema, parse_warnings) = parse_annotations(&text.name, &text.content).into_parts();
    match validate(schema, reserved) {
        Ok(validated) => Ok(RegisteredCommand {
            schema: validated.schema,
            origin: text.origin,
            content: text.content,
            parse_warnings,
            schema_warnings: validated.warnings,
        }),
        Err(reason) => Err(ExcludedScript {
            name: text.name,
            origin: text.origin,
            reason,
        }),
    }
}

/// Reads every `.sh` file directly inside `dir`, sorted by file name.
pub fn discover_local(dir: &Path) -> Result<Vec<ScriptText>, RegistryError> {
    if !dir.exists() {
        return Err(RegistryError::MissingDirectory(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(RegistryError::NotADirectory(dir.to_path_buf()));
    }

    let mut scripts = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| RegistryError::Read {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        let is_script = entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == SCRIPT_EXTENSION);
        if !is_script {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let bytes = fs::read(path).map_err(|e| RegistryError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        scripts.push(ScriptText {
            name,
            content: String::from_utf8_lossy(&bytes).into_owned(),
            origin: ScriptOrigin::Local(path.to_path_buf()),
        });
    }
    log::debug!("Discovered {} scripts in '{}'", scripts.len(), dir.display());
    Ok(scripts)
}

/// The set of commands available for one run.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    commands: BTreeMap<String, RegisteredCommand>,
    excluded: Vec<ExcludedScript>,
    shadowed: Vec<ShadowedScript>,
}

impl Registry {
    /// Compiles `local` and `remote` scripts into one registry.
    pub fn build(local: Vec<ScriptText>, remote: Vec<ScriptText>, reserved: &ReservedSet) -> Self {
        let mut registry = Self::default();
        let local_names: HashSet<String> = local.iter().map(|s| s.name.clone()).collect();

        for text in remote {
            if local_names.contains(&text.name) {
                let by = local
                    .iter()
                    .find(|l| l.name == text.name)
                    .map(|l| l.origin.clone())
                    .unwrap_or_else(|| text.origin.clone());
                registry.shadowed.push(ShadowedScript {
                    name: text.name,
                    hidden: text.origin,
                    by,
                });
                continue;
            }
            registry.add(text, reserved);
        }
        for text in local {
            registry.add(text, reserved);
        }

        registry.excluded.sort_by(|a, b| a.name.cmp(&b.name));
        registry.shadowed.sort_by(|a, b| a.name.cmp(&b.name));
        registry
    }

    fn add(&mut self, text: ScriptText, reserved: &ReservedSet) {
        match compile_script(text, reserved) {
            Ok(command) => {
                self.commands.insert(command.schema.name.clone(), command);
            }
            Err(excluded) => {
                log::debug!("Excluding '{}': {}", excluded.name, excluded.reason);
                self.excluded.push(excluded);
            }
        }
    }

    /// Looks up a registered command by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredCommand> {
        self.commands.get(name)
    }

    /// Registered commands, sorted by name.
    pub fn commands(&self) -> impl Iterator<Item = &RegisteredCommand> {
        self.commands.values()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no command was registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Scripts rejected by the validator.
    pub fn excluded(&self) -> &[ExcludedScript] {
        &self.excluded
    }

    /// The rejection record of `name`, if it was rejected.
    pub fn excluded_by_name(&self, name: &str) -> Option<&ExcludedScript> {
        self.excluded.iter().find(|e| e.name == name)
    }

    /// Remote scripts hidden by local ones.
    pub fn shadowed(&self) -> &[ShadowedScript] {
        &self.shadowed
    }

    /// Every non-fatal problem found while building, one line each.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .commands
            .values()
            .flat_map(RegisteredCommand::warnings)
            .collect();
        for excluded in &self.excluded {
            lines.push(format!(
                "script '{}' was excluded: {}",
                excluded.name, excluded.reason
            ));
        }
        for shadowed in &self.shadowed {
            lines.push(format!(
                "script '{}' ({}) is shadowed by {}",
                shadowed.name, shadowed.hidden, shadowed.by
            ));
        }
        lines
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn local(name: &str, content: &str) -> ScriptText {
        ScriptText {
            name: name.to_string(),
            content: content.to_string(),
            origin: ScriptOrigin::Local(PathBuf::from(format!("/scripts/{}.sh", name))),
        }
    }

    fn remote(name: &str, content: &str) -> ScriptText {
        ScriptText {
            name: name.to_string(),
            content: content.to_string(),
            origin: ScriptOrigin::Remote {
                cache_key: "github_o_r_main_root_00000000".to_string(),
                path: PathBuf::from(format!("/cache/{}.sh", name)),
            },
        }
    }

    #[test]
    fn test_invalid_script_is_excluded_others_survive() {
        let registry = Registry::build(
            vec![
                local("good", "# @arg name: n\n"),
                local("bad", "# @arg a [optional]: a\n# @arg b: b\n"),
                local("dup", "# @arg x: x\n# @option x [flag]: x\n"),
            ],
            Vec::new(),
            &ReservedSet::standard(),
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get("good").is_some());
        assert!(registry.get("bad").is_none());

        let excluded: Vec<&str> = registry.excluded().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(excluded, vec!["bad", "dup"]);
        assert!(matches!(
            registry.excluded_by_name("bad").unwrap().reason,
            SchemaValidationError::PositionalOrder { .. }
        ));
    }

    #[test]
    fn test_local_shadows_remote() {
        let registry = Registry::build(
            vec![local("deploy", "# @description: local deploy\n")],
            vec![
                remote("deploy", "# @description: remote deploy\n"),
                remote("lint", "# @description: remote lint\n"),
            ],
            &ReservedSet::standard(),
        );
        let deploy = registry.get("deploy").unwrap();
        assert_eq!(deploy.schema.description, "local deploy");
        assert!(matches!(deploy.origin, ScriptOrigin::Local(_)));
        assert!(matches!(
            registry.get("lint").unwrap().origin,
            ScriptOrigin::Remote { .. }
        ));
        assert_eq!(registry.shadowed().len(), 1);
        assert!(
            registry
                .diagnostics()
                .iter()
                .any(|d| d.contains("'deploy'") && d.contains("shadowed"))
        );
    }

    #[test]
    fn test_warnings_surface_as_diagnostics() {
        let registry = Registry::build(
            vec![local(
                "noisy",
                "# @option verbose-mode,v [flag]: v\n# @arg [optional]: broken\n",
            )],
            Vec::new(),
            &ReservedSet::standard(),
        );
        let command = registry.get("noisy").unwrap();
        assert_eq!(command.parse_warnings.len(), 1);
        assert_eq!(command.schema_warnings.len(), 1);
        assert_eq!(registry.diagnostics().len(), 2);
    }

    #[test]
    fn test_discover_local() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("zeta.sh"), "# @description: last\n").unwrap();
        fs::write(dir.path().join("alpha.sh"), "echo alpha\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("inner.sh"), "ignored").unwrap();

        let scripts = discover_local(dir.path()).unwrap();
        let names: Vec<&str> = scripts.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(
            scripts[0].origin,
            ScriptOrigin::Local(dir.path().join("alpha.sh"))
        );

        let registry = Registry::build(scripts, Vec::new(), &ReservedSet::standard());
        let summaries: Vec<String> = registry.commands().map(|c| c.schema.summary()).collect();
        assert_eq!(summaries, vec!["Run alpha script", "last"]);
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            discover_local(&dir.path().join("absent")),
            Err(RegistryError::MissingDirectory(_))
        ));
    }
}
