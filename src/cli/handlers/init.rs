// src/cli/handlers/init.rs

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::Colorize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_SCRIPTS_DIR, PROJECT_CONFIG_FILENAME, SCRIPT_EXTENSION};
use crate::core::config_loader::RunshConfig;
use crate::state::AppState;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Creates a runsh.toml and a starter script in the current directory."
)]
struct InitArgs {
    /// Overwrite existing files.
    #[arg(long)]
    force: bool,
}

const HELLO_SCRIPT: &str = r#"#!/usr/bin/env bash
# @description: Print a friendly greeting
# @arg name [default=world]: who to greet
# @option shout,s [flag]: print in uppercase

message="Hello, ${NAME}!"
if [ "${SHOUT}" = "1" ]; then
    message=$(printf '%s' "$message" | tr '[:lower:]' '[:upper:]')
fi
echo "$message"
"#;

/// The main handler for the `init` command.
pub fn handle(args: Vec<String>, _state: &mut AppState) -> Result<()> {
    let init_args = InitArgs::try_parse_from(&args)?;
    let target_dir = env::current_dir().context("Could not determine the current directory")?;
    println!("Initializing runsh in: {}", target_dir.display());

    let written = init_project(&target_dir, init_args.force)?;
    for path in &written {
        println!("  {} {}", "✔".green(), path.display());
    }
    println!("\nTry it: {}", "runsh hello --shout Ada".cyan().bold());
    Ok(())
}

/// Writes the starter configuration and script into `dir`.
fn init_project(dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let config_path = dir.join(PROJECT_CONFIG_FILENAME);
    let scripts_dir = dir.join(DEFAULT_SCRIPTS_DIR.trim_start_matches("./"));
    let script_path = scripts_dir.join(format!("hello.{}", SCRIPT_EXTENSION));

    if !force {
        if let Some(existing) = [&config_path, &script_path].into_iter().find(|p| p.exists()) {
            return Err(anyhow!(
                "'{}' already exists. Use --force to overwrite it.",
                existing.display()
            ));
        }
    }

    let config = toml::to_string_pretty(&RunshConfig::default())
        .context("Failed to render the default configuration")?;
    fs::write(&config_path, config)
        .with_context(|| format!("Failed to write '{}'", config_path.display()))?;

    fs::create_dir_all(&scripts_dir)
        .with_context(|| format!("Failed to create '{}'", scripts_dir.display()))?;
    fs::write(&script_path, HELLO_SCRIPT)
        .with_context(|| format!("Failed to write '{}'", script_path.display()))?;

    Ok(vec![config_path, script_path])
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config_loader::load_from;
    use crate::core::registry::{Registry, discover_local};
    use crate::core::reserved::ReservedSet;
    use crate::core::source::SourceDescriptor;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_loadable_project() {
        let dir = tempdir().unwrap();
        let written = init_project(dir.path(), false).unwrap();
        assert_eq!(written.len(), 2);

        let loaded = load_from(None, |_| None, dir.path(), None).unwrap();
        let SourceDescriptor::Local { path } = &loaded.descriptor else {
            panic!("expected a local source, got {:?}", loaded.descriptor);
        };
        let registry = Registry::build(
            discover_local(path).unwrap(),
            Vec::new(),
            &ReservedSet::standard(),
        );
        let hello = registry.get("hello").unwrap();
        assert!(hello.parse_warnings.is_empty());
        assert!(hello.schema_warnings.is_empty());
        assert_eq!(hello.schema.positionals.len(), 1);
        assert_eq!(hello.schema.options.len(), 1);
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_CONFIG_FILENAME), "shell = \"sh\"\n").unwrap();

        let err = init_project(dir.path(), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(
            fs::read_to_string(dir.path().join(PROJECT_CONFIG_FILENAME)).unwrap(),
            "shell = \"sh\"\n"
        );

        init_project(dir.path(), true).unwrap();
        assert!(dir.path().join("scripts").join("hello.sh").is_file());
    }
}
