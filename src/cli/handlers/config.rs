// src/cli/handlers/config.rs

use crate::core::source::SourceDescriptor;
use crate::state::AppState;
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Displays the effective configuration and the resolved script source."
)]
struct ConfigArgs {
    /// Print the effective configuration as TOML instead.
    #[arg(long)]
    toml: bool,
}

/// The main handler for the `config` command.
pub fn handle(args: Vec<String>, state: &mut AppState) -> Result<()> {
    let config_args = ConfigArgs::try_parse_from(&args)?;
    let loaded = state.config()?;

    if config_args.toml {
        let rendered =
            toml::to_string_pretty(&loaded.config).context("Failed to render configuration")?;
        print!("{}", rendered);
        return Ok(());
    }

    let config = &loaded.config;
    let label = |text: &str| format!("{:<12}", text).blue();

    println!("\n--- {} ---", "runsh configuration".yellow());
    println!("  {} {}", label("loaded from"), loaded.origin);
    println!("  {} {}", label("scripts_dir"), config.scripts_dir);
    match &loaded.descriptor {
        SourceDescriptor::Local { path } => {
            println!("  {} local directory {}", label("source"), path.display());
        }
        SourceDescriptor::Remote(source) => {
            println!("  {} {}", label("source"), source.source_url().cyan());
            println!(
                "  {} {}/{} @ {} ({})",
                label("repository"),
                source.owner,
                source.repo,
                source.branch,
                if source.subpath.is_empty() {
                    "/"
                } else {
                    source.subpath.as_str()
                }
            );
            println!("  {} {}", label("cache key"), source.cache_key());
            if let Some(overlay) = &loaded.local_overlay {
                println!("  {} {}", label("local_dir"), overlay.display());
            }
        }
    }
    println!("  {} {}", label("shell"), config.shell);
    println!("  {} {}", label("cache root"), loaded.cache_root.display());
    println!("  {} {}", label("github api"), config.github.api_base);
    let token_state = if std::env::var(&config.github.token_env).is_ok_and(|t| !t.is_empty()) {
        "set".green()
    } else {
        "not set".dimmed()
    };
    println!(
        "  {} ${} ({})",
        label("token"),
        config.github.token_env,
        token_state
    );
    println!("  {} {}s", label("timeout"), config.github.timeout().as_secs());
    Ok(())
}
