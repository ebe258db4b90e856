// src/cli/handlers/cache.rs

use crate::core::cache::{CacheState, format_age};
use crate::core::source::SourceDescriptor;
use crate::state::AppState;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Confirm, theme::ColorfulTheme};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Inspects or clears the remote script cache.")]
struct CacheArgs {
    #[command(subcommand)]
    action: CacheAction,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Shows every cache entry with its age and state.
    Status,
    /// Removes the entry of the configured source, or every entry with --all.
    Clean {
        /// Remove every entry under the cache root.
        #[arg(long)]
        all: bool,
        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
}

/// The main handler for the `cache` command.
pub fn handle(args: Vec<String>, state: &mut AppState) -> Result<()> {
    let cache_args = CacheArgs::try_parse_from(&args)?;
    match cache_args.action {
        CacheAction::Status => status(state),
        CacheAction::Clean { all, yes } => clean(state, all, yes),
    }
}

fn status(state: &mut AppState) -> Result<()> {
    let current_key = match &state.config()?.descriptor {
        SourceDescriptor::Remote(source) => Some(source.cache_key()),
        SourceDescriptor::Local { .. } => None,
    };
    let manager = state.cache_manager()?;
    let entries = manager.entries().context("Failed to read the cache")?;
    let ttl = manager.policy().ttl;
    let now = Utc::now();

    println!(
        "\n--- {} {} ---",
        "Cache at".yellow(),
        manager.root().display().to_string().bold()
    );
    if entries.is_empty() {
        println!("  {}", "No cache entries.".dimmed());
        return Ok(());
    }

    for entry in &entries {
        let state_label = match CacheState::classify(Some(&entry.meta), now, ttl) {
            CacheState::Valid => "Valid".green(),
            _ => "Expired".yellow(),
        };
        let marker = if current_key.as_deref() == Some(entry.key.as_str()) {
            "*".cyan().bold()
        } else {
            " ".normal()
        };
        println!("{} {}", marker, entry.key.bold());
        println!("    {} {}", format!("{:<8}", "source").blue(), entry.meta.source_url);
        println!(
            "    {} {} script(s), cached {} ago, {}",
            format!("{:<8}", "content").blue(),
            entry.meta.script_count,
            format_age(entry.age(now)),
            state_label
        );
    }
    Ok(())
}

fn clean(state: &mut AppState, all: bool, yes: bool) -> Result<()> {
    let descriptor = state.config()?.descriptor.clone();
    let manager = state.cache_manager()?;

    if all {
        if !yes {
            let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!(
                    "Remove every cache entry under '{}'?",
                    manager.root().display()
                ))
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{}", "Aborted.".yellow());
                return Ok(());
            }
        }
        let removed = manager.clean_all().context("Failed to clean the cache")?;
        println!(
            "{} Removed {} cache entr{}.",
            "✔".green(),
            removed,
            if removed == 1 { "y" } else { "ies" }
        );
        return Ok(());
    }

    match descriptor {
        SourceDescriptor::Remote(source) => {
            if manager.clean(&source).context("Failed to clean the cache")? {
                println!("{} Removed cache entry '{}'.", "✔".green(), source.cache_key());
            } else {
                println!("No cache entry for {}.", source.source_url());
            }
        }
        SourceDescriptor::Local { path } => {
            println!(
                "The configured source '{}' is local and has no cache entry. Use '{}' to clear other entries.",
                path.display(),
                "runsh cache clean --all".bold()
            );
        }
    }
    Ok(())
}
