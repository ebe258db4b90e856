// src/cli/handlers/list.rs

use crate::cli::dispatcher;
use crate::cli::handlers::commons;
use crate::models::ScriptOrigin;
use crate::state::AppState;
use anyhow::Result;
use clap::Parser;
use colored::*;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Lists the available scripts and the ones that were excluded."
)]
struct ListArgs {
    /// Also print parse and schema warnings for every script.
    #[arg(long)]
    warnings: bool,
}

/// The main handler for the `list` command.
pub fn handle(args: Vec<String>, state: &mut AppState) -> Result<()> {
    let list_args = ListArgs::try_parse_from(&args)?;
    let quiet = state.quiet();
    let source = state.config()?.descriptor.to_string();
    let registry = state.registry()?;

    println!("\n--- {} {} ---", "Scripts from".yellow(), source.bold());

    if registry.is_empty() {
        println!("  {}", "No scripts found.".dimmed());
    } else {
        let width = registry
            .commands()
            .map(|c| c.schema.name.len())
            .max()
            .unwrap_or(0);
        for command in registry.commands() {
            let name = &command.schema.name;
            let origin = match command.origin {
                ScriptOrigin::Local(_) => format!("{:<6}", "local").green(),
                ScriptOrigin::Remote { .. } => format!("{:<6}", "remote").blue(),
            };
            let hint = if dispatcher::is_builtin(name) {
                format!(" (run with 'runsh run {}')", name).dimmed().to_string()
            } else {
                String::new()
            };
            println!(
                "  {}  {}  {}{}",
                format!("{:<width$}", name, width = width).cyan(),
                origin,
                command.schema.summary(),
                hint
            );
        }
    }

    if !registry.excluded().is_empty() {
        println!("\n{}", "Excluded:".red().bold());
        for excluded in registry.excluded() {
            println!("  {}  {}", excluded.name.red(), excluded.reason);
        }
    }

    if list_args.warnings {
        for line in registry.diagnostics() {
            commons::print_warning(quiet, &line);
        }
    } else {
        let count = registry
            .diagnostics()
            .len()
            .saturating_sub(registry.excluded().len());
        if count > 0 && !quiet {
            println!(
                "\n{}",
                format!("{} warning(s); run 'runsh list --warnings' to see them.", count).dimmed()
            );
        }
    }
    Ok(())
}
