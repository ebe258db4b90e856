// src/cli/handlers/run.rs

use crate::cli::handlers::commons;
use crate::core::binder::{self, usage_line};
use crate::state::AppState;
use crate::system::executor;
use anyhow::{Result, anyhow};
use colored::*;
use log::LevelFilter;

///
/// Main entry point for the `run` command.
/// The first argument is the script name; everything after it is the script's
/// own token vector and is bound against its schema.
///
pub fn handle(mut args: Vec<String>, state: &mut AppState) -> Result<()> {
    if args.is_empty() {
        return Err(anyhow!(
            "Missing script name. Usage: runsh run <script> [args...]"
        ));
    }
    let script_name = args.remove(0);
    let tokens = args;

    let shell = state.config()?.config.shell.clone();
    let quiet = state.quiet();
    let reserved = state.reserved().clone();
    let registry = state.registry()?;

    let command = registry
        .get(&script_name)
        .ok_or_else(|| commons::unknown_script(registry, &script_name))?;

    // The binding error stays downcastable under the usage context.
    let invocation = binder::bind(&command.schema, &tokens, &reserved).map_err(|e| {
        let message = format!(
            "{}\n\n{} runsh {}\nRun 'runsh help {}' for details.",
            e,
            "Usage:".yellow().bold(),
            usage_line(&command.schema),
            script_name
        );
        anyhow::Error::new(e).context(message)
    })?;

    if invocation.builtins.help {
        print!("{}", commons::render_help(command, &reserved));
        return Ok(());
    }
    if invocation.builtins.version {
        println!("runsh {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let quiet = quiet || invocation.builtins.quiet;
    if invocation.builtins.quiet {
        log::set_max_level(LevelFilter::Error);
    } else if invocation.builtins.verbose {
        log::set_max_level(log::max_level().max(LevelFilter::Debug));
    }
    commons::print_shadowing(quiet, registry, &script_name);
    commons::print_command_warnings(quiet, command);

    log::debug!("Running '{}' from {}", script_name, command.origin);
    executor::run_script(&script_name, &command.content, &shell, &invocation)?;
    Ok(())
}

// MARK: --- UNIT TESTS ---
