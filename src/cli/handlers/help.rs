// src/cli/handlers/help.rs

use crate::cli::handlers::commons;
use crate::state::AppState;
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Shows the usage of a script.")]
struct HelpArgs {
    /// The script to describe.
    script: String,
}

/// The main handler for the `help` command.
pub fn handle(args: Vec<String>, state: &mut AppState) -> Result<()> {
    let help_args = HelpArgs::try_parse_from(&args)?;
    let quiet = state.quiet();
    let reserved = state.reserved().clone();
    let registry = state.registry()?;

    let command = registry
        .get(&help_args.script)
        .ok_or_else(|| commons::unknown_script(registry, &help_args.script))?;
    commons::print_shadowing(quiet, registry, &help_args.script);
    commons::print_command_warnings(quiet, command);
    print!("{}", commons::render_help(command, &reserved));
    Ok(())
}
