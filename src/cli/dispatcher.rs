// src/cli/dispatcher.rs

use anyhow::Result;

use crate::{cli::handlers, state::AppState};

// --- Command Definition and Registry ---

/// Defines a built-in command, its aliases, and its handler.
/// Every handler receives the remaining arguments and the per-run state.
pub struct CommandDefinition {
    /// Primary name, as typed on the command line.
    pub name: &'static str,
    /// Alternative names.
    pub aliases: &'static [&'static str],
    /// Argument synopsis shown in the top-level help.
    pub usage: &'static str,
    /// One-line summary.
    pub about: &'static str,
    /// Runs the command.
    pub handler: Handler,
}

/// The entry point of a built-in command.
pub type Handler = fn(Vec<String>, &mut AppState) -> Result<()>;

impl std::fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// The single source of truth for all built-in commands.
/// Any first argument not listed here is taken as a script name.
pub static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        usage: "[--warnings]",
        about: "List the available scripts",
        handler: handlers::list::handle,
    },
    CommandDefinition {
        name: "help",
        aliases: &[],
        usage: "<script>",
        about: "Show the usage of a script",
        handler: handlers::help::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        usage: "<script> [args...]",
        about: "Run a script (same as 'runsh <script>')",
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "cache",
        aliases: &[],
        usage: "status | clean [--all] [--yes]",
        about: "Inspect or clear the remote script cache",
        handler: handlers::cache::handle,
    },
    CommandDefinition {
        name: "config",
        aliases: &[],
        usage: "[--toml]",
        about: "Show the effective configuration",
        handler: handlers::config::handle,
    },
    CommandDefinition {
        name: "init",
        aliases: &[],
        usage: "[--force]",
        about: "Create runsh.toml and a starter script",
        handler: handlers::init::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
pub fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Whether `name` is taken by a built-in command.
pub fn is_builtin(name: &str) -> bool {
    find_command(name).is_some()
}

/// Decides which handler receives `args` and with which arguments.
///
/// - `runsh` alone lists the scripts.
/// - `runsh <command> [args...]` runs a built-in command.
/// - `runsh <script> [tokens...]` is a shortcut for `run`.
fn route(mut args: Vec<String>) -> (&'static str, Handler, Vec<String>) {
    let Some(first) = args.first() else {
        return ("list", handlers::list::handle, args);
    };
    match find_command(first) {
        Some(command) => {
            args.remove(0);
            (command.name, command.handler, args)
        }
        None => ("run", handlers::run::handle, args),
    }
}

/// The main application dispatcher.
pub fn dispatch(args: Vec<String>, state: &mut AppState) -> Result<()> {
    log::debug!("Dispatching args: {:?}", args);
    let (name, handler, handler_args) = route(args);
    log::debug!("Routed to '{}' with {:?}", name, handler_args);
    handler(handler_args, state)
}

// MARK: --- UNIT TESTS ---
