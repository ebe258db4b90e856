// src/bin/runsh.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use log::LevelFilter;
use runsh::{
    cli::{Cli, dispatcher},
    core::binder::BindingError,
    state::AppState,
    system::executor::{ExecutionError, INTERRUPTED_EXIT_CODE},
};

/// Exit code for arguments that do not match a script's schema.
const USAGE_EXIT_CODE: i32 = 2;

/// The main entry point of the `runsh` application.
/// It sets up logging, parses arguments, dispatches to the correct handler,
/// and performs centralized error handling.
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run_cli(cli) {
        // --- Centralized Error Handling ---
        if let Some(exec_err) = e.downcast_ref::<ExecutionError>() {
            match exec_err {
                // The script already reported its own failure.
                ExecutionError::NonZeroExit { code, .. } => std::process::exit(*code),
                ExecutionError::Interrupted { .. } => std::process::exit(INTERRUPTED_EXIT_CODE),
                _ => {}
            }
        }

        eprintln!("\n{}: {}", "Error".red().bold(), e);
        if e.downcast_ref::<BindingError>().is_some() {
            std::process::exit(USAGE_EXIT_CODE);
        }
        std::process::exit(1);
    }
}

/// Default `warn`, raised by `-v`/`-vv` and lowered by `-q`. `RUST_LOG` wins
/// when set.
fn init_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };

    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::Builder::from_default_env().init();
        return;
    }
    // The builder accepts everything; the global max level does the
    // filtering so `run` can still adjust it per script.
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .format_timestamp(None)
        .init();
    log::set_max_level(level);
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);
    let mut state = AppState::new(cli.config, cli.quiet);
    dispatcher::dispatch(cli.args, &mut state)
}
