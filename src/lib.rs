//! # runsh
//!
//! Turns a directory of annotated shell scripts, local or in a GitHub
//! repository, into a set of self-documenting CLI commands.

/// Command-line surface: argument parsing, dispatch and handlers.
pub mod cli;
/// File names, defaults and limits shared across the crate.
pub mod constants;
/// Script parsing, binding, sources, caching and the registry.
pub mod core;
/// Timing helpers for trace logging.
pub mod dev_utils;
/// Data types shared between layers.
pub mod models;
/// Per-run application state.
pub mod state;
pub mod system;
