// src/cli/handlers/mod.rs

// One module per built-in command, plus shared output helpers.

/// `cache status` and `cache clean`.
pub mod cache;
/// Output helpers shared by the handlers.
pub mod commons;
/// `config`.
pub mod config;
/// `help <script>`.
pub mod help;
/// `init`.
pub mod init;
/// `list` / `ls`.
pub mod list;
/// `run <script>` and the bare script shortcut.
pub mod run;
