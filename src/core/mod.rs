// src/core/mod.rs

pub mod annotations;
pub mod binder;
pub mod cache;
pub mod config_loader;
/// Config and cache directory locations.
pub mod paths;
pub mod registry;
pub mod remote;
/// Shortcuts and long names claimed by runsh.
pub mod reserved;
pub mod source;
pub mod validator;
