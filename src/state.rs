// src/state.rs

use crate::cli::handlers::commons;
use crate::core::cache::{CacheManager, CachePolicy};
use crate::core::config_loader::{self, LoadedConfig};
use crate::core::registry::{self, Registry, RegistryError};
use crate::core::remote::GithubClient;
use crate::core::reserved::ReservedSet;
use crate::core::source::{RemoteSource, SourceDescriptor};
use crate::dev_utils::BlockTimer;
use crate::models::ScriptText;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Per-run application state.
///
/// Configuration and the command registry are resolved on first use, so
/// commands like `init` work even when no valid configuration exists yet.
#[derive(Debug)]
pub struct AppState {
    config_flag: Option<PathBuf>,
    quiet: bool,
    reserved: ReservedSet,
    loaded: Option<LoadedConfig>,
    registry: Option<Registry>,
}

impl AppState {
    /// A state that will load the configuration from `config_flag` or the usual lookup.
    pub fn new(config_flag: Option<PathBuf>, quiet: bool) -> Self {
        Self {
            config_flag,
            quiet,
            reserved: ReservedSet::standard(),
            loaded: None,
            registry: None,
        }
    }

    /// Builds a state around an already loaded configuration.
    pub fn with_config(loaded: LoadedConfig, quiet: bool) -> Self {
        Self {
            loaded: Some(loaded),
            ..Self::new(None, quiet)
        }
    }

    /// Whether `-q` was given to runsh itself.
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    /// The reserved shortcuts and long names.
    pub fn reserved(&self) -> &ReservedSet {
        &self.reserved
    }

    /// The effective configuration, loaded on first access.
    pub fn config(&mut self) -> Result<&LoadedConfig> {
        let loaded = match self.loaded.take() {
            Some(loaded) => loaded,
            None => config_loader::load(self.config_flag.as_deref())
                .context("Failed to load configuration")?,
        };
        Ok(self.loaded.insert(loaded))
    }

    /// The command registry, resolved on first access.
    pub fn registry(&mut self) -> Result<&Registry> {
        let registry = match self.registry.take() {
            Some(registry) => registry,
            None => {
                let loaded = self.config()?.clone();
                self.build_registry(&loaded)?
            }
        };
        Ok(self.registry.insert(registry))
    }

    /// A cache manager for the configured cache root and GitHub settings.
    pub fn cache_manager(&mut self) -> Result<CacheManager<GithubClient>> {
        let loaded = self.config()?;
        let github = &loaded.config.github;
        let token = std::env::var(&github.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        log::debug!(
            "GitHub token from ${}: {}",
            github.token_env,
            if token.is_some() { "set" } else { "not set" }
        );
        let client = GithubClient::new(&github.api_base, token.as_deref(), github.timeout())
            .context("Failed to create the GitHub client")?;
        Ok(CacheManager::new(
            loaded.cache_root.clone(),
            client,
            CachePolicy::default(),
        ))
    }

    fn build_registry(&mut self, loaded: &LoadedConfig) -> Result<Registry> {
        let _timer = BlockTimer::new("registry resolution");
        let (local, remote) = match &loaded.descriptor {
            SourceDescriptor::Local { path } => (self.local_scripts(path)?, Vec::new()),
            SourceDescriptor::Remote(source) => {
                let remote = self.remote_scripts(source)?;
                let local = match &loaded.local_overlay {
                    Some(dir) => self.local_scripts(dir)?,
                    None => Vec::new(),
                };
                (local, remote)
            }
        };
        let registry = Registry::build(local, remote, &self.reserved);
        log::debug!(
            "Registry ready: {} commands, {} excluded, {} shadowed",
            registry.len(),
            registry.excluded().len(),
            registry.shadowed().len()
        );
        Ok(registry)
    }

    /// A missing directory is reported and treated as empty.
    fn local_scripts(&self, dir: &Path) -> Result<Vec<ScriptText>> {
        match registry::discover_local(dir) {
            Ok(scripts) => Ok(scripts),
            Err(RegistryError::MissingDirectory(path)) => {
                commons::print_warning(
                    self.quiet,
                    &format!(
                        "scripts directory '{}' does not exist; no local scripts loaded",
                        path.display()
                    ),
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remote_scripts(&mut self, source: &RemoteSource) -> Result<Vec<ScriptText>> {
        let manager = self.cache_manager()?;
        let resolution = manager
            .resolve(source)
            .with_context(|| format!("Could not load scripts from {}", source.source_url()))?;
        if let Some(warning) = resolution.warning() {
            commons::print_warning(self.quiet, &warning);
        }
        Ok(resolution.into_entry().to_script_texts())
    }
}

// MARK: --- UNIT TESTS ---
