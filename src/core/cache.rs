// src/core/cache.rs

//! # Cache Manager
//!
//! Keeps one on-disk entry per remote source under the cache root:
//!
//! ```text
//! <root>/
//!   github_<owner>_<repo>_<branch>_<subpath>_<hash>/
//!     deploy.sh
//!     hello.sh
//!     .runsh-meta.json
//!   .github_..._<hash>.lock
//! ```
//!
//! Entries are fresh for [`CachePolicy::ttl`]. An expired entry is refreshed
//! on access; if the refresh fails the expired files are served with a
//! warning (see [`Resolution::Stale`]).
//!
//! Writes never touch the live entry directory. A new entry is staged in a
//! sibling temporary directory and swapped in with renames while holding the
//! per-key lock, so readers see either the old or the new entry. A swap that
//! was interrupted halfway is rolled back on the next access.

use crate::constants::{CACHE_META_FILENAME, CACHE_TTL, MAX_PARALLEL_FETCHES};
use crate::core::remote::{self, FetchError, FetchedScripts, RemoteFetcher};
use crate::core::source::RemoteSource;
use crate::dev_utils;
use crate::models::{ScriptOrigin, ScriptText};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while resolving or maintaining the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The first fetch failed and there is no entry to fall back on.
    #[error("could not fetch scripts from {source_url} and no cached copy exists: {error}")]
    Unavailable {
        source_url: String,
        #[source]
        error: FetchError,
    },
    /// A file system operation on the cache failed.
    #[error("cache I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// An entry whose metadata is missing or inconsistent.
    #[error("unreadable cache entry at '{path}': {message}")]
    Metadata { path: PathBuf, message: String },
}

/// Why an expired entry could not be replaced.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// The remote could not be listed or downloaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The download succeeded but the new entry could not be written.
    #[error("could not store the refreshed scripts: {0}")]
    Store(#[source] Box<CacheError>),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// --- DATA ---

/// The metadata record stored next to the scripts of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// The tree URL of the source.
    pub source_url: String,
    /// The listing URL the scripts were fetched from.
    pub api_url: String,
    /// Serialized as ISO-8601.
    pub cached_at: DateTime<Utc>,
    /// Must equal `scripts.len()`.
    pub script_count: usize,
    /// File names of the cached scripts.
    #[serde(default)]
    pub scripts: Vec<String>,
}

/// A complete cache entry as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The cache key, also the directory name.
    pub key: String,
    /// The live entry directory.
    pub dir: PathBuf,
    /// The metadata record.
    pub meta: CacheMeta,
    /// File name to content.
    pub files: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Time elapsed since the entry was written. Clock skew into the future
    /// counts as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.meta.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// The cached scripts, ready for the annotation parser.
    pub fn to_script_texts(&self) -> Vec<ScriptText> {
        self.files
            .iter()
            .map(|(file_name, content)| ScriptText {
                name: script_name(file_name),
                content: content.clone(),
                origin: ScriptOrigin::Remote {
                    cache_key: self.key.clone(),
                    path: self.dir.join(file_name),
                },
            })
            .collect()
    }
}

fn script_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map_or_else(|| file_name.to_string(), |s| s.to_string_lossy().into_owned())
}

// --- STATE MACHINE ---

/// The lifecycle of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No usable entry on disk.
    Missing,
    /// First download in progress.
    Fetching,
    /// Younger than the TTL.
    Valid,
    /// Older than the TTL, not yet refreshed.
    Expired,
    /// Download replacing an expired entry.
    Refreshing,
    /// Refresh failed; the expired entry is in use.
    StaleServed,
}

/// What happens to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// The entry is requested.
    Access,
    /// The new entry was written.
    FetchSucceeded,
    /// The download or the write of the new entry failed.
    FetchFailed,
    /// The entry was removed.
    Clean,
}

impl CacheState {
    /// The resting state of an entry given its metadata.
    pub fn classify(meta: Option<&CacheMeta>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let Some(meta) = meta else {
            return Self::Missing;
        };
        let age = (now - meta.cached_at).to_std().unwrap_or(Duration::ZERO);
        if age < ttl {
            Self::Valid
        } else {
            Self::Expired
        }
    }

    /// The state reached from `self` on `event`, or `None` if the event
    /// cannot happen in this state.
    pub fn on(self, event: CacheEvent) -> Option<Self> {
        use CacheEvent::*;
        use CacheState::*;
        match (self, event) {
            (_, Clean) => Some(Missing),
            (Missing, Access) => Some(Fetching),
            (Valid, Access) => Some(Valid),
            (Expired | StaleServed, Access) => Some(Refreshing),
            (Fetching | Refreshing, FetchSucceeded) => Some(Valid),
            // Nothing to fall back on.
            (Fetching, FetchFailed) => Some(Missing),
            (Refreshing, FetchFailed) => Some(StaleServed),
            _ => None,
        }
    }

    fn advance(self, event: CacheEvent) -> Self {
        let next = self.on(event).unwrap_or(self);
        log::trace!("cache state {:?} --{:?}--> {:?}", self, event, next);
        next
    }
}

/// Tunables of the cache. Tests shrink the TTL instead of touching globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long an entry is served without contacting the remote.
    pub ttl: Duration,
    /// Maximum concurrent downloads per refresh.
    pub parallelism: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: CACHE_TTL,
            parallelism: MAX_PARALLEL_FETCHES,
        }
    }
}

/// The outcome of resolving a remote source through the cache.
#[derive(Debug)]
pub enum Resolution {
    /// Fetched from the remote and written to the cache.
    Fetched(CacheEntry),
    /// Served from a fresh entry without contacting the remote.
    Cached(CacheEntry),
    /// Refresh failed; the expired entry is served unchanged.
    Stale {
        entry: CacheEntry,
        age: Duration,
        error: RefreshError,
    },
}

impl Resolution {
    /// The entry in use, whatever the outcome.
    pub fn entry(&self) -> &CacheEntry {
        match self {
            Self::Fetched(entry) | Self::Cached(entry) | Self::Stale { entry, .. } => entry,
        }
    }

    /// Consumes the resolution, keeping the entry.
    pub fn into_entry(self) -> CacheEntry {
        match self {
            Self::Fetched(entry) | Self::Cached(entry) | Self::Stale { entry, .. } => entry,
        }
    }

    /// The state the entry was left in.
    pub fn state(&self) -> CacheState {
        match self {
            Self::Fetched(_) | Self::Cached(_) => CacheState::Valid,
            Self::Stale { .. } => CacheState::StaleServed,
        }
    }

    /// The user-facing notice for a stale result.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Stale { entry, age, error } => Some(format!(
                "using cached scripts for {} from {} ago (entry '{}'); refresh failed: {}",
                entry.meta.source_url,
                format_age(*age),
                entry.key,
                error
            )),
            _ => None,
        }
    }
}

/// Compact human form of an age, e.g. `3h 2m` or `2d 4h`.
pub fn format_age(age: Duration) -> String {
    let minutes = age.as_secs() / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        "<1m".to_string()
    }
}

// --- LOCKING ---

/// Exclusive advisory lock on one cache key, released on drop.
#[derive(Debug)]
struct KeyLock {
    file: File,
    path: PathBuf,
}

impl KeyLock {
    fn acquire(root: &Path, key: &str) -> Result<Self, CacheError> {
        let path = root.join(lock_file_name(key));
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(io_err(&path))?;
            file.lock_exclusive().map_err(io_err(&path))?;
            // A cleaner may have unlinked the file while we waited.
            if is_same_file(&file, &path) {
                log::trace!("Locked '{}'", path.display());
                return Ok(Self { file, path });
            }
        }
    }

    /// Deletes the lock file, then releases the lock.
    fn remove(self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::debug!("Could not remove '{}': {}", self.path.display(), e);
        }
    }
}

fn lock_file_name(key: &str) -> String {
    format!(".{}.lock", key)
}

/// The key a `.<key>.lock` file belongs to.
fn key_of_lock_file(name: &str) -> Option<&str> {
    name.strip_prefix('.')?.strip_suffix(".lock")
}

#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::debug!("Failed to unlock '{}': {}", self.path.display(), e);
        }
    }
}

// --- MANAGER ---

/// Resolves remote sources through the on-disk cache.
#[derive(Debug)]
pub struct CacheManager<F: RemoteFetcher> {
    root: PathBuf,
    fetcher: F,
    policy: CachePolicy,
}

impl<F: RemoteFetcher> CacheManager<F> {
    /// A manager storing entries under `root`.
    pub fn new(root: impl Into<PathBuf>, fetcher: F, policy: CachePolicy) -> Self {
        Self {
            root: root.into(),
            fetcher,
            policy,
        }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The TTL and parallelism in use.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// The fetcher used for refreshes.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The directory the entry of `source` lives in, whether or not it exists.
    pub fn entry_dir(&self, source: &RemoteSource) -> PathBuf {
        self.root.join(source.cache_key())
    }

    /// Resolves `source` at the current time.
    pub fn resolve(&self, source: &RemoteSource) -> Result<Resolution, CacheError> {
        self.resolve_at(source, Utc::now())
    }

    /// Resolves `source` as if the current time were `now`.
    ///
    /// Holds the key's lock for the whole call, so a process that waited for
    /// the lock reads the entry the previous holder just wrote.
    pub fn resolve_at(
        &self,
        source: &RemoteSource,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CacheError> {
        let _timer = dev_utils::BlockTimer::new("cache::resolve");
        let key = source.cache_key();
        fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;
        let _lock = KeyLock::acquire(&self.root, &key)?;
        self.recover_interrupted(&key)?;

        let existing = match self.read_entry(&key) {
            Ok(entry) => entry,
            Err(CacheError::Metadata { path, message }) => {
                log::warn!(
                    "Ignoring damaged cache entry '{}': {}",
                    path.display(),
                    message
                );
                None
            }
            Err(e) => return Err(e),
        };

        let mut state =
            CacheState::classify(existing.as_ref().map(|e| &e.meta), now, self.policy.ttl);
        log::debug!("Cache entry '{}' is {:?}", key, state);
        let mut last_error = None;
        let mut written = None;

        loop {
            state = match state {
                CacheState::Missing => match last_error.take() {
                    // The first fetch failed and there is nothing to fall back on.
                    Some(RefreshError::Fetch(error)) => {
                        return Err(CacheError::Unavailable {
                            source_url: source.source_url(),
                            error,
                        });
                    }
                    Some(RefreshError::Store(error)) => return Err(*error),
                    None => state.advance(CacheEvent::Access),
                },
                CacheState::Expired => state.advance(CacheEvent::Access),
                CacheState::Fetching | CacheState::Refreshing => {
                    let stored =
                        remote::fetch_scripts(&self.fetcher, source, self.policy.parallelism)
                            .map_err(RefreshError::from)
                            .and_then(|fetched| {
                                self.write_entry(source, fetched, now)
                                    .map_err(|e| RefreshError::Store(Box::new(e)))
                            });
                    match stored {
                        Ok(entry) => {
                            written = Some(entry);
                            state.advance(CacheEvent::FetchSucceeded)
                        }
                        Err(error) => {
                            log::debug!("Refresh of '{}' failed: {}", key, error);
                            last_error = Some(error);
                            state.advance(CacheEvent::FetchFailed)
                        }
                    }
                }
                CacheState::Valid => {
                    return Ok(match (written, existing) {
                        (Some(entry), _) => Resolution::Fetched(entry),
                        (None, Some(entry)) => Resolution::Cached(entry),
                        (None, None) => {
                            return Err(CacheError::Metadata {
                                path: self.root.join(&key),
                                message: "valid entry vanished".to_string(),
                            });
                        }
                    });
                }
                CacheState::StaleServed => {
                    return match (existing, last_error) {
                        (Some(entry), Some(error)) => {
                            let age = entry.age(now);
                            log::debug!("Serving stale entry '{}' ({} old)", key, format_age(age));
                            Ok(Resolution::Stale { entry, age, error })
                        }
                        _ => Err(CacheError::Metadata {
                            path: self.root.join(&key),
                            message: "stale entry without a prior copy".to_string(),
                        }),
                    };
                }
            };
        }
    }

    /// Reads the entry stored under `key`, if any.
    pub fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let dir = self.root.join(key);
        if !dir.is_dir() {
            return Ok(None);
        }
        let meta_path = dir.join(CACHE_META_FILENAME);
        let raw = match fs::read_to_string(&meta_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::Metadata {
                    path: meta_path,
                    message: "metadata record is missing".to_string(),
                });
            }
            Err(e) => return Err(io_err(&meta_path)(e)),
        };
        let meta: CacheMeta = serde_json::from_str(&raw).map_err(|e| CacheError::Metadata {
            path: meta_path.clone(),
            message: e.to_string(),
        })?;
        if meta.scripts.len() != meta.script_count {
            return Err(CacheError::Metadata {
                path: meta_path,
                message: format!(
                    "records {} scripts but lists {}",
                    meta.script_count,
                    meta.scripts.len()
                ),
            });
        }

        let mut files = BTreeMap::new();
        for name in &meta.scripts {
            let path = dir.join(name);
            let content = fs::read_to_string(&path).map_err(|e| CacheError::Metadata {
                path: path.clone(),
                message: e.to_string(),
            })?;
            files.insert(name.clone(), content);
        }

        Ok(Some(CacheEntry {
            key: key.to_string(),
            dir,
            meta,
            files,
        }))
    }

    /// Stages `fetched` next to the live entry and swaps it in.
    fn write_entry(
        &self,
        source: &RemoteSource,
        fetched: FetchedScripts,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry, CacheError> {
        let key = source.cache_key();
        let target = self.root.join(&key);

        let staging = tempfile::Builder::new()
            .prefix(&format!(".staging-{}-", key))
            .tempdir_in(&self.root)
            .map_err(io_err(&self.root))?;

        for (name, content) in &fetched.files {
            let path = staging.path().join(name);
            fs::write(&path, content).map_err(io_err(&path))?;
        }

        let meta = CacheMeta {
            source_url: source.source_url(),
            api_url: fetched.api_url,
            cached_at: now,
            script_count: fetched.files.len(),
            scripts: fetched.files.keys().cloned().collect(),
        };
        let meta_path = staging.path().join(CACHE_META_FILENAME);
        let json = serde_json::to_string_pretty(&meta).map_err(|e| CacheError::Metadata {
            path: meta_path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&meta_path, json).map_err(io_err(&meta_path))?;

        // From here on the staging directory is ours to move or remove.
        let staging_path = staging.keep();
        let cleanup = scopeguard::guard(staging_path.clone(), |path| {
            let _ = fs::remove_dir_all(path);
        });
        self.swap_into_place(&key, &staging_path, &target)?;
        scopeguard::ScopeGuard::into_inner(cleanup);

        log::debug!(
            "Cached {} scripts for '{}' at '{}'",
            meta.script_count,
            key,
            target.display()
        );
        Ok(CacheEntry {
            key,
            dir: target,
            meta,
            files: fetched.files,
        })
    }

    fn swap_into_place(&self, key: &str, staging: &Path, target: &Path) -> Result<(), CacheError> {
        if !target.exists() {
            return fs::rename(staging, target).map_err(io_err(target));
        }

        let trash = self.root.join(format!(".trash-{}-{}", key, Uuid::new_v4()));
        fs::rename(target, &trash).map_err(io_err(target))?;
        if let Err(e) = fs::rename(staging, target) {
            // Put the previous entry back.
            if let Err(rollback) = fs::rename(&trash, target) {
                log::warn!(
                    "Could not restore cache entry '{}': {}",
                    target.display(),
                    rollback
                );
            }
            return Err(io_err(target)(e));
        }
        if let Err(e) = fs::remove_dir_all(&trash) {
            log::debug!("Could not remove '{}': {}", trash.display(), e);
        }
        Ok(())
    }

    /// Finishes or rolls back a swap interrupted by a crash or signal.
    ///
    /// If the live entry is gone but a moved-aside copy exists, the copy is put
    /// back. Leftover staging and trash directories for the key are removed.
    fn recover_interrupted(&self, key: &str) -> Result<(), CacheError> {
        let target = self.root.join(key);
        let trash_prefix = format!(".trash-{}-", key);
        let staging_prefix = format!(".staging-{}-", key);

        let read_dir = fs::read_dir(&self.root).map_err(io_err(&self.root))?;
        for dir_entry in read_dir.flatten() {
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let path = dir_entry.path();
            if name.starts_with(&trash_prefix) {
                if target.exists() {
                    log::debug!("Removing leftover '{}'", path.display());
                    let _ = fs::remove_dir_all(&path);
                } else {
                    log::warn!("Restoring cache entry '{}' after an interrupted update", key);
                    fs::rename(&path, &target).map_err(io_err(&path))?;
                }
            } else if name.starts_with(&staging_prefix) {
                log::debug!("Removing leftover '{}'", path.display());
                let _ = fs::remove_dir_all(&path);
            }
        }
        Ok(())
    }

    /// Removes the entry of one source. Returns whether an entry existed.
    pub fn clean(&self, source: &RemoteSource) -> Result<bool, CacheError> {
        if !self.root.is_dir() {
            return Ok(false);
        }
        self.remove_key(&source.cache_key())
    }

    /// Removes every entry under the cache root. Returns how many were removed.
    ///
    /// Each key is removed under its lock, so a concurrent refresh finishes
    /// its swap before or after the removal, never during it.
    pub fn clean_all(&self) -> Result<usize, CacheError> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let mut keys = BTreeSet::new();
        let read_dir = fs::read_dir(&self.root).map_err(io_err(&self.root))?;
        for dir_entry in read_dir.flatten() {
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if let Some(key) = key_of_lock_file(&name) {
                keys.insert(key.to_string());
            } else if !name.starts_with('.') && dir_entry.path().is_dir() {
                keys.insert(name);
            }
        }

        let mut removed = 0;
        for key in &keys {
            if self.remove_key(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes the entry of `key` with its leftovers and lock file.
    fn remove_key(&self, key: &str) -> Result<bool, CacheError> {
        let lock = KeyLock::acquire(&self.root, key)?;
        self.recover_interrupted(key)?;
        let dir = self.root.join(key);
        let existed = dir.exists();
        if existed {
            fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
            log::debug!("Removed cache entry '{}'", key);
        }
        lock.remove();
        Ok(existed)
    }

    /// Every readable entry under the cache root, sorted by key.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dir_entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if !dir_entry.file_type().is_dir() || name.starts_with('.') {
                continue;
            }
            match self.read_entry(&name) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping cache entry '{}': {}", name, e),
            }
        }
        Ok(entries)
    }
}

// MARK: --- UNIT TESTS ---
