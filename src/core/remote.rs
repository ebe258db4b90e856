//! # Remote Listing Client
//!
//! Lists one directory of a GitHub repository and downloads the scripts in
//! it. The network side sits behind the [`RemoteFetcher`] trait so the cache
//! layer can be exercised without a network.
//!
//! There are no retries here. A failure is returned as a [`FetchError`] and
//! the cache manager decides whether stale content can be served instead.

use crate::constants::SCRIPT_EXTENSION;
use crate::core::source::RemoteSource;
use crate::dev_utils;
use rayon::prelude::*;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// User-Agent sent with every request (required by the GitHub API).
pub const USER_AGENT: &str = concat!("runsh/", env!("CARGO_PKG_VERSION"));

/// Why a remote request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The repository, branch or path does not exist.
    NotFound,
    /// The API rate limit is exhausted.
    RateLimited,
    /// Connection failure, timeout or a server error.
    NetworkUnavailable,
    /// The token was rejected.
    Unauthorized,
    /// Unexpected status or a body that could not be understood.
    InvalidResponse,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotFound => "not found",
            Self::RateLimited => "rate limited",
            Self::NetworkUnavailable => "network unavailable",
            Self::Unauthorized => "unauthorized",
            Self::InvalidResponse => "invalid response",
        };
        f.write_str(text)
    }
}

/// A failed remote request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} while fetching {url}: {message}")]
pub struct FetchError {
    /// The failure class.
    pub kind: FetchErrorKind,
    /// The URL that was requested.
    pub url: String,
    /// Details from the transport or the server.
    pub message: String,
}

impl FetchError {
    /// Builds an error for a request to `url`.
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }
}

/// The `type` field of a contents listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// A symbolic link.
    Symlink,
    /// A git submodule.
    Submodule,
    /// Any type not listed above.
    #[serde(other)]
    Other,
}

/// One entry of a contents listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteEntry {
    /// File name.
    pub name: String,
    /// Path inside the repository.
    pub path: String,
    /// The entry type.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Raw content URL. Absent for directories.
    pub download_url: Option<String>,
}

impl RemoteEntry {
    /// A regular file carrying the script extension. Names with path
    /// separators or NUL are refused since they become cache file names.
    pub fn is_script(&self) -> bool {
        self.kind == EntryKind::File
            && !self.name.contains(['/', '\\', '\0'])
            && self.name != ".."
            && Path::new(&self.name)
                .extension()
                .is_some_and(|ext| ext == SCRIPT_EXTENSION)
    }
}

/// Network access used to populate the cache.
pub trait RemoteFetcher: Send + Sync {
    /// Lists the directory described by `source`.
    fn list(&self, source: &RemoteSource) -> Result<Vec<RemoteEntry>, FetchError>;

    /// Downloads the content of one listed file.
    fn fetch(&self, source: &RemoteSource, entry: &RemoteEntry) -> Result<String, FetchError>;

    /// The URL `list` requests, recorded in the cache metadata.
    fn listing_url(&self, source: &RemoteSource) -> String;
}

/// The complete script set of one remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedScripts {
    /// The listing URL.
    pub api_url: String,
    /// File name (e.g. `deploy.sh`) to content.
    pub files: BTreeMap<String, String>,
}

/// Lists `source` and downloads every script in it.
///
/// Downloads run on at most `parallelism` threads. The result is all or
/// nothing: the first failure is returned and the files fetched so far are
/// discarded.
pub fn fetch_scripts(
    fetcher: &dyn RemoteFetcher,
    source: &RemoteSource,
    parallelism: usize,
) -> Result<FetchedScripts, FetchError> {
    let _timer = dev_utils::BlockTimer::new("remote::fetch_scripts");
    let api_url = fetcher.listing_url(source);

    let scripts: Vec<RemoteEntry> = fetcher
        .list(source)?
        .into_iter()
        .filter(RemoteEntry::is_script)
        .collect();
    log::debug!("{} scripts listed at {}", scripts.len(), api_url);

    let download = |entry: &RemoteEntry| {
        fetcher
            .fetch(source, entry)
            .map(|content| (entry.name.clone(), content))
    };

    let fetched: Result<Vec<(String, String)>, FetchError> = match rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.max(1))
        .build()
    {
        Ok(pool) => pool.install(|| scripts.par_iter().map(download).collect()),
        Err(e) => {
            log::debug!("Could not build fetch pool ({}), downloading sequentially", e);
            scripts.iter().map(download).collect()
        }
    };

    Ok(FetchedScripts {
        api_url,
        files: fetched?.into_iter().collect(),
    })
}

// --- GITHUB CLIENT ---

/// [`RemoteFetcher`] backed by the GitHub contents API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    api_base: String,
}

impl GithubClient {
    /// Builds a blocking client with the given timeout and optional bearer token.
    pub fn new(api_base: &str, token: Option<&str>, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                FetchError::new(FetchErrorKind::Unauthorized, api_base, e.to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                FetchError::new(
                    FetchErrorKind::NetworkUnavailable,
                    api_base,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, url: &str, accept: Option<&'static str>) -> Result<Response, FetchError> {
        log::trace!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let response = request.send().map_err(|e| classify_transport(url, &e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let rate_exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        let body = response.text().unwrap_or_default();
        Err(FetchError::new(
            classify_status(status, rate_exhausted),
            url,
            format!("HTTP {}: {}", status.as_u16(), body.trim()),
        ))
    }
}

impl RemoteFetcher for GithubClient {
    fn list(&self, source: &RemoteSource) -> Result<Vec<RemoteEntry>, FetchError> {
        let url = self.listing_url(source);
        let body = self
            .get(&url, None)?
            .text()
            .map_err(|e| classify_transport(&url, &e))?;
        serde_json::from_str::<Vec<RemoteEntry>>(&body).map_err(|e| {
            FetchError::new(
                FetchErrorKind::InvalidResponse,
                &url,
                format!("expected a directory listing: {}", e),
            )
        })
    }

    fn fetch(&self, source: &RemoteSource, entry: &RemoteEntry) -> Result<String, FetchError> {
        let (url, accept) = match &entry.download_url {
            Some(url) => (url.clone(), None),
            // Without a download link, ask the contents API for the raw body.
            None => (
                format!(
                    "{}/repos/{}/{}/contents/{}?ref={}",
                    self.api_base, source.owner, source.repo, entry.path, source.branch
                ),
                Some("application/vnd.github.raw"),
            ),
        };
        self.get(&url, accept)?
            .text()
            .map_err(|e| classify_transport(&url, &e))
    }

    fn listing_url(&self, source: &RemoteSource) -> String {
        source.contents_url(&self.api_base)
    }
}

/// Maps a non-success HTTP status onto a [`FetchErrorKind`].
///
/// GitHub answers 403 both for missing permissions and for an exhausted rate
/// limit; the `x-ratelimit-remaining` header tells them apart.
pub fn classify_status(status: StatusCode, rate_exhausted: bool) -> FetchErrorKind {
    match status {
        StatusCode::NOT_FOUND => FetchErrorKind::NotFound,
        StatusCode::UNAUTHORIZED => FetchErrorKind::Unauthorized,
        StatusCode::FORBIDDEN if rate_exhausted => FetchErrorKind::RateLimited,
        StatusCode::FORBIDDEN => FetchErrorKind::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => FetchErrorKind::RateLimited,
        s if s.is_server_error() => FetchErrorKind::NetworkUnavailable,
        _ => FetchErrorKind::InvalidResponse,
    }
}

fn classify_transport(url: &str, error: &reqwest::Error) -> FetchError {
    let kind = if error.is_decode() || error.is_body() {
        FetchErrorKind::InvalidResponse
    } else {
        FetchErrorKind::NetworkUnavailable
    };
    FetchError::new(kind, url, error.to_string())
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory fetcher with call counters and switchable failures.
    #[derive(Debug, Default)]
    pub(crate) struct FakeFetcher {
        pub entries: Vec<RemoteEntry>,
        pub contents: HashMap<String, String>,
        pub fail_list: Mutex<Option<FetchErrorKind>>,
        pub fail_fetch_of: Option<String>,
        pub list_calls: AtomicUsize,
        pub fetch_calls: AtomicUsize,
    }

    impl FakeFetcher {
        pub(crate) fn with_scripts(scripts: &[(&str, &str)]) -> Self {
            let mut fake = Self::default();
            for (name, content) in scripts {
                fake.entries.push(file_entry(name));
                fake.contents.insert(name.to_string(), content.to_string());
            }
            fake
        }

        pub(crate) fn fail_listing(&self, kind: Option<FetchErrorKind>) {
            *self.fail_list.lock().unwrap() = kind;
        }

        pub(crate) fn list_count(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn fetch_count(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn file_entry(name: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            path: format!("scripts/{}", name),
            kind: EntryKind::File,
            download_url: Some(format!("https://raw.example/{}", name)),
        }
    }

    impl RemoteFetcher for FakeFetcher {
        fn list(&self, source: &RemoteSource) -> Result<Vec<RemoteEntry>, FetchError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = *self.fail_list.lock().unwrap() {
                return Err(FetchError::new(kind, self.listing_url(source), "forced"));
            }
            Ok(self.entries.clone())
        }

        fn fetch(&self, _source: &RemoteSource, entry: &RemoteEntry) -> Result<String, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch_of.as_deref() == Some(entry.name.as_str()) {
                return Err(FetchError::new(
                    FetchErrorKind::NetworkUnavailable,
                    entry.path.clone(),
                    "forced",
                ));
            }
            self.contents
                .get(&entry.name)
                .cloned()
                .ok_or_else(|| FetchError::new(FetchErrorKind::NotFound, entry.path.clone(), "missing"))
        }

        fn listing_url(&self, source: &RemoteSource) -> String {
            source.contents_url("https://api.test")
        }
    }

    fn source() -> RemoteSource {
        RemoteSource::new("owner", "repo", "main", "scripts")
    }

    #[test]
    fn test_only_script_files_are_fetched() {
        let mut fake = FakeFetcher::with_scripts(&[("a.sh", "echo a"), ("b.sh", "echo b")]);
        fake.entries.push(RemoteEntry {
            name: "README.md".to_string(),
            path: "scripts/README.md".to_string(),
            kind: EntryKind::File,
            download_url: None,
        });
        fake.entries.push(RemoteEntry {
            name: "nested.sh".to_string(),
            path: "scripts/nested.sh".to_string(),
            kind: EntryKind::Dir,
            download_url: None,
        });

        fake.entries.push(RemoteEntry {
            name: "bad\0name.sh".to_string(),
            path: "scripts/bad\0name.sh".to_string(),
            kind: EntryKind::File,
            download_url: None,
        });

        let fetched = fetch_scripts(&fake, &source(), 4).unwrap();
        assert_eq!(fake.list_count(), 1);
        assert_eq!(fake.fetch_count(), 2);
        assert_eq!(fetched.files.len(), 2);
        assert_eq!(fetched.files.get("b.sh").map(String::as_str), Some("echo b"));
        assert_eq!(
            fetched.api_url,
            "https://api.test/repos/owner/repo/contents/scripts?ref=main"
        );
    }

    #[test]
    fn test_single_failure_fails_whole_fetch() {
        let mut fake = FakeFetcher::with_scripts(&[("a.sh", "a"), ("b.sh", "b"), ("c.sh", "c")]);
        fake.fail_fetch_of = Some("b.sh".to_string());
        let err = fetch_scripts(&fake, &source(), 2).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NetworkUnavailable);
    }

    #[test]
    fn test_listing_failure_is_returned() {
        let fake = FakeFetcher::with_scripts(&[("a.sh", "a")]);
        fake.fail_listing(Some(FetchErrorKind::RateLimited));
        let err = fetch_scripts(&fake, &source(), 1).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::RateLimited);
        assert_eq!(fake.fetch_count(), 0);
    }

    #[test]
    fn test_listing_deserializes() {
        let body = r#"[
            {"name": "deploy.sh", "path": "scripts/deploy.sh", "type": "file",
             "download_url": "https://raw.githubusercontent.com/o/r/main/scripts/deploy.sh", "size": 10},
            {"name": "lib", "path": "scripts/lib", "type": "dir", "download_url": null},
            {"name": "weird", "path": "scripts/weird", "type": "something-new", "download_url": null}
        ]"#;
        let entries: Vec<RemoteEntry> = serde_json::from_str(body).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_script());
        assert_eq!(entries[1].kind, EntryKind::Dir);
        assert_eq!(entries[2].kind, EntryKind::Other);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, false),
            FetchErrorKind::NotFound
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, true),
            FetchErrorKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, false),
            FetchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, false),
            FetchErrorKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, false),
            FetchErrorKind::NetworkUnavailable
        );
        assert_eq!(
            classify_status(StatusCode::IM_A_TEAPOT, false),
            FetchErrorKind::InvalidResponse
        );
    }

    #[test]
    fn test_github_client_builds() {
        let client = GithubClient::new("https://api.github.com/", Some("token"), Duration::from_secs(5));
        let client = client.unwrap();
        assert_eq!(
            client.listing_url(&source()),
            "https://api.github.com/repos/owner/repo/contents/scripts?ref=main"
        );
    }
}
