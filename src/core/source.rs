//! # Source Descriptor Resolver
//!
//! Turns the configured scripts-source string into a typed descriptor. A
//! GitHub tree URL (`https://github.com/<owner>/<repo>/tree/<branch>/<subpath>`)
//! becomes [`SourceDescriptor::Remote`]; anything else is a local directory.
//!
//! Resolution happens while the configuration is loaded, so a malformed URL
//! stops the run before any command is registered.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while resolving `scripts_dir`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// `scripts_dir` is blank.
    #[error("the scripts source is empty")]
    EmptySource,
    /// The URL stops before the repository.
    #[error("'{url}' is missing the owner or repository segment")]
    MissingRepository { url: String },
    /// A `tree` URL without a branch.
    #[error("'{url}' does not name a branch (expected .../<owner>/<repo>/tree/<branch>[/<path>])")]
    MissingBranch { url: String },
    /// A GitHub URL that is not a `tree` URL.
    #[error("'{url}' is not a directory URL (expected .../<owner>/<repo>/tree/<branch>[/<path>])")]
    UnsupportedPath { url: String },
    /// A `~` or `$VAR` in a local path could not be expanded.
    #[error("could not expand '{path}': {message}")]
    Expansion { path: String, message: String },
}

/// A directory of scripts inside a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteSource {
    /// User or organization.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch, tag or commit.
    pub branch: String,
    /// Path inside the repository, without leading or trailing slashes.
    /// Empty for the repository root.
    pub subpath: String,
}

/// Where the scripts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// A directory on disk.
    Local { path: PathBuf },
    /// A directory in a GitHub repository, cached locally.
    Remote(RemoteSource),
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::Remote(remote) => write!(f, "{}", remote.source_url()),
        }
    }
}

impl RemoteSource {
    /// Builds a source, trimming slashes from `subpath`.
    pub fn new(owner: &str, repo: &str, branch: &str, subpath: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            subpath: normalize_subpath(subpath),
        }
    }

    /// The stable identifier of this source, used as the cache directory name.
    ///
    /// The readable prefix is sanitized for the filesystem, so a short hash of
    /// the exact tuple keeps keys distinct when sanitizing makes two sources
    /// look alike.
    pub fn cache_key(&self) -> String {
        let subpath = if self.subpath.is_empty() {
            "root".to_string()
        } else {
            slug(&self.subpath)
        };
        let identity = format!(
            "{}\n{}\n{}\n{}",
            self.owner, self.repo, self.branch, self.subpath
        );
        let digest: Vec<u8> = blake3::hash(identity.as_bytes())
            .as_bytes()
            .iter()
            .take(4)
            .copied()
            .collect();
        format!(
            "github_{}_{}_{}_{}_{}",
            slug(&self.owner),
            slug(&self.repo),
            slug(&self.branch),
            subpath,
            hex::encode(digest)
        )
    }

    /// The browsable URL this source was configured with.
    pub fn source_url(&self) -> String {
        let base = format!(
            "https://github.com/{}/{}/tree/{}",
            self.owner, self.repo, self.branch
        );
        if self.subpath.is_empty() {
            base
        } else {
            format!("{}/{}", base, self.subpath)
        }
    }

    /// The contents API endpoint listing this directory.
    pub fn contents_url(&self, api_base: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.subpath,
            self.branch
        )
    }
}

/// Resolves a source string, with relative local paths taken from the
/// current directory.
pub fn resolve_source(source: &str) -> Result<SourceDescriptor, DescriptorError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_source_in(source, &cwd)
}

/// Resolves a source string, with relative local paths taken from `base_dir`.
pub fn resolve_source_in(source: &str, base_dir: &Path) -> Result<SourceDescriptor, DescriptorError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(DescriptorError::EmptySource);
    }

    if let Some(rest) = strip_github_host(source) {
        return parse_github_path(source, rest).map(SourceDescriptor::Remote);
    }

    let expanded = shellexpand::full(source).map_err(|e| DescriptorError::Expansion {
        path: source.to_string(),
        message: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.as_ref());
    let path = if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    };
    // The directory may not exist yet; keep the joined path in that case.
    let path = dunce::canonicalize(&path).unwrap_or(path);
    Ok(SourceDescriptor::Local { path })
}

/// Returns the part after `github.com/` when `source` points at GitHub.
fn strip_github_host(source: &str) -> Option<&str> {
    let without_scheme = source
        .strip_prefix("https://")
        .or_else(|| source.strip_prefix("http://"))
        .unwrap_or(source);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    without_www.strip_prefix("github.com/")
}

fn parse_github_path(url: &str, rest: &str) -> Result<RemoteSource, DescriptorError> {
    let rest = rest
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let mut segments = rest.split('/').filter(|s| !s.is_empty());

    let owner = segments.next();
    let repo = segments.next().map(|r| r.strip_suffix(".git").unwrap_or(r));
    let (Some(owner), Some(repo)) = (owner, repo) else {
        return Err(DescriptorError::MissingRepository {
            url: url.to_string(),
        });
    };

    match segments.next() {
        Some("tree") => {}
        None => {
            return Err(DescriptorError::MissingBranch {
                url: url.to_string(),
            });
        }
        Some(_) => {
            return Err(DescriptorError::UnsupportedPath {
                url: url.to_string(),
            });
        }
    }

    let branch = segments.next().ok_or_else(|| DescriptorError::MissingBranch {
        url: url.to_string(),
    })?;
    let subpath = segments.collect::<Vec<_>>().join("/");

    Ok(RemoteSource::new(owner, repo, branch, &subpath))
}

fn normalize_subpath(subpath: &str) -> String {
    subpath
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Lowercase, filesystem-safe form of one key component.
fn slug(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('-');
        }
    }
    out
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn remote(source: &str) -> RemoteSource {
        match resolve_source_in(source, Path::new("/")).unwrap() {
            SourceDescriptor::Remote(remote) => remote,
            other => panic!("expected a remote descriptor, got {:?}", other),
        }
    }

    #[test]
    fn test_tree_url_decomposes() {
        let r = remote("https://github.com/acme/tools/tree/main/scripts/ops");
        assert_eq!(r, RemoteSource::new("acme", "tools", "main", "scripts/ops"));
        assert_eq!(
            r.contents_url("https://api.github.com"),
            "https://api.github.com/repos/acme/tools/contents/scripts/ops?ref=main"
        );
        assert_eq!(
            r.source_url(),
            "https://github.com/acme/tools/tree/main/scripts/ops"
        );
    }

    #[test]
    fn test_url_variants() {
        assert_eq!(
            remote("github.com/acme/tools/tree/dev/"),
            RemoteSource::new("acme", "tools", "dev", "")
        );
        assert_eq!(
            remote("https://www.github.com/acme/tools.git/tree/v1.2//a/b/?tab=readme#top"),
            RemoteSource::new("acme", "tools", "v1.2", "a/b")
        );
    }

    #[test]
    fn test_malformed_urls() {
        let base = Path::new("/");
        assert!(matches!(
            resolve_source_in("https://github.com/acme", base),
            Err(DescriptorError::MissingRepository { .. })
        ));
        assert!(matches!(
            resolve_source_in("https://github.com/acme/tools", base),
            Err(DescriptorError::MissingBranch { .. })
        ));
        assert!(matches!(
            resolve_source_in("https://github.com/acme/tools/tree/", base),
            Err(DescriptorError::MissingBranch { .. })
        ));
        assert!(matches!(
            resolve_source_in("https://github.com/acme/tools/blob/main/x.sh", base),
            Err(DescriptorError::UnsupportedPath { .. })
        ));
        assert_eq!(
            resolve_source_in("   ", base),
            Err(DescriptorError::EmptySource)
        );
    }

    #[test]
    fn test_local_paths() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("scripts")).unwrap();

        let resolved = resolve_source_in("./scripts", dir.path()).unwrap();
        let expected = dunce::canonicalize(dir.path().join("scripts")).unwrap();
        assert_eq!(resolved, SourceDescriptor::Local { path: expected });

        // Missing directories are still resolved, not rejected.
        let resolved = resolve_source_in("nope", dir.path()).unwrap();
        assert!(matches!(resolved, SourceDescriptor::Local { path } if path.ends_with("nope")));

        let home = dirs::home_dir().unwrap();
        let resolved = resolve_source_in("~/some-runsh-dir", dir.path()).unwrap();
        assert_eq!(
            resolved,
            SourceDescriptor::Local {
                path: home.join("some-runsh-dir")
            }
        );
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = remote("https://github.com/acme/tools/tree/main/scripts");
        let b = remote("github.com/acme/tools/tree/main/scripts/");
        assert_eq!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().starts_with("github_acme_tools_main_scripts_"));

        let root = RemoteSource::new("acme", "tools", "main", "");
        assert!(root.cache_key().starts_with("github_acme_tools_main_root_"));
    }

    #[test]
    fn test_cache_key_distinguishes_sanitized_lookalikes() {
        let a = RemoteSource::new("acme", "tools", "main", "a/b");
        let b = RemoteSource::new("acme", "tools", "main", "a-b");
        assert_ne!(a.cache_key(), b.cache_key());
    }
}
