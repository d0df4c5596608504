//! # Repo Cloner Library
//!
//! A concurrent repository-cloning engine. Given a GitHub user or
//! organization, or a Bitbucket user or workspace, it enumerates every
//! repository the account owns, filters the list by declared criteria, and
//! clones the survivors in parallel with bounded concurrency, per-job
//! retries, rate-limit compliance, and live progress reporting.
//!
//! ## Features
//!
//! - **Two providers**: GitHub (page/per-page pagination) and Bitbucket
//!   (cursor pagination), translated into one uniform repository record
//! - **Bounded worker pool**: fixed worker count, exponential-backoff
//!   retries, permanent vs. retryable error classification
//! - **Skip-on-exists**: destinations that already hold a `.git` directory
//!   are skipped, not overwritten
//! - **Rate limiting**: token-bucket limiter re-synced from provider
//!   rate-limit headers
//! - **Live progress**: thread-safe tracker with ETA/throughput and a
//!   broadcast subscription for terminal UIs
//! - **Graceful shutdown**: a single cancellation signal threaded through
//!   every wait, sleep, and git subprocess
//!
//! ## Quick Start
//!
//! ```no_run
//! use repo_cloner::engine::{FetchRequest, FetchUseCase};
//! use repo_cloner::provider::{GithubProvider, RateLimiter, RepositoryProvider};
//! use repo_cloner::{RepoKind, RepositoryFilter};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::new(RateLimiter::GITHUB_HOURLY_QUOTA));
//! let github: Arc<dyn RepositoryProvider> =
//!     Arc::new(GithubProvider::builder().rate_limiter(limiter).build()?);
//!
//! let fetch = FetchUseCase::new(Some(github), None);
//! let response = fetch
//!     .execute(FetchRequest {
//!         owner: "octocat".to_string(),
//!         kind: RepoKind::GithubUser,
//!         filter: RepositoryFilter::default(),
//!         pagination: None,
//!     })
//!     .await?;
//!
//! println!("{} repositories", response.repositories.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`provider`] - Remote enumeration clients and the rate limiter
//! - [`cloner`] - Clone jobs, the git executor, the worker pool, and the
//!   progress tracker
//! - [`engine`] - The fetch and clone-batch use cases (the engine boundary)
//! - [`cli`] - Command implementations for the binary
//! - [`cancel`] - The cancellation token threaded through every blocking
//!   point

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Cooperative cancellation
pub mod cancel;

/// CLI command implementations
pub mod cli;

/// Clone jobs, git execution, worker pool, progress tracking
pub mod cloner;

/// Fetch and clone-batch use cases
pub mod engine;

/// Production observability metrics
pub mod metrics;

/// Repository enumeration providers and rate limiting
pub mod provider;

/// Discriminant selecting which provider handles a request and which URL
/// template is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepoKind {
    /// GitHub user account
    #[serde(rename = "user")]
    GithubUser,
    /// GitHub organization
    #[serde(rename = "org")]
    GithubOrg,
    /// Bitbucket user account
    #[serde(rename = "bitbucket-user")]
    BitbucketUser,
    /// Bitbucket workspace
    #[serde(rename = "bitbucket-workspace")]
    BitbucketWorkspace,
}

impl RepoKind {
    /// Whether this kind is served by the GitHub provider.
    pub fn is_github(&self) -> bool {
        matches!(self, RepoKind::GithubUser | RepoKind::GithubOrg)
    }

    /// Whether this kind is served by the Bitbucket provider.
    pub fn is_bitbucket(&self) -> bool {
        matches!(self, RepoKind::BitbucketUser | RepoKind::BitbucketWorkspace)
    }

    /// GitHub API path segment for this kind (`users` or `orgs`).
    ///
    /// Bitbucket uses a single `/repositories/{owner}` template for both of
    /// its kinds.
    pub fn api_segment(&self) -> &'static str {
        match self {
            RepoKind::GithubUser => "users",
            RepoKind::GithubOrg => "orgs",
            RepoKind::BitbucketUser | RepoKind::BitbucketWorkspace => "repositories",
        }
    }
}

impl std::fmt::Display for RepoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RepoKind::GithubUser => "user",
            RepoKind::GithubOrg => "org",
            RepoKind::BitbucketUser => "bitbucket-user",
            RepoKind::BitbucketWorkspace => "bitbucket-workspace",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RepoKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(RepoKind::GithubUser),
            "org" => Ok(RepoKind::GithubOrg),
            "bitbucket-user" => Ok(RepoKind::BitbucketUser),
            "bitbucket-workspace" => Ok(RepoKind::BitbucketWorkspace),
            _ => Err(format!(
                "Invalid repository kind: {s}. Valid options: user, org, bitbucket-user, bitbucket-workspace"
            )),
        }
    }
}

/// Uniform repository record yielded by enumeration.
///
/// Constructed by a provider client during enumeration and immutable
/// thereafter. Bitbucket UUIDs are hashed into the integer `id`; ids are
/// informational and never used for equality-critical lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    /// Stable per-provider identifier
    pub id: i64,
    /// Simple repository name
    pub name: String,
    /// Clone URL (https preferred, ssh acceptable)
    pub clone_url: String,
    /// Owner login
    pub owner: String,
    /// Whether the repository is a fork
    pub is_fork: bool,
    /// Size in bytes as reported by the provider
    pub size: i64,
    /// Default branch name
    pub default_branch: String,
    /// Primary language, if reported
    pub language: Option<String>,
    /// Description, if any
    pub description: Option<String>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// Validate record invariants: non-empty name/owner, well-formed clone
    /// URL with an https or ssh scheme and a host, non-negative size.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("repository name cannot be empty".to_string());
        }

        if self.owner.is_empty() {
            return Err("repository owner cannot be empty".to_string());
        }

        self.validate_clone_url()?;

        if self.size < 0 {
            return Err(format!(
                "repository size cannot be negative, got {}",
                self.size
            ));
        }

        Ok(())
    }

    /// Validate only the clone URL.
    pub fn validate_clone_url(&self) -> Result<(), String> {
        if self.clone_url.is_empty() {
            return Err("clone URL cannot be empty".to_string());
        }

        let parsed =
            Url::parse(&self.clone_url).map_err(|e| format!("invalid clone URL format: {e}"))?;

        if parsed.scheme() != "https" && parsed.scheme() != "ssh" {
            return Err(format!(
                "clone URL must use https or ssh, got {}",
                parsed.scheme()
            ));
        }

        if parsed.host_str().map_or(true, str::is_empty) {
            return Err("clone URL must have a valid host".to_string());
        }

        Ok(())
    }

    /// Full name in `owner/name` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Local path under `base` where this repository lands without
    /// owner subdirectories.
    pub fn local_path(&self, base: &Path) -> PathBuf {
        base.join(&self.name)
    }

    /// A repository is treated as public when it clones over https.
    pub fn is_public(&self) -> bool {
        self.clone_url.starts_with("https://")
    }
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Inclusion predicates applied to enumerated repositories.
///
/// A record is included iff every predicate accepts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryFilter {
    /// Include forks (default false)
    pub include_forks: bool,
    /// Minimum size in bytes
    pub min_size: i64,
    /// Maximum size in bytes; -1 means unbounded
    pub max_size: i64,
    /// Allowed primary languages; empty means any
    pub languages: Vec<String>,
    /// Only include repositories updated after this instant
    pub updated_after: Option<DateTime<Utc>>,
    /// Only include public repositories (default true)
    pub only_public: bool,
}

impl Default for RepositoryFilter {
    fn default() -> Self {
        Self {
            include_forks: false,
            min_size: 0,
            max_size: -1,
            languages: Vec::new(),
            updated_after: None,
            only_public: true,
        }
    }
}

impl RepositoryFilter {
    /// Whether `repo` passes every predicate of this filter.
    pub fn should_include(&self, repo: &Repository) -> bool {
        if !self.include_forks && repo.is_fork {
            return false;
        }

        if repo.size < self.min_size {
            return false;
        }
        if self.max_size >= 0 && repo.size > self.max_size {
            return false;
        }

        if !self.languages.is_empty() {
            let matched = repo
                .language
                .as_deref()
                .map(|lang| self.languages.iter().any(|l| l == lang))
                .unwrap_or(false);
            if !matched {
                return false;
            }
        }

        if let Some(after) = self.updated_after {
            if repo.updated_at < after {
                return false;
            }
        }

        if self.only_public && !repo.is_public() {
            return false;
        }

        true
    }
}

/// Pagination settings for enumeration requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginationOptions {
    /// Page number, 1-based
    pub page: u32,
    /// Items per page, clamped to [1, 100]
    pub per_page: u32,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 100,
        }
    }
}

impl PaginationOptions {
    /// Clamp out-of-range values into the accepted window instead of
    /// rejecting the request.
    pub fn normalized(mut self) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.per_page < 1 || self.per_page > 100 {
            self.per_page = 100;
        }
        self
    }

    /// Offset of the first item on this page.
    pub fn offset(&self) -> u32 {
        (self.page - 1) * self.per_page
    }
}
