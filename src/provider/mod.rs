//! Repository enumeration providers.
//!
//! Two clients implement one contract: paginated fetch of every repository
//! owned by an account, translated into the uniform [`Repository`] record.
//! GitHub paginates by page/per-page and stops on a short page; Bitbucket
//! follows cursor-style `next` links. Both feed rate-limit response headers
//! back into the shared [`RateLimiter`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{PaginationOptions, RepoKind, Repository, RepositoryFilter};

pub mod bitbucket;
pub mod github;
pub mod rate_limit;

pub use bitbucket::BitbucketProvider;
pub use github::GithubProvider;
pub use rate_limit::{RateLimitError, RateLimiter};

/// Provider errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Token or credentials rejected by the provider
    #[error("authentication failed: check your token or credentials")]
    AuthenticationFailed,

    /// Access forbidden, usually rate limiting or missing scope
    #[error("access forbidden: rate limit exceeded or insufficient permissions; providing a token raises the quota")]
    Forbidden,

    /// Owner does not exist or has no visible repositories
    #[error("owner not found: {0}")]
    OwnerNotFound(String),

    /// Provider returned an unexpected status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// The request was interrupted by cancellation
    #[error("request cancelled")]
    Cancelled,
}

impl From<RateLimitError> for ProviderError {
    fn from(_: RateLimitError) -> Self {
        ProviderError::Cancelled
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider-reported rate-limit status.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    /// Quota ceiling
    pub limit: usize,
    /// Requests remaining in the current window
    pub remaining: usize,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

/// Contract implemented by each enumeration client.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    /// Fetch all repositories owned by `owner`, walking every page and
    /// applying `filter` before returning.
    ///
    /// # Arguments
    /// * `owner` - account login (user, org, or workspace slug)
    /// * `kind` - which URL template and pagination model to use
    /// * `filter` - inclusion predicates applied to each record
    /// * `pagination` - starting page and page size
    async fn fetch_repositories(
        &self,
        owner: &str,
        kind: RepoKind,
        filter: &RepositoryFilter,
        pagination: &PaginationOptions,
    ) -> ProviderResult<Vec<Repository>>;

    /// Verify the configured credentials against the provider's identity
    /// endpoint. Returns [`ProviderError::AuthenticationFailed`] on 401.
    async fn validate_credentials(&self) -> ProviderResult<()>;

    /// Current rate-limit status as reported by the provider.
    async fn rate_limit_info(&self) -> ProviderResult<RateLimitInfo>;

    /// Short provider name for logging.
    fn name(&self) -> &'static str;
}
