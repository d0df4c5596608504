//! GitHub enumeration client.
//!
//! Walks `/{users|orgs}/{owner}/repos` with page/per-page pagination and
//! stops when a page comes back shorter than the requested page size.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;
use super::{ProviderError, ProviderResult, RateLimitInfo, RepositoryProvider};
use crate::cancel::CancelToken;
use crate::{PaginationOptions, RepoKind, Repository, RepositoryFilter};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const DEFAULT_USER_AGENT: &str = "repo-cloner/0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Repository payload as returned by the GitHub v3 API.
#[derive(Debug, Deserialize)]
struct GithubRepoPayload {
    id: i64,
    name: String,
    clone_url: String,
    fork: bool,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    default_branch: String,
    language: Option<String>,
    description: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    owner: GithubOwnerPayload,
}

#[derive(Debug, Deserialize)]
struct GithubOwnerPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubRateLimitPayload {
    rate: GithubRatePayload,
}

#[derive(Debug, Deserialize)]
struct GithubRatePayload {
    limit: usize,
    remaining: usize,
    reset: i64,
}

/// GitHub API client implementing [`RepositoryProvider`].
pub struct GithubProvider {
    client: Client,
    base_url: String,
    token: Option<String>,
    user_agent: String,
    rate_limiter: Arc<RateLimiter>,
    cancel: Option<CancelToken>,
}

/// Builder for [`GithubProvider`].
#[derive(Default)]
pub struct GithubProviderBuilder {
    base_url: Option<String>,
    token: Option<String>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    rate_limiter: Option<Arc<RateLimiter>>,
    client: Option<Client>,
    cancel: Option<CancelToken>,
}

impl GithubProviderBuilder {
    /// Override the API base URL (used by tests against a local server).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the personal access token for authenticated requests.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if !token.is_empty() {
            self.token = Some(token);
        }
        self
    }

    /// Override the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Override the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Share a rate limiter across clients.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Supply a pre-built HTTP client instead of constructing one.
    pub fn http_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Attach a cancellation token so page walks become interruptible.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build the provider.
    pub fn build(self) -> ProviderResult<GithubProvider> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()
                .map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        Ok(GithubProvider {
            client,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token: self.token,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            rate_limiter: self
                .rate_limiter
                .unwrap_or_else(|| Arc::new(RateLimiter::new(RateLimiter::GITHUB_HOURLY_QUOTA))),
            cancel: self.cancel,
        })
    }
}

impl GithubProvider {
    /// Start building a provider.
    pub fn builder() -> GithubProviderBuilder {
        GithubProviderBuilder::default()
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }

    fn apply_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", &self.user_agent);
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {token}")),
            None => request,
        }
    }

    /// Push rate-limit response headers into the shared limiter.
    fn sync_rate_limiter(&self, headers: &HeaderMap) {
        if let Some(remaining) = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.rate_limiter.update_remaining(remaining);
        }

        if let Some(reset) = headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
        {
            if let Some(reset_at) = Utc.timestamp_opt(reset, 0).single() {
                self.rate_limiter.update_reset_time(reset_at);
            }
        }
    }

    async fn fetch_page(
        &self,
        owner: &str,
        kind: RepoKind,
        page: u32,
        per_page: u32,
    ) -> ProviderResult<(Vec<Repository>, bool)> {
        self.rate_limiter.wait().await?;

        let url = format!(
            "{}/{}/{}/repos?per_page={}&page={}",
            self.base_url,
            kind.api_segment(),
            owner,
            per_page,
            page
        );

        debug!(url = %url, page, "fetching repository page");
        crate::metrics::record_api_request("github");

        let response = self
            .apply_headers(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        self.sync_rate_limiter(response.headers());

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(ProviderError::AuthenticationFailed),
            StatusCode::FORBIDDEN => return Err(ProviderError::Forbidden),
            StatusCode::NOT_FOUND => return Err(ProviderError::OwnerNotFound(owner.to_string())),
            status => {
                let message = response.text().await.unwrap_or_default();
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
        }

        let payloads: Vec<GithubRepoPayload> = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let has_more = payloads.len() as u32 == per_page;
        let mut repos = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let repo = convert_payload(payload);
            if let Err(e) = repo.validate() {
                warn!(repo = %repo.full_name(), error = %e, "skipping malformed repository record");
                continue;
            }
            repos.push(repo);
        }

        Ok((repos, has_more))
    }
}

fn convert_payload(payload: GithubRepoPayload) -> Repository {
    Repository {
        id: payload.id,
        name: payload.name,
        clone_url: payload.clone_url,
        owner: payload.owner.login,
        is_fork: payload.fork,
        size: payload.size,
        default_branch: payload.default_branch,
        language: payload.language,
        description: payload.description,
        updated_at: payload.updated_at.unwrap_or_else(Utc::now),
    }
}

#[async_trait::async_trait]
impl RepositoryProvider for GithubProvider {
    async fn fetch_repositories(
        &self,
        owner: &str,
        kind: RepoKind,
        filter: &RepositoryFilter,
        pagination: &PaginationOptions,
    ) -> ProviderResult<Vec<Repository>> {
        let pagination = pagination.normalized();
        let mut page = pagination.page;
        let mut repos = Vec::new();

        loop {
            if self.cancel_requested() {
                return Err(ProviderError::Cancelled);
            }

            let (page_repos, has_more) = self
                .fetch_page(owner, kind, page, pagination.per_page)
                .await?;

            repos.extend(page_repos.into_iter().filter(|r| filter.should_include(r)));

            if !has_more {
                break;
            }
            page += 1;
        }

        info!(
            owner,
            kind = %kind,
            total = repos.len(),
            "fetched repositories from GitHub"
        );

        Ok(repos)
    }

    async fn validate_credentials(&self) -> ProviderResult<()> {
        if self.token.is_none() {
            return Err(ProviderError::AuthenticationFailed);
        }

        let url = format!("{}/user", self.base_url);
        let response = self
            .apply_headers(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(ProviderError::AuthenticationFailed),
            status => Err(ProviderError::Api {
                status: status.as_u16(),
                message: "unexpected status validating token".to_string(),
            }),
        }
    }

    async fn rate_limit_info(&self) -> ProviderResult<RateLimitInfo> {
        let url = format!("{}/rate_limit", self.base_url);
        let response = self
            .apply_headers(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(ProviderError::Api {
                status: response.status().as_u16(),
                message: "failed to fetch rate limit".to_string(),
            });
        }

        let payload: GithubRateLimitPayload = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(RateLimitInfo {
            limit: payload.rate.limit,
            remaining: payload.rate.remaining,
            reset_at: Utc
                .timestamp_opt(payload.rate.reset, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }

    fn name(&self) -> &'static str {
        "github"
    }
}
