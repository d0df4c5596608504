//! Bitbucket enumeration client.
//!
//! Walks `/repositories/{owner}` following cursor-style `next` links until
//! the cursor runs out. Users and workspaces share the same URL template;
//! the kind only selects this client at the engine boundary.

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

const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org/2.0";
const DEFAULT_USER_AGENT: &str = "repo-cloner/0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Repository payload as returned by the Bitbucket 2.0 API.
#[derive(Debug, Deserialize)]
struct BitbucketRepoPayload {
    uuid: String,
    name: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    size: i64,
    language: Option<String>,
    description: Option<String>,
    updated_on: Option<DateTime<Utc>>,
    parent: Option<BitbucketParentPayload>,
    owner: BitbucketOwnerPayload,
    links: BitbucketLinksPayload,
    mainbranch: Option<BitbucketBranchPayload>,
}

#[derive(Debug, Deserialize)]
struct BitbucketParentPayload {
    #[serde(default)]
    #[allow(dead_code)]
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketOwnerPayload {
    #[serde(default)]
    username: String,
    #[serde(default)]
    nickname: String,
}

#[derive(Debug, Deserialize, Default)]
struct BitbucketLinksPayload {
    #[serde(default)]
    clone: Vec<BitbucketCloneLink>,
}

#[derive(Debug, Deserialize)]
struct BitbucketCloneLink {
    name: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketBranchPayload {
    name: String,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Deserialize)]
struct BitbucketPagePayload {
    #[serde(default)]
    values: Vec<BitbucketRepoPayload>,
    #[serde(default)]
    next: Option<String>,
}

/// Bitbucket API client implementing [`RepositoryProvider`].
pub struct BitbucketProvider {
    client: Client,
    base_url: String,
    username: Option<String>,
    app_password: Option<String>,
    user_agent: String,
    rate_limiter: Arc<RateLimiter>,
    cancel: Option<CancelToken>,
}

/// Builder for [`BitbucketProvider`].
#[derive(Default)]
pub struct BitbucketProviderBuilder {
    base_url: Option<String>,
    username: Option<String>,
    app_password: Option<String>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    rate_limiter: Option<Arc<RateLimiter>>,
    client: Option<Client>,
    cancel: Option<CancelToken>,
}

impl BitbucketProviderBuilder {
    /// Override the API base URL (used by tests against a local server).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set basic-auth credentials (username + app password).
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Self {
        let username = username.into();
        let app_password = app_password.into();
        if !username.is_empty() && !app_password.is_empty() {
            self.username = Some(username);
            self.app_password = Some(app_password);
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

    /// Attach a cancellation token so cursor walks become interruptible.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build the provider.
    pub fn build(self) -> ProviderResult<BitbucketProvider> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()
                .map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        Ok(BitbucketProvider {
            client,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            username: self.username,
            app_password: self.app_password,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            rate_limiter: self.rate_limiter.unwrap_or_else(|| {
                Arc::new(RateLimiter::new(RateLimiter::BITBUCKET_HOURLY_QUOTA))
            }),
            cancel: self.cancel,
        })
    }
}

impl BitbucketProvider {
    /// Start building a provider.
    pub fn builder() -> BitbucketProviderBuilder {
        BitbucketProviderBuilder::default()
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }

    fn apply_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent);
        match (&self.username, &self.app_password) {
            (Some(username), Some(password)) => request.basic_auth(username, Some(password)),
            _ => request,
        }
    }

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

    async fn fetch_page(&self, url: &str, owner: &str) -> ProviderResult<BitbucketPagePayload> {
        self.rate_limiter.wait().await?;

        debug!(url = %url, "fetching repository page");
        crate::metrics::record_api_request("bitbucket");

        let response = self
            .apply_headers(self.client.get(url))
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

        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Roll a Bitbucket UUID into an i64 identifier.
///
/// Simple 31-multiplier rolling hash over the UUID body with the enclosing
/// braces stripped. Collisions are theoretically possible; ids are never
/// compared for identity here, so the hash only needs to be stable.
fn hash_uuid(uuid: &str) -> i64 {
    let body = uuid.trim_start_matches('{').trim_end_matches('}');
    let mut id: i64 = 0;
    for ch in body.chars() {
        id = id.wrapping_mul(31).wrapping_add(ch as i64);
    }
    if id < 0 {
        id = id.wrapping_neg();
    }
    id.max(0)
}

fn convert_payload(payload: BitbucketRepoPayload) -> Repository {
    // Prefer the https clone link, fall back to whatever is listed first.
    let clone_url = payload
        .links
        .clone
        .iter()
        .find(|link| link.name == "https")
        .or_else(|| payload.links.clone.first())
        .map(|link| link.href.clone())
        .unwrap_or_default();

    let default_branch = payload
        .mainbranch
        .map(|b| b.name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "main".to_string());

    let owner = if payload.owner.username.is_empty() {
        payload.owner.nickname
    } else {
        payload.owner.username
    };

    Repository {
        id: hash_uuid(&payload.uuid),
        name: payload.name,
        clone_url,
        owner,
        is_fork: payload.parent.is_some(),
        size: payload.size,
        default_branch,
        language: payload.language.filter(|l| !l.is_empty()),
        description: payload.description.filter(|d| !d.is_empty()),
        updated_at: payload.updated_on.unwrap_or_else(Utc::now),
    }
}

#[async_trait::async_trait]
impl RepositoryProvider for BitbucketProvider {
    async fn fetch_repositories(
        &self,
        owner: &str,
        kind: RepoKind,
        filter: &RepositoryFilter,
        pagination: &PaginationOptions,
    ) -> ProviderResult<Vec<Repository>> {
        let pagination = pagination.normalized();
        let mut url = format!(
            "{}/repositories/{}?page={}&pagelen={}",
            self.base_url, owner, pagination.page, pagination.per_page
        );
        let mut repos = Vec::new();

        loop {
            if self.cancel_requested() {
                return Err(ProviderError::Cancelled);
            }

            let page = self.fetch_page(&url, owner).await?;

            for payload in page.values {
                let full_name = payload.full_name.clone();
                let repo = convert_payload(payload);
                if let Err(e) = repo.validate() {
                    warn!(repo = %full_name, error = %e, "skipping malformed repository record");
                    continue;
                }
                if filter.should_include(&repo) {
                    repos.push(repo);
                }
            }

            match page.next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        info!(
            owner,
            kind = %kind,
            total = repos.len(),
            "fetched repositories from Bitbucket"
        );

        Ok(repos)
    }

    async fn validate_credentials(&self) -> ProviderResult<()> {
        if self.username.is_none() || self.app_password.is_none() {
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
                message: "unexpected status validating credentials".to_string(),
            }),
        }
    }

    async fn rate_limit_info(&self) -> ProviderResult<RateLimitInfo> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .apply_headers(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let headers = response.headers();
        let parse = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
        };

        Ok(RateLimitInfo {
            limit: parse("x-ratelimit-limit").unwrap_or(0) as usize,
            remaining: parse("x-ratelimit-remaining").unwrap_or(0) as usize,
            reset_at: parse("x-ratelimit-reset")
                .and_then(|reset| Utc.timestamp_opt(reset, 0).single())
                .unwrap_or_else(Utc::now),
        })
    }

    fn name(&self) -> &'static str {
        "bitbucket"
    }
}
