//! Fetch use case: validated, provider-dispatched enumeration.

use std::sync::Arc;
use tracing::{error, info};

use super::{EngineError, EngineResult};
use crate::provider::{ProviderError, RepositoryProvider};
use crate::{PaginationOptions, RepoKind, Repository, RepositoryFilter};

/// Input for fetching repositories.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Account login (user, org, or workspace slug)
    pub owner: String,
    /// Which provider and URL template to use
    pub kind: RepoKind,
    /// Inclusion predicates
    pub filter: RepositoryFilter,
    /// Starting page and page size; None uses defaults
    pub pagination: Option<PaginationOptions>,
}

/// Output of fetching repositories.
#[derive(Debug)]
pub struct FetchResponse {
    /// Records that passed the filter
    pub repositories: Vec<Repository>,
    /// Records fetched before filtering
    pub total_fetched: usize,
    /// Records rejected by the filter
    pub filtered_out: usize,
}

/// Orchestrates enumeration: selects the provider by kind, applies the
/// filter once more, and reports counts.
pub struct FetchUseCase {
    github: Option<Arc<dyn RepositoryProvider>>,
    bitbucket: Option<Arc<dyn RepositoryProvider>>,
}

impl FetchUseCase {
    /// Create the use case with whichever providers are configured.
    pub fn new(
        github: Option<Arc<dyn RepositoryProvider>>,
        bitbucket: Option<Arc<dyn RepositoryProvider>>,
    ) -> Self {
        Self { github, bitbucket }
    }

    /// Execute the fetch.
    pub async fn execute(&self, request: FetchRequest) -> EngineResult<FetchResponse> {
        Self::validate_request(&request)?;

        let pagination = request.pagination.unwrap_or_default().normalized();

        info!(
            owner = %request.owner,
            kind = %request.kind,
            page = pagination.page,
            per_page = pagination.per_page,
            "fetching repositories"
        );

        // Providers pre-filter as a convenience; the engine re-applies the
        // predicate so the boundary guarantee holds regardless.
        let fetched = if request.kind.is_github() {
            let provider = self
                .github
                .as_ref()
                .ok_or(EngineError::ProviderNotConfigured("GitHub"))?;
            provider
                .fetch_repositories(&request.owner, request.kind, &request.filter, &pagination)
                .await
        } else {
            let provider = self
                .bitbucket
                .as_ref()
                .ok_or(EngineError::ProviderNotConfigured("Bitbucket"))?;
            provider
                .fetch_repositories(&request.owner, request.kind, &request.filter, &pagination)
                .await
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(owner = %request.owner, error = %e, "failed to fetch repositories");
                return Err(e.into());
            }
        };

        let total_fetched = fetched.len();
        let repositories: Vec<Repository> = fetched
            .into_iter()
            .filter(|r| request.filter.should_include(r))
            .collect();
        let filtered_out = total_fetched - repositories.len();

        info!(
            owner = %request.owner,
            total = total_fetched,
            included = repositories.len(),
            filtered_out,
            "repositories fetched"
        );

        Ok(FetchResponse {
            repositories,
            total_fetched,
            filtered_out,
        })
    }

    /// Probe whether an owner exists by fetching a single record.
    pub async fn validate_owner_exists(&self, owner: &str, kind: RepoKind) -> EngineResult<()> {
        let probe = FetchRequest {
            owner: owner.to_string(),
            kind,
            filter: RepositoryFilter {
                include_forks: true,
                only_public: false,
                ..Default::default()
            },
            pagination: Some(PaginationOptions {
                page: 1,
                per_page: 1,
            }),
        };

        match self.execute(probe).await {
            Ok(_) => Ok(()),
            Err(EngineError::Provider(ProviderError::OwnerNotFound(_))) => Err(
                EngineError::InvalidRequest(format!("owner '{owner}' not found")),
            ),
            Err(e) => Err(e),
        }
    }

    fn validate_request(request: &FetchRequest) -> EngineResult<()> {
        if request.owner.is_empty() {
            return Err(EngineError::InvalidRequest(
                "owner cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
