//! CLI command implementations

pub mod clone;
pub mod error;
pub mod list;

pub use clone::CloneArgs;
pub use error::CliError;
pub use list::ListArgs;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::engine::FetchUseCase;
use crate::provider::{BitbucketProvider, GithubProvider, RateLimiter, RepositoryProvider};
use crate::{RepoKind, RepositoryFilter};

/// Concurrent repository cloner for GitHub and Bitbucket accounts.
#[derive(Debug, Parser)]
#[command(name = "repo-cloner", version, about)]
pub struct Cli {
    /// GitHub personal access token
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub github_token: Option<String>,

    /// Bitbucket username for basic auth
    #[arg(long, env = "BITBUCKET_USERNAME", global = true)]
    pub bitbucket_username: Option<String>,

    /// Bitbucket app password for basic auth
    #[arg(
        long,
        env = "BITBUCKET_APP_PASSWORD",
        global = true,
        hide_env_values = true
    )]
    pub bitbucket_password: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enumerate an account's repositories and print them
    List(ListArgs),
    /// Enumerate an account's repositories and clone them in parallel
    Clone(CloneArgs),
}

/// Account selection shared by every subcommand.
#[derive(Debug, clap::Args)]
pub struct SelectionArgs {
    /// Account login: user, organization, or workspace slug
    pub owner: String,

    /// Account kind: user, org, bitbucket-user, bitbucket-workspace
    #[arg(long, default_value = "user")]
    pub kind: RepoKind,
}

/// Filter flags shared by every subcommand.
#[derive(Debug, clap::Args)]
pub struct FilterArgs {
    /// Include forked repositories
    #[arg(long)]
    pub include_forks: bool,

    /// Only include repositories with one of these primary languages
    #[arg(long = "language")]
    pub languages: Vec<String>,

    /// Minimum repository size in bytes
    #[arg(long, default_value_t = 0)]
    pub min_size: i64,

    /// Maximum repository size in bytes; -1 means unbounded
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub max_size: i64,

    /// Only include repositories updated after this date (YYYY-MM-DD or RFC3339)
    #[arg(long, value_parser = parse_updated_after)]
    pub updated_after: Option<DateTime<Utc>>,

    /// Include private repositories as well as public ones
    #[arg(long)]
    pub private: bool,
}

impl FilterArgs {
    /// Translate the flags into a domain filter.
    pub fn to_filter(&self) -> RepositoryFilter {
        RepositoryFilter {
            include_forks: self.include_forks,
            min_size: self.min_size,
            max_size: self.max_size,
            languages: self.languages.clone(),
            updated_after: self.updated_after,
            only_public: !self.private,
        }
    }
}

/// Parse a cutoff timestamp from YYYY-MM-DD or RFC3339 input.
///
/// Date-only input means start-of-day UTC; RFC3339 input is taken exactly,
/// with a missing timezone designator assumed UTC.
fn parse_updated_after(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| format!("invalid date: {e}"))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| "invalid date".to_string())?;
    Ok(datetime.and_utc())
}

/// Build the fetch use case from the global credential flags, threading
/// `cancel` into both providers and their rate limiters.
pub fn build_fetch_usecase(cli: &Cli, cancel: &CancelToken) -> Result<FetchUseCase, CliError> {
    let github_limiter = Arc::new(
        RateLimiter::new(RateLimiter::GITHUB_HOURLY_QUOTA).with_cancel(cancel.clone()),
    );
    let mut github_builder = GithubProvider::builder()
        .rate_limiter(github_limiter)
        .cancel_token(cancel.clone());
    if let Some(token) = &cli.github_token {
        github_builder = github_builder.token(token);
    }
    let github = github_builder
        .build()
        .map_err(CliError::Provider)?;

    let bitbucket_limiter = Arc::new(
        RateLimiter::new(RateLimiter::BITBUCKET_HOURLY_QUOTA).with_cancel(cancel.clone()),
    );
    let mut bitbucket_builder = BitbucketProvider::builder()
        .rate_limiter(bitbucket_limiter)
        .cancel_token(cancel.clone());
    if let (Some(username), Some(password)) = (&cli.bitbucket_username, &cli.bitbucket_password) {
        bitbucket_builder = bitbucket_builder.credentials(username, password);
    }
    let bitbucket = bitbucket_builder
        .build()
        .map_err(CliError::Provider)?;

    let github: Arc<dyn RepositoryProvider> = Arc::new(github);
    let bitbucket: Arc<dyn RepositoryProvider> = Arc::new(bitbucket);
    Ok(FetchUseCase::new(Some(github), Some(bitbucket)))
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
