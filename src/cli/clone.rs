//! `clone` command: enumerate an account and clone everything in parallel.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::{format_bytes, CliError, FilterArgs, SelectionArgs};
use crate::cancel::CancelToken;
use crate::cloner::{CloneOptions, GitCli, GitExecutor, WorkerPool, WorkerPoolConfig};
use crate::engine::{
    CloneBatchRequest, CloneBatchUseCase, EngineError, FetchRequest, FetchUseCase,
};
use crate::provider::ProviderError;

/// Hard ceiling on worker count to keep clone storms in check.
const MAX_CONCURRENCY: usize = 64;

/// Arguments for the `clone` subcommand.
#[derive(Debug, clap::Args)]
pub struct CloneArgs {
    /// Account to clone
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Filters applied before cloning
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Directory under which clones are placed
    #[arg(long, required = true)]
    pub dest: PathBuf,

    /// History depth; 0 clones the full history
    #[arg(long, default_value_t = 1)]
    pub depth: u32,

    /// Check out this branch instead of the remote default
    #[arg(long)]
    pub branch: Option<String>,

    /// Do not pass --recurse-submodules to git
    #[arg(long)]
    pub skip_submodules: bool,

    /// Re-clone destinations that already exist instead of skipping them
    #[arg(long)]
    pub no_skip_existing: bool,

    /// Place clones under dest/<owner>/<name> instead of dest/<name>
    #[arg(long)]
    pub owner_dirs: bool,

    /// Number of parallel clone workers (default: twice the CPU cores)
    #[arg(long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Retry budget per repository
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Parse and bound the concurrency override.
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

impl CloneArgs {
    fn clone_options(&self) -> CloneOptions {
        CloneOptions {
            depth: self.depth,
            recurse_submodules: !self.skip_submodules,
            branch: self.branch.clone(),
            skip_existing: !self.no_skip_existing,
            create_owner_dirs: self.owner_dirs,
        }
    }

    /// Run the command.
    pub async fn execute(&self, fetch: &FetchUseCase, cancel: &CancelToken) -> Result<(), CliError> {
        let base_directory = if self.dest.is_absolute() {
            self.dest.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| CliError::InvalidArgument(format!("cannot resolve cwd: {e}")))?
                .join(&self.dest)
        };

        // Enumerate first; an empty account means there is nothing to do.
        let fetched = match fetch
            .execute(FetchRequest {
                owner: self.selection.owner.clone(),
                kind: self.selection.kind,
                filter: self.filter.to_filter(),
                pagination: None,
            })
            .await
        {
            Ok(fetched) => fetched,
            Err(EngineError::Provider(ProviderError::OwnerNotFound(owner))) => {
                println!("Owner '{owner}' not found or has no visible repositories.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if fetched.repositories.is_empty() {
            println!(
                "No repositories to clone for {} (fetched {}, filtered out {}).",
                self.selection.owner, fetched.total_fetched, fetched.filtered_out
            );
            return Ok(());
        }

        info!(
            owner = %self.selection.owner,
            count = fetched.repositories.len(),
            dest = %base_directory.display(),
            "starting clone batch"
        );

        // The executor must exist before any job is submitted.
        let git = Arc::new(GitCli::new().with_cancel(cancel.clone()));
        git.validate_installation().await?;

        let mut pool_config = WorkerPoolConfig::default();
        if let Some(concurrency) = self.concurrency {
            pool_config.max_workers = concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            pool_config.max_retries = max_retries;
        }

        let pool = Arc::new(WorkerPool::new(pool_config, git));

        // Bridge Ctrl+C into the pool's cancellation token.
        {
            let process_cancel = cancel.clone();
            let pool_cancel = pool.cancel_token();
            tokio::spawn(async move {
                process_cancel.cancelled().await;
                pool_cancel.cancel();
            });
        }

        let bar = ProgressBar::new(fetched.repositories.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );

        let observer_bar = bar.clone();
        let observer: crate::engine::ProgressObserver = Box::new(move |progress| {
            observer_bar.set_length(progress.total as u64);
            observer_bar.set_position(progress.processed() as u64);
            if let Some(recent) = &progress.recent_completion {
                observer_bar.set_message(format!("{} ({})", recent.repository, recent.status));
            }
        });

        let usecase = CloneBatchUseCase::new(Arc::clone(&pool));

        let estimate = usecase.estimate_duration(&fetched.repositories);
        info!(
            estimate_secs = estimate.as_secs(),
            "estimated batch duration from reported repository sizes"
        );

        let response = usecase
            .execute(
                CloneBatchRequest {
                    repositories: fetched.repositories,
                    base_directory,
                    options: self.clone_options(),
                    concurrency: self.concurrency,
                },
                Some(observer),
            )
            .await?;

        bar.finish_and_clear();

        let total_bytes: u64 = response.results.iter().map(|r| r.bytes_on_disk).sum();

        println!(
            "Cloned {} repositories in {:.1}s: {} completed, {} failed, {} skipped ({})",
            response.total_jobs,
            response.duration.as_secs_f64(),
            response.completed,
            response.failed,
            response.skipped,
            format_bytes(total_bytes),
        );

        if response.failed > 0 {
            warn!(failed = response.failed, "some repositories failed to clone");
            for result in response.results.iter().filter(|r| !r.success) {
                println!(
                    "  failed: {} - {}",
                    result.job.repository.full_name(),
                    result.job.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Ok(())
    }
}
