//! Git executor: drives the external `git` binary for clone operations.
//!
//! Failures are classified by substring scan of the subprocess's combined
//! output. Clones run with a locale-neutral environment so git's English
//! messages stay stable for classification across hosts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::config;
use super::job::CloneJob;
use super::service;
use super::GitError;
use crate::cancel::CancelToken;

/// Contract for executing git operations.
///
/// The worker pool depends on this trait so tests can script outcomes
/// without a git binary or network access.
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Perform one clone attempt for `job`, synchronously from the
    /// caller's point of view.
    async fn clone_repository(&self, job: &CloneJob) -> Result<(), GitError>;

    /// Total bytes on disk under `path`.
    async fn repository_size(&self, path: &Path) -> Result<u64, GitError>;

    /// Verify the external git binary is present and callable.
    async fn validate_installation(&self) -> Result<(), GitError>;
}

/// Executor backed by the system `git` binary.
pub struct GitCli {
    git_path: PathBuf,
    timeout: Duration,
    cancel: Option<CancelToken>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Create an executor using `git` from `PATH` and the default timeout.
    pub fn new() -> Self {
        Self {
            git_path: PathBuf::from("git"),
            timeout: config::CLONE_TIMEOUT,
            cancel: None,
        }
    }

    /// Use an explicit git binary path.
    pub fn with_git_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.git_path = path.into();
        self
    }

    /// Override the per-clone timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a cancellation token so in-flight clones can be terminated.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn build_clone_args(job: &CloneJob) -> Vec<String> {
        let mut args = vec!["clone".to_string()];

        if job.options.depth > 0 {
            args.push("--depth".to_string());
            args.push(job.options.depth.to_string());
        }

        if let Some(branch) = &job.options.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
        }

        if job.options.recurse_submodules {
            args.push("--recurse-submodules".to_string());
        }

        args.push("--no-hardlinks".to_string());
        args.push("--quiet".to_string());

        args.push(job.repository.clone_url.clone());
        args.push(job.destination_path().to_string_lossy().into_owned());

        args
    }

    /// Run a git command to completion, honoring timeout and cancellation.
    async fn run_git(&self, args: &[String]) -> Result<std::process::Output, GitError> {
        let mut cmd = Command::new(&self.git_path);
        cmd.args(args)
            .env("LC_ALL", "C")
            .env("LANG", "C")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output_future = tokio::time::timeout(self.timeout, cmd.output());

        let result = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    result = output_future => result,
                    _ = token.cancelled() => return Err(GitError::Cancelled),
                }
            }
            None => output_future.await,
        };

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(GitError::Other {
                message: format!("failed to spawn git: {e}"),
                output: String::new(),
            }),
            Err(_) => Err(GitError::Timeout),
        }
    }

    fn repository_exists(path: &Path) -> bool {
        path.join(".git").is_dir()
    }
}

/// Classify a failed clone by scanning its lowercased combined output.
pub fn classify_clone_output(output: &str, fallback_message: &str) -> GitError {
    let output = output.to_lowercase();

    if output.contains("authentication failed") {
        GitError::AuthenticationFailed
    } else if output.contains("repository not found") {
        GitError::RepositoryNotFound
    } else if output.contains("permission denied") {
        GitError::PermissionDenied
    } else if output.contains("network is unreachable") {
        GitError::NetworkUnreachable
    } else if output.contains("connection timed out") {
        GitError::ConnectionTimedOut
    } else if output.contains("no space left on device") {
        GitError::DiskFull
    } else if output.contains("filename too long") {
        GitError::PathTooLong
    } else {
        GitError::Other {
            message: format!("git command failed: {fallback_message}"),
            output,
        }
    }
}

/// Sum of file sizes under `path`, walked iteratively.
pub fn directory_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }

    Ok(total)
}

#[async_trait]
impl GitExecutor for GitCli {
    async fn clone_repository(&self, job: &CloneJob) -> Result<(), GitError> {
        service::validate_clone_job(job).map_err(GitError::Validation)?;

        let dest = job.destination_path();

        if Self::repository_exists(&dest) {
            if job.options.skip_existing {
                info!(
                    repo = %job.repository.full_name(),
                    path = %dest.display(),
                    "repository already exists, skipping"
                );
                return Err(GitError::RepositoryExists { path: dest });
            }

            std::fs::remove_dir_all(&dest).map_err(|e| GitError::Other {
                message: format!("failed to remove existing repository: {e}"),
                output: String::new(),
            })?;
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitError::Other {
                message: format!("failed to create destination directory: {e}"),
                output: String::new(),
            })?;
        }

        let args = Self::build_clone_args(job);
        debug!(repo = %job.repository.full_name(), ?args, "running git clone");

        let output = self.run_git(&args).await?;

        if !output.status.success() {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            warn!(
                repo = %job.repository.full_name(),
                status = %output.status,
                output = %combined.trim(),
                "git clone failed"
            );
            return Err(classify_clone_output(&combined, &output.status.to_string()));
        }

        info!(
            repo = %job.repository.full_name(),
            path = %dest.display(),
            "repository cloned"
        );

        Ok(())
    }

    async fn repository_size(&self, path: &Path) -> Result<u64, GitError> {
        if !Self::repository_exists(path) {
            return Err(GitError::Validation(format!(
                "no repository at {}",
                path.display()
            )));
        }

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || directory_size(&path))
            .await
            .map_err(|e| GitError::Other {
                message: format!("size walk panicked: {e}"),
                output: String::new(),
            })?
            .map_err(|e| GitError::Other {
                message: format!("failed to measure repository size: {e}"),
                output: String::new(),
            })
    }

    async fn validate_installation(&self) -> Result<(), GitError> {
        let output = self.run_git(&["--version".to_string()]).await?;

        if !output.status.success() {
            return Err(GitError::Other {
                message: "git --version failed".to_string(),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout);
        if !version.trim_start().starts_with("git version") {
            return Err(GitError::Other {
                message: format!("unexpected git version output: {}", version.trim()),
                output: String::new(),
            });
        }

        debug!(version = %version.trim(), "git installation validated");
        Ok(())
    }
}

impl GitCli {
    /// Verify the object store of a cloned repository with `git fsck`.
    pub async fn check_integrity(&self, path: &Path) -> Result<(), GitError> {
        if !Self::repository_exists(path) {
            return Err(GitError::Validation(format!(
                "no repository at {}",
                path.display()
            )));
        }

        let args = vec![
            "-C".to_string(),
            path.to_string_lossy().into_owned(),
            "fsck".to_string(),
            "--quick".to_string(),
        ];
        let output = self.run_git(&args).await?;

        if !output.status.success() {
            return Err(GitError::Other {
                message: "repository integrity check failed".to_string(),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }

    /// Fast-forward an existing clone from its remote.
    pub async fn update_repository(&self, path: &Path) -> Result<(), GitError> {
        if !Self::repository_exists(path) {
            return Err(GitError::Validation(format!(
                "no repository at {}",
                path.display()
            )));
        }

        let args = vec![
            "-C".to_string(),
            path.to_string_lossy().into_owned(),
            "pull".to_string(),
            "--ff-only".to_string(),
        ];
        let output = self.run_git(&args).await?;

        if !output.status.success() {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(classify_clone_output(&combined, &output.status.to_string()));
        }

        info!(path = %path.display(), "repository updated");
        Ok(())
    }
}
