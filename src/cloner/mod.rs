//! Clone orchestration: jobs, the git executor, the worker pool, and
//! progress tracking.

pub mod config;
pub mod git;
pub mod job;
pub mod pool;
pub mod progress;
pub mod service;

pub use git::{GitCli, GitExecutor};
pub use job::{CloneJob, CloneOptions, JobResult, JobStatus};
pub use pool::{JobManager, WorkerPool, WorkerPoolConfig};
pub use progress::{Progress, ProgressTracker, RecentCompletion};

use std::path::PathBuf;

/// Git operation errors.
///
/// Clone failures are classified by scanning the subprocess's combined
/// output; the split into permanent and retryable variants drives the
/// worker pool's retry decision.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Job or destination failed validation before execution
    #[error("validation error: {0}")]
    Validation(String),

    /// Destination already holds a cloned repository
    #[error("repository already exists at: {}", path.display())]
    RepositoryExists {
        /// The occupied destination
        path: PathBuf,
    },

    /// Git reported an authentication failure
    #[error("git authentication failed")]
    AuthenticationFailed,

    /// Remote repository does not exist or is not visible
    #[error("repository not found")]
    RepositoryNotFound,

    /// Permission denied by the remote or the filesystem
    #[error("permission denied")]
    PermissionDenied,

    /// Network unreachable
    #[error("network unreachable")]
    NetworkUnreachable,

    /// Connection timed out
    #[error("connection timed out")]
    ConnectionTimedOut,

    /// No space left on device
    #[error("no space left on device")]
    DiskFull,

    /// Destination path exceeds filesystem limits
    #[error("file path too long")]
    PathTooLong,

    /// The clone attempt was cancelled
    #[error("clone cancelled")]
    Cancelled,

    /// The clone process exceeded its timeout
    #[error("clone timed out")]
    Timeout,

    /// Unclassified git failure
    #[error("git command failed: {message}")]
    Other {
        /// Failure summary
        message: String,
        /// Captured combined output
        output: String,
    },
}

impl GitError {
    /// Permanent errors are attempted exactly once.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            GitError::Validation(_)
                | GitError::AuthenticationFailed
                | GitError::RepositoryNotFound
                | GitError::PermissionDenied
                | GitError::DiskFull
                | GitError::PathTooLong
        )
    }

    /// Retryable errors re-enter the backoff loop until the retry budget
    /// runs out. Unclassified failures are retryable by default.
    /// `RepositoryExists` and `Cancelled` are neither: the pool maps them
    /// to skip and cancellation outcomes directly.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitError::NetworkUnreachable
                | GitError::ConnectionTimedOut
                | GitError::Timeout
                | GitError::Other { .. }
        )
    }
}
