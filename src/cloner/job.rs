//! Clone job model and status tracking

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::cloner::config;
use crate::Repository;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobStatus {
    /// Job has not started yet
    #[default]
    Pending,
    /// Job is currently running
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
    /// Destination already existed and was skipped
    Skipped,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Options controlling how a repository is cloned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneOptions {
    /// History depth; 0 clones the full history
    pub depth: u32,
    /// Pass `--recurse-submodules` to git
    pub recurse_submodules: bool,
    /// Explicit branch to check out; None uses the remote default
    pub branch: Option<String>,
    /// Skip destinations that already hold a `.git` directory
    pub skip_existing: bool,
    /// Place clones under `base/owner/name` instead of `base/name`
    pub create_owner_dirs: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            recurse_submodules: true,
            branch: None,
            skip_existing: true,
            create_owner_dirs: false,
        }
    }
}

impl CloneOptions {
    /// Validate option consistency.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(branch) = &self.branch {
            if branch.is_empty() {
                return Err("branch name cannot be empty when set".to_string());
            }
        }
        Ok(())
    }
}

/// A repository cloning job: one repository, its destination, its options,
/// and a mutable lifecycle state.
#[derive(Debug, Clone)]
pub struct CloneJob {
    /// Unique id from a process-wide monotonic generator
    pub id: u64,
    /// The repository to clone
    pub repository: Repository,
    /// Directory under which the clone lands
    pub base_directory: PathBuf,
    /// Clone options
    pub options: CloneOptions,
    /// Current lifecycle status
    pub status: JobStatus,
    /// When execution started
    pub started_at: Option<Instant>,
    /// When the job reached a terminal state
    pub completed_at: Option<Instant>,
    /// Last error message, if any
    pub error: Option<String>,
    /// Retries performed so far
    pub retry_count: u32,
    /// Retry budget
    pub max_retries: u32,
}

impl CloneJob {
    /// Create a pending job with a fresh id and the default retry budget.
    pub fn new(repository: Repository, base_directory: impl Into<PathBuf>, options: CloneOptions) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            repository,
            base_directory: base_directory.into(),
            options,
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            retry_count: 0,
            max_retries: config::MAX_RETRIES,
        }
    }

    /// Full path where this repository will be cloned.
    pub fn destination_path(&self) -> PathBuf {
        if self.options.create_owner_dirs {
            self.base_directory
                .join(&self.repository.owner)
                .join(&self.repository.name)
        } else {
            self.repository.local_path(&self.base_directory)
        }
    }

    /// Whether another retry is allowed: only failed jobs with budget left.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries && self.status == JobStatus::Failed
    }

    /// Mark the job as running and stamp the start time.
    pub fn mark_started(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Instant::now());
    }

    /// Mark the job as completed, clearing any recorded error.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Instant::now());
        self.error = None;
    }

    /// Mark the job as failed with an error message.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Instant::now());
        self.error = Some(error.into());
    }

    /// Mark the job as skipped with the given reason.
    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Skipped;
        self.completed_at = Some(Instant::now());
        self.error = Some(format!("skipped: {}", reason.into()));
    }

    /// Spend one retry: increments the counter and resets the job to
    /// pending, but only when [`CloneJob::can_retry`] holds.
    pub fn retry(&mut self) {
        if self.can_retry() {
            self.retry_count += 1;
            self.status = JobStatus::Pending;
            self.error = None;
        }
    }

    /// Execution duration: completed minus started while terminal, elapsed
    /// while running, zero before the job starts.
    pub fn duration(&self) -> Duration {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Validate the job's repository, destination, and options.
    pub fn validate(&self) -> Result<(), String> {
        self.repository.validate()?;

        if self.base_directory.as_os_str().is_empty() {
            return Err("base directory cannot be empty".to_string());
        }

        self.options.validate()?;

        Ok(())
    }
}

/// Outcome record emitted once per job upon reaching a terminal state.
///
/// Skipped jobs count as successes: the repository is present on disk.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// The finished job, including its terminal status and error
    pub job: CloneJob,
    /// Whether the terminal state is completed or skipped
    pub success: bool,
    /// Measured wall-clock duration
    pub duration: Duration,
    /// Bytes on disk under the destination after the clone
    pub bytes_on_disk: u64,
}

impl JobResult {
    /// Build a result, measuring the duration from the job itself.
    pub fn new(job: CloneJob, success: bool, bytes_on_disk: u64) -> Self {
        let duration = job.duration();
        Self {
            job,
            success,
            duration,
            bytes_on_disk,
        }
    }
}
