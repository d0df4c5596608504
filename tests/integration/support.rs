//! Shared test fixtures: a scripted git executor and repository builders.

use async_trait::async_trait;
use chrono::Utc;
use repo_cloner::cloner::{CloneJob, GitError, GitExecutor};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted clone outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The clone succeeds
    Succeed,
    /// The destination already holds a repository
    AlreadyExists,
    /// Permanent: remote repository missing
    NotFound,
    /// Permanent: authentication rejected
    AuthFailed,
    /// Retryable: connection timed out
    TimedOut,
    /// Retryable: network unreachable
    NetworkUnreachable,
}

impl Step {
    fn into_result(self, job: &CloneJob) -> Result<(), GitError> {
        match self {
            Step::Succeed => Ok(()),
            Step::AlreadyExists => Err(GitError::RepositoryExists {
                path: job.destination_path(),
            }),
            Step::NotFound => Err(GitError::RepositoryNotFound),
            Step::AuthFailed => Err(GitError::AuthenticationFailed),
            Step::TimedOut => Err(GitError::ConnectionTimedOut),
            Step::NetworkUnreachable => Err(GitError::NetworkUnreachable),
        }
    }
}

/// Scripted [`GitExecutor`] for driving the pool without a git binary.
///
/// Outcomes are consumed per repository name in order; once a script runs
/// dry further attempts succeed. Tracks attempt counts and the peak number
/// of concurrent clones.
pub struct FakeGit {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    attempts: Mutex<HashMap<String, u32>>,
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long inside every clone attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Script the outcomes for one repository name.
    pub fn script(&self, name: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), steps.into_iter().collect());
    }

    /// Clone attempts observed for one repository name.
    pub fn attempts(&self, name: &str) -> u32 {
        self.attempts.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Highest number of clones observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GitExecutor for FakeGit {
    async fn clone_repository(&self, job: &CloneJob) -> Result<(), GitError> {
        let name = job.repository.name.clone();

        *self.attempts.lock().unwrap().entry(name.clone()).or_insert(0) += 1;

        let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Succeed);

        self.current.fetch_sub(1, Ordering::SeqCst);

        step.into_result(job)
    }

    async fn repository_size(&self, _path: &Path) -> Result<u64, GitError> {
        Ok(1024)
    }

    async fn validate_installation(&self) -> Result<(), GitError> {
        Ok(())
    }
}

/// A valid repository record for tests.
pub fn repo(name: &str) -> repo_cloner::Repository {
    repo_cloner::Repository {
        id: 1,
        name: name.to_string(),
        clone_url: format!("https://github.com/octocat/{name}.git"),
        owner: "octocat".to_string(),
        is_fork: false,
        size: 2048,
        default_branch: "main".to_string(),
        language: Some("Rust".to_string()),
        description: None,
        updated_at: Utc::now(),
    }
}

/// An absolute scratch directory that lives for the test's duration.
pub fn scratch_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().to_path_buf();
    (dir, path)
}
