//! Bounded worker pool executing clone jobs.
//!
//! A fixed set of long-lived workers is spawned at construction and draws
//! jobs from a shared bounded queue. Each worker runs one job end-to-end:
//! the retry loop with exponential backoff, progress-tracker transitions,
//! and result emission. A single cancellation signal interrupts queue
//! waits, backoff sleeps, and in-flight git subprocesses.

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config;
use super::git::GitExecutor;
use super::job::{CloneJob, JobResult};
use super::progress::ProgressTracker;
use super::service;
use super::GitError;
use crate::cancel::CancelToken;

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool has been closed and accepts no further jobs
    #[error("worker pool is closed")]
    Closed,

    /// A priority queue rejected the job because it is full
    #[error("job queue is full")]
    QueueFull,
}

/// Construction parameters for [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of workers; defaults to twice the CPU core count
    pub max_workers: usize,
    /// Retry budget per job
    pub max_retries: u32,
    /// Base delay before the first retry; doubles per attempt
    pub retry_base_delay: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: config::default_max_workers(),
            max_retries: config::MAX_RETRIES,
            retry_base_delay: config::BASE_RETRY_DELAY,
        }
    }
}

/// State shared between the pool handle and its workers.
struct WorkerShared {
    queue: Mutex<mpsc::Receiver<CloneJob>>,
    results_tx: mpsc::Sender<JobResult>,
    git: Arc<dyn GitExecutor>,
    tracker: StdMutex<Option<Arc<ProgressTracker>>>,
    pending: AtomicUsize,
    drained: Notify,
    cancel: CancelToken,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl WorkerShared {
    fn tracker(&self) -> Option<Arc<ProgressTracker>> {
        self.tracker.lock().expect("tracker mutex poisoned").clone()
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Bounded parallel executor for clone jobs.
pub struct WorkerPool {
    shared: Arc<WorkerShared>,
    job_tx: mpsc::Sender<CloneJob>,
    results_rx: StdMutex<Option<mpsc::Receiver<JobResult>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    max_workers: usize,
}

impl WorkerPool {
    /// Create a pool and pre-spawn its workers.
    pub fn new(config: WorkerPoolConfig, git: Arc<dyn GitExecutor>) -> Self {
        let max_workers = config.max_workers.max(1);
        let (job_tx, job_rx) = mpsc::channel::<CloneJob>(max_workers * 2);
        let (results_tx, results_rx) = mpsc::channel::<JobResult>(max_workers * 2);

        let shared = Arc::new(WorkerShared {
            queue: Mutex::new(job_rx),
            results_tx,
            git,
            tracker: StdMutex::new(None),
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
            cancel: CancelToken::new(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        });

        let workers = (0..max_workers)
            .map(|worker_id| {
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(worker_id, shared))
            })
            .collect();

        info!(
            max_workers,
            max_retries = config.max_retries,
            "worker pool created"
        );

        Self {
            shared,
            job_tx,
            results_rx: StdMutex::new(Some(results_rx)),
            workers: StdMutex::new(workers),
            max_workers,
        }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.max_workers
    }

    /// Attach a progress tracker observed by all workers.
    pub fn set_tracker(&self, tracker: Arc<ProgressTracker>) {
        *self.shared.tracker.lock().expect("tracker mutex poisoned") = Some(tracker);
    }

    /// Detach the progress tracker.
    pub fn clear_tracker(&self) {
        *self.shared.tracker.lock().expect("tracker mutex poisoned") = None;
    }

    /// Submit one job. Returns immediately while a queue slot is free,
    /// otherwise applies backpressure until one opens. Cancellation
    /// interrupts a blocked submit: workers stop pulling once cancelled,
    /// so a full queue would never drain.
    pub async fn submit(&self, job: CloneJob) -> Result<(), PoolError> {
        if self.shared.cancel.is_cancelled() {
            return Err(PoolError::Closed);
        }

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        let sent = tokio::select! {
            sent = self.job_tx.send(job) => sent.is_ok(),
            _ = self.shared.cancel.cancelled() => false,
        };
        if !sent {
            self.shared.finish_one();
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Submit a batch of jobs in order.
    pub async fn submit_all(&self, jobs: Vec<CloneJob>) -> Result<(), PoolError> {
        for job in jobs {
            self.submit(job).await?;
        }
        Ok(())
    }

    /// Take the receive side of the results channel.
    ///
    /// Results arrive in completion order, not submission order. The
    /// receiver can be taken exactly once; the stream ends when the pool
    /// is closed and its workers exit.
    pub fn take_results(&self) -> Option<mpsc::Receiver<JobResult>> {
        self.results_rx
            .lock()
            .expect("results mutex poisoned")
            .take()
    }

    /// Block until every submitted job has emitted its result.
    ///
    /// Returns early if the pool is cancelled: queued jobs that never
    /// started produce no results after cancellation.
    pub async fn wait(&self) {
        loop {
            let mut drained = pin!(self.shared.drained.notified());
            drained.as_mut().enable();

            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }

            if self.shared.cancel.is_cancelled() {
                self.join_workers().await;
                return;
            }

            tokio::select! {
                _ = &mut drained => {}
                _ = self.shared.cancel.cancelled() => {}
            }
        }
    }

    /// Initiate cancellation and wait up to the grace period for in-flight
    /// jobs to drain, then release workers forcibly.
    pub async fn close(&self) {
        info!("shutting down worker pool");
        self.shared.cancel.cancel();

        if tokio::time::timeout(config::SHUTDOWN_GRACE, self.join_workers())
            .await
            .is_err()
        {
            warn!("timeout waiting for jobs to complete, force closing");
            self.abort_workers();
        }
    }

    /// Immediate teardown without a grace period.
    pub fn force_close(&self) {
        warn!("force closing worker pool");
        self.shared.cancel.cancel();
        self.abort_workers();
    }

    /// The pool's cancellation token, for bridging external signals.
    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    async fn join_workers(&self) {
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().expect("workers mutex poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn abort_workers(&self) {
        let workers = self.workers.lock().expect("workers mutex poisoned");
        for handle in workers.iter() {
            handle.abort();
        }
    }
}

/// A worker's run loop: pull, execute, repeat until cancelled or the queue
/// closes.
async fn worker_loop(worker_id: usize, shared: Arc<WorkerShared>) {
    debug!(worker_id, "worker started");

    loop {
        let job = {
            let mut queue = shared.queue.lock().await;
            // Biased so a cancelled pool never pulls another queued job.
            tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => None,
                job = queue.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        execute_job(&shared, job).await;
    }

    debug!(worker_id, "worker stopped");
}

/// Execute one job end-to-end: retry loop, tracker transitions, result
/// emission.
async fn execute_job(shared: &WorkerShared, mut job: CloneJob) {
    let started = Instant::now();

    // The pool's retry budget governs; keep the job's own gate in step.
    job.max_retries = shared.max_retries;

    job.mark_started();
    if let Some(tracker) = shared.tracker() {
        tracker.start_job();
    }

    info!(
        job_id = job.id,
        repo = %job.repository.full_name(),
        destination = %job.destination_path().display(),
        "starting clone job"
    );

    let mut last_error: Option<GitError> = None;

    for attempt in 0..=shared.max_retries {
        if shared.cancel.is_cancelled() {
            finish_cancelled(shared, job);
            return;
        }

        match shared.git.clone_repository(&job).await {
            Ok(()) => {
                finish_success(shared, job, started).await;
                return;
            }
            Err(GitError::RepositoryExists { path }) => {
                let reason = format!("repository already exists at: {}", path.display());
                finish_skipped(shared, job, reason).await;
                return;
            }
            Err(GitError::Cancelled) => {
                finish_cancelled(shared, job);
                return;
            }
            Err(err) if err.is_permanent() => {
                error!(
                    job_id = job.id,
                    repo = %job.repository.full_name(),
                    error = %err,
                    "permanent error, not retrying"
                );
                last_error = Some(err);
                break;
            }
            Err(err) => {
                if attempt < shared.max_retries {
                    warn!(
                        job_id = job.id,
                        repo = %job.repository.full_name(),
                        attempt = attempt + 1,
                        max_attempts = shared.max_retries + 1,
                        error = %err,
                        "clone attempt failed, retrying"
                    );

                    job.mark_failed(err.to_string());
                    job.retry();
                    last_error = Some(err);
                    crate::metrics::record_retry();

                    let delay = config::retry_backoff(shared.retry_base_delay, attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shared.cancel.cancelled() => {
                            finish_cancelled(shared, job);
                            return;
                        }
                    }

                    job.mark_started();
                } else {
                    last_error = Some(err);
                }
            }
        }
    }

    let message = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    finish_failed(shared, job, message).await;
}

async fn finish_success(shared: &WorkerShared, mut job: CloneJob, started: Instant) {
    let duration = started.elapsed();
    job.mark_completed();

    let size = shared
        .git
        .repository_size(&job.destination_path())
        .await
        .unwrap_or(0);

    if let Some(tracker) = shared.tracker() {
        tracker.complete_job_with_details(&job.repository.full_name(), duration, size);
    }

    info!(
        job_id = job.id,
        repo = %job.repository.full_name(),
        duration_ms = duration.as_millis() as u64,
        size_bytes = size,
        retries = job.retry_count,
        "clone job completed"
    );
    crate::metrics::record_job_outcome("completed");
    crate::metrics::record_clone_duration(duration);

    emit_result(shared, JobResult::new(job, true, size)).await;
}

async fn finish_skipped(shared: &WorkerShared, mut job: CloneJob, reason: String) {
    job.mark_skipped(&reason);
    let duration = job.duration();

    if let Some(tracker) = shared.tracker() {
        tracker.skip_job_with_details(&job.repository.full_name(), duration, &reason);
    }

    info!(
        job_id = job.id,
        repo = %job.repository.full_name(),
        reason = %reason,
        "clone job skipped"
    );
    crate::metrics::record_job_outcome("skipped");

    // Skipped counts as success: the repository is on disk.
    emit_result(shared, JobResult::new(job, true, 0)).await;
}

async fn finish_failed(shared: &WorkerShared, mut job: CloneJob, message: String) {
    job.mark_failed(&message);
    let duration = job.duration();

    if let Some(tracker) = shared.tracker() {
        tracker.fail_job_with_details(&job.repository.full_name(), duration, &message);
    }

    error!(
        job_id = job.id,
        repo = %job.repository.full_name(),
        error = %message,
        retries = job.retry_count,
        "clone job failed permanently"
    );
    crate::metrics::record_job_outcome("failed");

    emit_result(shared, JobResult::new(job, false, 0)).await;
}

fn finish_cancelled(shared: &WorkerShared, mut job: CloneJob) {
    job.mark_failed("job cancelled");
    let duration = job.duration();

    if let Some(tracker) = shared.tracker() {
        tracker.fail_job_with_details(&job.repository.full_name(), duration, "job cancelled");
    }

    info!(
        job_id = job.id,
        repo = %job.repository.full_name(),
        "clone job cancelled"
    );
    crate::metrics::record_job_outcome("failed");

    let result = JobResult::new(job, false, 0);
    let _ = shared.results_tx.try_send(result);
    shared.finish_one();
}

async fn emit_result(shared: &WorkerShared, result: JobResult) {
    let _ = shared.results_tx.send(result).await;
    shared.finish_one();
}

/// Jobs at or above this priority go to the high class.
const HIGH_PRIORITY_THRESHOLD: i32 = 10;

/// Multiplexes two priority classes into pool submissions, preferring the
/// high-priority queue whenever a worker frees up.
pub struct JobManager {
    high_tx: mpsc::Sender<CloneJob>,
    normal_tx: mpsc::Sender<CloneJob>,
    cancel: CancelToken,
    scheduler: StdMutex<Option<JoinHandle<()>>>,
}

impl JobManager {
    /// Create a manager feeding `pool` and start its scheduler task.
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        let (high_tx, mut high_rx) = mpsc::channel::<CloneJob>(100);
        let (normal_tx, mut normal_rx) = mpsc::channel::<CloneJob>(1000);
        let cancel = CancelToken::new();

        let scheduler = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        job = high_rx.recv() => {
                            let Some(job) = job else { break };
                            if let Err(e) = pool.submit(job).await {
                                error!(error = %e, "failed to submit high priority job");
                            }
                        }
                        job = normal_rx.recv() => {
                            let Some(job) = job else { break };
                            // A high-priority job that raced in goes first.
                            if let Ok(high_job) = high_rx.try_recv() {
                                if let Err(e) = pool.submit(high_job).await {
                                    error!(error = %e, "failed to submit high priority job");
                                }
                            }
                            if let Err(e) = pool.submit(job).await {
                                error!(error = %e, "failed to submit job");
                            }
                        }
                    }
                }
            })
        };

        Self {
            high_tx,
            normal_tx,
            cancel,
            scheduler: StdMutex::new(Some(scheduler)),
        }
    }

    /// Route a job by its computed priority: small, non-fork, low-retry
    /// jobs jump the queue.
    pub fn dispatch(&self, job: CloneJob) -> Result<(), PoolError> {
        if service::job_priority(&job) >= HIGH_PRIORITY_THRESHOLD {
            self.submit_high_priority(job)
        } else {
            self.submit(job)
        }
    }

    /// Enqueue a job in the high-priority class.
    pub fn submit_high_priority(&self, job: CloneJob) -> Result<(), PoolError> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::Closed);
        }
        self.high_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed,
        })
    }

    /// Enqueue a job in the normal class.
    pub fn submit(&self, job: CloneJob) -> Result<(), PoolError> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::Closed);
        }
        self.normal_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed,
        })
    }

    /// Stop the scheduler.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self
            .scheduler
            .lock()
            .expect("scheduler mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
