//! Clone-batch use case: jobs in, aggregated results and a final progress
//! snapshot out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{EngineError, EngineResult};
use crate::cloner::progress::Progress;
use crate::cloner::{service, CloneJob, CloneOptions, JobResult, ProgressTracker, WorkerPool};
use crate::Repository;

/// Input for cloning a batch of repositories.
#[derive(Debug, Clone)]
pub struct CloneBatchRequest {
    /// Records to clone
    pub repositories: Vec<Repository>,
    /// Absolute directory under which clones land
    pub base_directory: PathBuf,
    /// Clone options shared by every job
    pub options: CloneOptions,
    /// Requested worker count. The pool is sized by its owner; a mismatch
    /// is reported, not silently honored.
    pub concurrency: Option<usize>,
}

/// Output of a clone batch.
#[derive(Debug)]
pub struct CloneBatchResponse {
    /// Jobs submitted after executability filtering
    pub total_jobs: usize,
    /// Jobs completed successfully
    pub completed: usize,
    /// Jobs failed permanently
    pub failed: usize,
    /// Jobs skipped because the destination already existed
    pub skipped: usize,
    /// Wall-clock duration of the whole batch
    pub duration: Duration,
    /// Per-job results in completion order
    pub results: Vec<JobResult>,
    /// Final progress snapshot
    pub progress: Progress,
}

/// Callback invoked with every progress snapshot during a batch.
pub type ProgressObserver = Box<dyn Fn(Progress) + Send + Sync>;

/// Orchestrates a clone batch over a borrowed worker pool.
///
/// The use case owns the jobs and the progress tracker for the duration of
/// the batch; the pool borrows the tracker and is detached before the
/// response is returned.
pub struct CloneBatchUseCase {
    pool: Arc<WorkerPool>,
}

impl CloneBatchUseCase {
    /// Create the use case around an existing pool.
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// Execute the batch. `observer`, when given, receives every progress
    /// snapshot for live display.
    pub async fn execute(
        &self,
        request: CloneBatchRequest,
        observer: Option<ProgressObserver>,
    ) -> EngineResult<CloneBatchResponse> {
        Self::validate_request(&request)?;

        let started = Instant::now();

        let CloneBatchRequest {
            repositories,
            base_directory,
            options,
            concurrency,
        } = request;

        if let Some(requested) = concurrency {
            if requested != self.pool.worker_count() {
                warn!(
                    requested,
                    pool_workers = self.pool.worker_count(),
                    "requested concurrency differs from pool size"
                );
            }
        }

        info!(
            repository_count = repositories.len(),
            base_directory = %base_directory.display(),
            "starting concurrent repository cloning"
        );

        let jobs: Vec<CloneJob> = repositories
            .into_iter()
            .map(|repo| CloneJob::new(repo, &base_directory, options.clone()))
            .collect();

        let valid_jobs: Vec<CloneJob> = jobs
            .into_iter()
            .filter(|job| match service::is_job_executable(job) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        job_id = job.id,
                        repo = %job.repository.full_name(),
                        error = %e,
                        "job filtered out"
                    );
                    false
                }
            })
            .collect();

        let total_jobs = valid_jobs.len();
        info!(valid_jobs = total_jobs, "jobs created and filtered");

        let tracker = Arc::new(ProgressTracker::new(total_jobs));
        self.pool.set_tracker(Arc::clone(&tracker));

        // Forward snapshots to the observer for the lifetime of the batch.
        let forwarder = observer.map(|observer| {
            let mut updates = tracker.subscribe();
            tokio::spawn(async move {
                loop {
                    match updates.recv().await {
                        Ok(snapshot) => observer(snapshot),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        });

        let mut results_rx = self
            .pool
            .take_results()
            .ok_or_else(|| EngineError::Resource("results channel already taken".to_string()))?;

        if let Err(e) = self.pool.submit_all(valid_jobs).await {
            self.pool.clear_tracker();
            return Err(EngineError::Resource(format!("failed to submit jobs: {e}")));
        }

        // Drain until the expected count. On cancellation, jobs still queued
        // never emit a result, so fall back to collecting whatever the
        // workers produced before they stopped.
        let cancel = self.pool.cancel_token();
        let mut results = Vec::with_capacity(total_jobs);
        let mut cancelled = false;
        while results.len() < total_jobs {
            let next = if cancelled {
                results_rx.try_recv().ok()
            } else {
                tokio::select! {
                    next = results_rx.recv() => next,
                    _ = cancel.cancelled() => {
                        warn!(
                            collected = results.len(),
                            expected = total_jobs,
                            "batch cancelled, draining in-flight results"
                        );
                        self.pool.wait().await;
                        cancelled = true;
                        continue;
                    }
                }
            };

            match next {
                Some(result) => {
                    debug!(
                        job_id = result.job.id,
                        repo = %result.job.repository.full_name(),
                        status = %result.job.status,
                        "job result collected"
                    );
                    results.push(result);
                }
                None => {
                    warn!(
                        collected = results.len(),
                        expected = total_jobs,
                        "results channel closed before all jobs finished"
                    );
                    break;
                }
            }
        }

        self.pool.wait().await;

        // Defect recovery: the pool has returned, so any in-progress
        // remainder in the tracker is leaked accounting, not real work.
        let mut final_progress = tracker.progress();
        if !final_progress.is_complete() {
            warn!(
                completed = final_progress.completed,
                failed = final_progress.failed,
                skipped = final_progress.skipped,
                in_progress = final_progress.in_progress,
                total = final_progress.total,
                "pool drained but progress incomplete, forcing synchronization"
            );

            tracker.force_synchronize();
            final_progress = tracker.progress();

            while final_progress.in_progress > 0 {
                tracker.complete_job();
                final_progress = tracker.progress();
            }
        }

        tracker.close();
        self.pool.clear_tracker();
        // The forwarder exits when the tracker's sender is dropped; release
        // our reference before joining it.
        drop(tracker);
        if let Some(handle) = forwarder {
            let _ = handle.await;
        }

        let duration = started.elapsed();

        info!(
            total_jobs,
            completed = final_progress.completed,
            failed = final_progress.failed,
            skipped = final_progress.skipped,
            duration_ms = duration.as_millis() as u64,
            "repository cloning completed"
        );

        Ok(CloneBatchResponse {
            total_jobs,
            completed: final_progress.completed,
            failed: final_progress.failed,
            skipped: final_progress.skipped,
            duration,
            results,
            progress: final_progress,
        })
    }

    /// Rough duration estimate for a set of repositories, divided across
    /// the pool's workers.
    pub fn estimate_duration(&self, repositories: &[Repository]) -> Duration {
        if repositories.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = repositories
            .iter()
            .map(service::estimate_clone_duration)
            .sum();

        total / self.pool.worker_count().max(1) as u32
    }

    fn validate_request(request: &CloneBatchRequest) -> EngineResult<()> {
        if request.repositories.is_empty() {
            return Err(EngineError::InvalidRequest(
                "repositories list cannot be empty".to_string(),
            ));
        }

        for (index, repo) in request.repositories.iter().enumerate() {
            repo.validate().map_err(|e| {
                EngineError::InvalidRequest(format!("invalid repository at index {index}: {e}"))
            })?;
        }

        request
            .options
            .validate()
            .map_err(|e| EngineError::InvalidRequest(format!("invalid clone options: {e}")))?;

        service::validate_destination(&request.base_directory)
            .map_err(|e| EngineError::Resource(format!("invalid base directory: {e}")))?;

        Ok(())
    }
}
