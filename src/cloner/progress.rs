//! Progress tracking for clone batches.
//!
//! A single mutex guards the counters; every snapshot is an independent
//! value copy with throughput and ETA computed at read time. Counters are
//! monotone: a terminal counter never decreases, and observers never see a
//! half-applied transition.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::job::JobStatus;

/// Subscription buffer size; slow consumers lag past this and miss
/// intermediate snapshots without ever blocking producers.
const SUBSCRIPTION_BUFFER: usize = 16;

/// Display cap for the recent-completion error excerpt.
const ERROR_EXCERPT_LEN: usize = 60;

/// The most recently finished repository, for UI display.
#[derive(Debug, Clone)]
pub struct RecentCompletion {
    /// Repository full name
    pub repository: String,
    /// Terminal status the job reached
    pub status: JobStatus,
    /// When it finished
    pub completed_at: DateTime<Utc>,
    /// Measured duration
    pub duration: Duration,
    /// Bytes on disk, when measured
    pub size: u64,
    /// Error text, if the job failed or was skipped
    pub error: Option<String>,
}

impl RecentCompletion {
    /// Error text truncated for single-line display.
    pub fn short_error(&self) -> Option<String> {
        self.error.as_ref().map(|e| {
            if e.chars().count() > ERROR_EXCERPT_LEN {
                let excerpt: String = e.chars().take(ERROR_EXCERPT_LEN).collect();
                format!("{excerpt}…")
            } else {
                e.clone()
            }
        })
    }
}

/// Immutable, self-consistent snapshot of a batch's progress.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Jobs in the batch
    pub total: usize,
    /// Jobs completed successfully
    pub completed: usize,
    /// Jobs that failed permanently
    pub failed: usize,
    /// Jobs skipped because the destination already existed
    pub skipped: usize,
    /// Jobs currently executing
    pub in_progress: usize,
    /// When the batch started
    pub start_time: DateTime<Utc>,
    /// Wall-clock time since the batch started
    pub elapsed: Duration,
    /// Estimated time remaining
    pub eta: Duration,
    /// Terminal transitions per second
    pub throughput: f64,
    /// Most recent terminal transition, if any
    pub recent_completion: Option<RecentCompletion>,
    /// When this snapshot's source state last changed
    pub last_update: DateTime<Utc>,
}

impl Progress {
    /// Terminal transitions so far.
    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// Completion percentage in [0, 100].
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let pct = self.processed() as f64 / self.total as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }

    /// Share of processed jobs that completed successfully.
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            return 0.0;
        }
        self.completed as f64 / processed as f64 * 100.0
    }

    /// Whether every job has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.processed() >= self.total && self.in_progress == 0
    }
}

#[derive(Debug)]
struct TrackerState {
    total: usize,
    completed: usize,
    failed: usize,
    skipped: usize,
    in_progress: usize,
    started: Instant,
    start_time: DateTime<Utc>,
    last_update: DateTime<Utc>,
    recent: Option<RecentCompletion>,
    closed: bool,
}

/// Thread-safe progress tracker shared by all workers of a batch.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    updates: broadcast::Sender<Progress>,
}

impl ProgressTracker {
    /// Create a tracker sized to `total` jobs.
    pub fn new(total: usize) -> Self {
        let (updates, _) = broadcast::channel(SUBSCRIPTION_BUFFER);
        let now = Utc::now();
        Self {
            state: Mutex::new(TrackerState {
                total,
                completed: 0,
                failed: 0,
                skipped: 0,
                in_progress: 0,
                started: Instant::now(),
                start_time: now,
                last_update: now,
                recent: None,
                closed: false,
            }),
            updates,
        }
    }

    /// Record a job entering execution.
    pub fn start_job(&self) {
        let mut state = self.lock();
        state.in_progress += 1;
        state.last_update = Utc::now();
        self.notify(&state);
    }

    /// Record a successful completion.
    pub fn complete_job(&self) {
        let mut state = self.lock();
        state.in_progress = state.in_progress.saturating_sub(1);
        state.completed += 1;
        state.last_update = Utc::now();
        self.notify(&state);
    }

    /// Record a successful completion with display details.
    pub fn complete_job_with_details(&self, repository: &str, duration: Duration, size: u64) {
        let mut state = self.lock();
        state.in_progress = state.in_progress.saturating_sub(1);
        state.completed += 1;
        state.last_update = Utc::now();
        state.recent = Some(RecentCompletion {
            repository: repository.to_string(),
            status: JobStatus::Completed,
            completed_at: Utc::now(),
            duration,
            size,
            error: None,
        });
        self.notify(&state);
    }

    /// Record a permanent failure.
    pub fn fail_job(&self) {
        let mut state = self.lock();
        state.in_progress = state.in_progress.saturating_sub(1);
        state.failed += 1;
        state.last_update = Utc::now();
        self.notify(&state);
    }

    /// Record a permanent failure with display details.
    pub fn fail_job_with_details(&self, repository: &str, duration: Duration, error: &str) {
        let mut state = self.lock();
        state.in_progress = state.in_progress.saturating_sub(1);
        state.failed += 1;
        state.last_update = Utc::now();
        state.recent = Some(RecentCompletion {
            repository: repository.to_string(),
            status: JobStatus::Failed,
            completed_at: Utc::now(),
            duration,
            size: 0,
            error: Some(error.to_string()),
        });
        self.notify(&state);
    }

    /// Record a skip.
    pub fn skip_job(&self) {
        let mut state = self.lock();
        state.in_progress = state.in_progress.saturating_sub(1);
        state.skipped += 1;
        state.last_update = Utc::now();
        self.notify(&state);
    }

    /// Record a skip with display details.
    pub fn skip_job_with_details(&self, repository: &str, duration: Duration, reason: &str) {
        let mut state = self.lock();
        state.in_progress = state.in_progress.saturating_sub(1);
        state.skipped += 1;
        state.last_update = Utc::now();
        state.recent = Some(RecentCompletion {
            repository: repository.to_string(),
            status: JobStatus::Skipped,
            completed_at: Utc::now(),
            duration,
            size: 0,
            error: Some(format!("skipped: {reason}")),
        });
        self.notify(&state);
    }

    /// Independent snapshot with freshly derived throughput and ETA.
    pub fn progress(&self) -> Progress {
        let state = self.lock();
        snapshot(&state)
    }

    /// Subscribe to snapshot updates. One snapshot is pushed per
    /// transition; consumers that fall behind skip intermediate snapshots
    /// but always observe the terminal one.
    pub fn subscribe(&self) -> broadcast::Receiver<Progress> {
        self.updates.subscribe()
    }

    /// Defect recovery: if the counters claim unfinished work after the
    /// pool has drained, move leaked in-progress entries into completed.
    /// A no-op when accounting is clean.
    pub fn force_synchronize(&self) {
        let mut state = self.lock();

        let processed = state.completed + state.failed + state.skipped;
        if processed < state.total && state.in_progress > 0 {
            let remaining = state.total - processed;
            let moved = remaining.min(state.in_progress);
            state.completed += moved;
            state.in_progress -= moved;
        }

        state.last_update = Utc::now();
        self.notify(&state);
    }

    /// Emit a final snapshot and stop publishing.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        self.notify(&state);
        state.closed = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().expect("progress tracker mutex poisoned")
    }

    fn notify(&self, state: &TrackerState) {
        if state.closed {
            return;
        }
        // Send errors just mean nobody is subscribed.
        let _ = self.updates.send(snapshot(state));
    }
}

/// Build a consistent snapshot from raw state.
fn snapshot(state: &TrackerState) -> Progress {
    let mut total = state.total;
    let mut in_progress = state.in_progress;
    let processed = state.completed + state.failed + state.skipped;

    // Observers must see monotone, accountable numbers even if a bug
    // overcounts: clamp rather than expose an impossible state.
    if processed > total {
        in_progress = 0;
        total = processed;
    } else if processed + in_progress > total {
        in_progress = total - processed;
    }

    let elapsed = state.started.elapsed();
    let elapsed_secs = elapsed.as_secs_f64();

    let throughput = if processed > 0 && elapsed_secs > 0.0 {
        processed as f64 / elapsed_secs
    } else {
        0.0
    };

    let eta = if throughput > 0.0 && processed + in_progress < total {
        let remaining = (total - processed - in_progress) as f64;
        Duration::from_secs_f64(remaining / throughput)
    } else {
        Duration::ZERO
    };

    Progress {
        total,
        completed: state.completed,
        failed: state.failed,
        skipped: state.skipped,
        in_progress,
        start_time: state.start_time,
        elapsed,
        eta,
        throughput,
        recent_completion: state.recent.clone(),
        last_update: state.last_update,
    }
}
