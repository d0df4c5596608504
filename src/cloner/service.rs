//! Pure domain predicates for clone jobs.
//!
//! Everything here is side-effect free except the destination writability
//! probe, which touches and deletes a sentinel file.

use std::path::Path;
use std::time::Duration;

use super::job::{CloneJob, JobStatus};
use crate::Repository;

/// Characters rejected anywhere in a destination path.
const INVALID_PATH_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

/// Longest destination path accepted (Windows MAX_PATH).
const MAX_PATH_LEN: usize = 260;

/// Validate a clone job before execution: repository invariants, a
/// non-empty base directory, and sane options.
pub fn validate_clone_job(job: &CloneJob) -> Result<(), String> {
    job.repository
        .validate()
        .map_err(|e| format!("invalid repository: {e}"))?;

    if job.base_directory.as_os_str().is_empty() {
        return Err("base directory cannot be empty".to_string());
    }

    if !job.base_directory.is_absolute() {
        return Err(format!(
            "base directory must be absolute: {}",
            job.base_directory.display()
        ));
    }

    job.options
        .validate()
        .map_err(|e| format!("invalid clone options: {e}"))?;

    if let Some(branch) = &job.options.branch {
        validate_branch_name(branch).map_err(|e| format!("invalid branch name: {e}"))?;
    }

    let dest = job.destination_path();
    validate_path_shape(&dest)?;

    Ok(())
}

/// Structural checks on a destination path: absolute, bounded length, no
/// reserved or control characters.
pub fn validate_path_shape(path: &Path) -> Result<(), String> {
    let text = path.to_string_lossy();

    if text.is_empty() {
        return Err("destination path cannot be empty".to_string());
    }

    if !path.is_absolute() {
        return Err(format!("destination path must be absolute: {text}"));
    }

    if text.len() > MAX_PATH_LEN {
        return Err(format!(
            "destination path too long (max {MAX_PATH_LEN} characters): {text}"
        ));
    }

    // The leading-separator colon on Windows drive letters is not a concern
    // here; reserved characters are rejected wholesale.
    for ch in text.chars() {
        if INVALID_PATH_CHARS.contains(&ch) {
            return Err(format!("path contains invalid character '{ch}': {text}"));
        }
        if ch.is_control() {
            return Err(format!("path contains control character: {text}"));
        }
    }

    Ok(())
}

/// Validate a destination directory for cloning: structural checks, parent
/// creation, and a writability probe.
pub fn validate_destination(path: &Path) -> Result<(), String> {
    validate_path_shape(path)?;

    let parent = path.parent().unwrap_or(path);
    match std::fs::metadata(parent) {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(format!(
                    "parent path is not a directory: {}",
                    parent.display()
                ));
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create parent directory: {e}"))?;
        }
        Err(e) => {
            return Err(format!("cannot access parent directory: {e}"));
        }
    }

    // Probe writability with a touch-delete sentinel.
    let sentinel = parent.join(".repo_cloner_write_test");
    std::fs::File::create(&sentinel)
        .map_err(|e| format!("destination is not writable: {e}"))?;
    let _ = std::fs::remove_file(&sentinel);

    Ok(())
}

/// Validate a git branch name against the ref-name rules git enforces.
pub fn validate_branch_name(branch: &str) -> Result<(), String> {
    if branch.is_empty() {
        return Err("branch name cannot be empty".to_string());
    }

    if branch.starts_with('.')
        || branch.starts_with('/')
        || branch.starts_with(' ')
        || branch.ends_with('/')
        || branch.ends_with('.')
        || branch.ends_with(' ')
        || branch.ends_with('\\')
    {
        return Err(format!("branch name violates git naming rules: {branch}"));
    }

    if branch.contains("..") || branch.contains("@{") || branch.contains("//") {
        return Err(format!("branch name violates git naming rules: {branch}"));
    }

    for ch in branch.chars() {
        if ch.is_control() {
            return Err(format!("branch name contains control character: {branch}"));
        }
        if matches!(ch, '~' | '^' | ':' | '?' | '*' | '[' | '\\' | ' ') {
            return Err(format!(
                "branch name contains invalid character '{ch}': {branch}"
            ));
        }
    }

    Ok(())
}

/// Whether a job may be handed to the pool right now.
///
/// Rejects running and completed jobs, and failed jobs whose retry budget
/// is spent; anything else must still pass full validation.
pub fn is_job_executable(job: &CloneJob) -> Result<(), String> {
    match job.status {
        JobStatus::Running => return Err("job is already running".to_string()),
        JobStatus::Completed => return Err("job already completed".to_string()),
        JobStatus::Failed if !job.can_retry() => {
            return Err("job failed and cannot be retried".to_string())
        }
        _ => {}
    }

    validate_clone_job(job)
}

/// Scheduling priority: larger for small repositories, non-forks, and jobs
/// with few retries. Used to split jobs into the high-priority class.
pub fn job_priority(job: &CloneJob) -> i32 {
    let mut priority = 0;

    if job.repository.size < 1024 * 1024 {
        priority += 10;
    } else if job.repository.size < 10 * 1024 * 1024 {
        priority += 5;
    }

    if !job.repository.is_fork {
        priority += 3;
    }

    priority -= job.retry_count as i32 * 2;

    priority
}

/// Rough clone duration estimate: 5 seconds base plus 1 second per MB.
pub fn estimate_clone_duration(repo: &Repository) -> Duration {
    let size_secs = (repo.size / (1024 * 1024)).max(0) as u64;
    Duration::from_secs(5 + size_secs)
}
