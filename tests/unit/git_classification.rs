//! Clone-failure classification from the public API surface.

use repo_cloner::cloner::git::classify_clone_output;
use repo_cloner::cloner::GitError;

#[test]
fn each_known_substring_maps_to_its_variant() {
    let table: Vec<(&str, fn(&GitError) -> bool)> = vec![
        ("fatal: Authentication failed for repo", |e| {
            matches!(e, GitError::AuthenticationFailed)
        }),
        ("remote: Repository not found.", |e| {
            matches!(e, GitError::RepositoryNotFound)
        }),
        ("Permission denied (publickey)", |e| {
            matches!(e, GitError::PermissionDenied)
        }),
        ("ssh: connect to host: Network is unreachable", |e| {
            matches!(e, GitError::NetworkUnreachable)
        }),
        ("Failed to connect: Connection timed out", |e| {
            matches!(e, GitError::ConnectionTimedOut)
        }),
        ("fatal: write error: No space left on device", |e| {
            matches!(e, GitError::DiskFull)
        }),
        ("error: unable to create file x: Filename too long", |e| {
            matches!(e, GitError::PathTooLong)
        }),
    ];

    for (output, check) in table {
        let err = classify_clone_output(output, "exit status: 128");
        assert!(check(&err), "misclassified output: {output:?} -> {err:?}");
    }
}

#[test]
fn classification_is_case_insensitive() {
    let err = classify_clone_output("FATAL: AUTHENTICATION FAILED", "1");
    assert!(matches!(err, GitError::AuthenticationFailed));
}

#[test]
fn unknown_output_falls_back_to_generic_retryable() {
    let err = classify_clone_output("warning: something nobody anticipated", "exit status: 1");
    assert!(matches!(err, GitError::Other { .. }));
    assert!(err.is_retryable());
    assert!(!err.is_permanent());
}

#[test]
fn permanent_retryable_partition_drives_the_worker_loop() {
    // Permanent: attempted exactly once by the pool.
    for err in [
        GitError::AuthenticationFailed,
        GitError::RepositoryNotFound,
        GitError::PermissionDenied,
        GitError::DiskFull,
        GitError::PathTooLong,
    ] {
        assert!(err.is_permanent());
        assert!(!err.is_retryable());
    }

    // Retryable: re-enter the backoff loop.
    for err in [
        GitError::NetworkUnreachable,
        GitError::ConnectionTimedOut,
        GitError::Timeout,
    ] {
        assert!(err.is_retryable());
        assert!(!err.is_permanent());
    }
}

#[test]
fn transient_markers_in_generic_output_stay_retryable() {
    for marker in [
        "connection reset",
        "temporary failure",
        "service unavailable",
        "try again",
    ] {
        let err = classify_clone_output(&format!("fatal: {marker} while fetching"), "1");
        assert!(err.is_retryable(), "{marker} must be retryable");
    }
}
