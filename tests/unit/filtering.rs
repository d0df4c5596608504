//! Filter soundness over a matrix of repository shapes.

use chrono::{Duration as ChronoDuration, Utc};
use repo_cloner::{PaginationOptions, Repository, RepositoryFilter};

fn build_repo(name: &str, fork: bool, size: i64, language: Option<&str>, https: bool) -> Repository {
    Repository {
        id: 1,
        name: name.to_string(),
        clone_url: if https {
            format!("https://github.com/acme/{name}.git")
        } else {
            format!("ssh://git@github.com/acme/{name}.git")
        },
        owner: "acme".to_string(),
        is_fork: fork,
        size,
        default_branch: "main".to_string(),
        language: language.map(String::from),
        description: None,
        updated_at: Utc::now(),
    }
}

/// Every record accepted by the filter must satisfy every predicate.
#[test]
fn accepted_records_satisfy_every_predicate() {
    let filter = RepositoryFilter {
        include_forks: false,
        min_size: 100,
        max_size: 10_000,
        languages: vec!["Rust".to_string(), "Go".to_string()],
        updated_after: Some(Utc::now() - ChronoDuration::days(365)),
        only_public: true,
    };

    let candidates = vec![
        build_repo("ok-rust", false, 500, Some("Rust"), true),
        build_repo("ok-go", false, 9_999, Some("Go"), true),
        build_repo("a-fork", true, 500, Some("Rust"), true),
        build_repo("too-small", false, 50, Some("Rust"), true),
        build_repo("too-big", false, 50_000, Some("Rust"), true),
        build_repo("wrong-lang", false, 500, Some("Python"), true),
        build_repo("no-lang", false, 500, None, true),
        build_repo("private-ish", false, 500, Some("Rust"), false),
    ];

    let accepted: Vec<_> = candidates
        .iter()
        .filter(|r| filter.should_include(r))
        .collect();

    assert_eq!(accepted.len(), 2);
    for repo in accepted {
        assert!(!repo.is_fork);
        assert!(repo.size >= filter.min_size);
        assert!(repo.size <= filter.max_size);
        assert!(filter
            .languages
            .iter()
            .any(|l| Some(l.as_str()) == repo.language.as_deref()));
        assert!(repo.is_public());
    }
}

#[test]
fn default_filter_only_drops_forks_and_non_https() {
    let filter = RepositoryFilter::default();

    assert!(filter.should_include(&build_repo("plain", false, 0, None, true)));
    assert!(!filter.should_include(&build_repo("fork", true, 0, None, true)));
    assert!(!filter.should_include(&build_repo("ssh-only", false, 0, None, false)));
}

#[test]
fn unbounded_max_size_accepts_everything_above_min() {
    let filter = RepositoryFilter {
        min_size: 10,
        max_size: -1,
        ..Default::default()
    };

    assert!(!filter.should_include(&build_repo("tiny", false, 5, None, true)));
    assert!(filter.should_include(&build_repo("huge", false, i64::MAX, None, true)));
}

#[test]
fn pagination_clamps_to_api_window() {
    let p = PaginationOptions {
        page: 0,
        per_page: 1000,
    }
    .normalized();
    assert_eq!(p.page, 1);
    assert_eq!(p.per_page, 100);

    let p = PaginationOptions {
        page: 7,
        per_page: 25,
    }
    .normalized();
    assert_eq!(p.page, 7);
    assert_eq!(p.per_page, 25);
    assert_eq!(p.offset(), 150);
}
