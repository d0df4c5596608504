//! The engine boundary: request/response contracts and use cases.
//!
//! [`FetchUseCase`] orchestrates enumeration across providers;
//! [`CloneBatchUseCase`] turns records into jobs, runs them through the
//! worker pool, and finalizes progress.

pub mod clone_batch;
pub mod fetch;

pub use clone_batch::{CloneBatchRequest, CloneBatchResponse, CloneBatchUseCase, ProgressObserver};
pub use fetch::{FetchRequest, FetchResponse, FetchUseCase};

use crate::provider::ProviderError;

/// Engine boundary errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed request rejected before any work started
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No client configured for the requested provider
    #[error("{0} client not configured")]
    ProviderNotConfigured(&'static str),

    /// Enumeration failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A batch-level resource check failed before submission
    #[error("resource error: {0}")]
    Resource(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
