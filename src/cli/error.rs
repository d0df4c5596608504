//! CLI error types and conversions

use crate::cloner::pool::PoolError;
use crate::cloner::GitError;
use crate::engine::EngineError;
use crate::provider::ProviderError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Engine error
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Provider error
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Git error
    #[error("{0}")]
    Git(#[from] GitError),

    /// Worker pool error
    #[error("{0}")]
    Pool(#[from] PoolError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
