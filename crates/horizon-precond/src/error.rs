use thiserror::Error;

/// Worker pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Invalid worker count: {0} (at least 1 worker is required)")]
    InvalidThreadCount(usize),

    #[error("Failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}
