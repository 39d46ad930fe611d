use horizon_comm::TransportError;
use horizon_core::SolveError;
use thiserror::Error;

/// Errors raised by the policy pipeline and the MPC node.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The solve failed; the previously published policy is untouched.
    #[error("Solve error: {0}")]
    Solve(#[from] SolveError),

    #[error("Pipeline has been shut down")]
    Shutdown,

    #[error("Failed to spawn publisher thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Publisher thread is already running")]
    AlreadyLaunched,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
