//! Real-time receding-horizon control runtime.
//!
//! - [`solver`]: the [`MpcSolver`] seam and the [`DdpMpc`] adapter
//! - [`hooks`]: first-call hooks and synchronized modules
//! - [`pipeline`]: [`PolicyPipeline`], which runs solves on the caller's
//!   thread and hands policies to a publisher thread
//! - [`node`]: [`MpcNode`], a TCP front end for a pipeline

pub mod error;
pub mod hooks;
pub mod node;
pub mod pipeline;
mod publisher;
pub mod shared;
pub mod solver;
pub mod timer;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::PipelineError;
pub use hooks::{NoHooks, PipelineHooks, SynchronizedModule};
pub use node::MpcNode;
pub use pipeline::PolicyPipeline;
pub use shared::{PipelineHandle, PipelineState, PublishedPolicy};
pub use solver::{DdpMpc, MpcSolver};
pub use timer::SolveTimer;
