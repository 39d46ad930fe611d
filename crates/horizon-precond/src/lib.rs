//! Stage-wise row-sum preconditioning for block-structured optimal control
//! problems.
//!
//! The decision vector of an `N`-stage problem is laid out as
//! `[u_0, x_1, u_1, x_2, …, u_{N-1}, x_N]` (the initial state is fixed and
//! not a variable). [`cost_row_abs_sum`] bounds the rows of the cost Hessian
//! over that layout, and [`dynamics_coupling_row_abs_sum`] bounds the rows of
//! `G Gᵀ` for the stacked dynamics constraint matrix `G`, computing the
//! stages concurrently on a [`WorkerPool`].

pub mod error;
pub mod linalg;
pub mod pool;
pub mod precond;
pub mod queue;
pub mod scaling;

pub use error::PoolError;
pub use linalg::SingleThreadedLinalg;
pub use pool::WorkerPool;
pub use precond::{cost_row_abs_sum, dynamics_coupling_row_abs_sum};
pub use queue::StageQueue;
pub use scaling::QpScaling;
