//! Discrete-time Gauss-Newton DDP (iLQR) solver.
//!
//! The solver keeps its per-iteration working data partition-major: the
//! horizon is split into `num_partitions` equal time partitions and every
//! trajectory buffer holds one inner sequence per partition. A
//! [`SolverSnapshot`] moves that working data out for inspection without
//! copying it.

pub mod controller;
pub mod model;
pub mod snapshot;
pub mod solver;

pub use controller::LinearController;
pub use model::{LinearQuadraticModel, OcpModel};
pub use snapshot::SolverSnapshot;
pub use solver::{DdpSolver, DdpSummary, ValueFunctionSample};
