//! Shared test fixtures and utilities for horizon crates.
//!
//! Provides seeded RNGs, random stage-structured problems, and mock solvers,
//! publishers and hooks for pipeline tests.

pub mod fixtures;
pub mod mocks;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{RandomProblem, random_problem};
pub use mocks::{CountingHooks, EventLog, RecordingPublisher, ScriptedSolver};
pub use rng::{random_vector, seeded_rng};
