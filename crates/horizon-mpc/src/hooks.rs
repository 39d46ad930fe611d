//! Extension points called by the pipeline around each solve.

use horizon_core::{ModeSchedule, Observation, PrimalSolution, TargetTrajectories};
use nalgebra::DVector;

/// First-call behaviour of a pipeline.
///
/// Both methods run exactly once on the first observation after launch or
/// after a reset, before that observation's solve.
pub trait PipelineHooks: Send {
    fn init_call(&mut self, _observation: &Observation) {}

    /// Mode schedule to adopt before the first solve, if any.
    fn initial_mode_schedule(&mut self, _observation: &Observation) -> Option<ModeSchedule> {
        None
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl PipelineHooks for NoHooks {}

/// A component kept in lock-step with the solver, such as a reference
/// generator or a gait planner.
pub trait SynchronizedModule: Send {
    fn pre_solve(&mut self, time: f64, state: &DVector<f64>, target: &TargetTrajectories);

    fn post_solve(&mut self, solution: &PrimalSolution);
}
