//! The solver seam of the pipeline.

use horizon_core::{
    CommandData, ModeSchedule, MpcSettings, Observation, PrimalSolution, SolveError,
    TargetTrajectories,
};
use horizon_ddp::{DdpSolver, OcpModel, SolverSnapshot};
use tracing::debug;

/// A receding-horizon solver driven by the pipeline.
///
/// The pipeline calls these methods from the control-loop thread only and
/// never re-enters `run_solve` while a solve is in flight.
pub trait MpcSolver {
    /// Solve the optimal control problem starting at `observation`.
    fn run_solve(&mut self, observation: &Observation) -> Result<(), SolveError>;

    /// The primal solution of the last successful solve.
    fn extract_policy(&mut self) -> Result<PrimalSolution, SolveError>;

    /// The data the last solve was computed from.
    fn extract_provenance(&self, observation: &Observation) -> CommandData;

    /// Replace the tracked target from the next solve on.
    fn adopt_target(&mut self, target: TargetTrajectories) -> Result<(), SolveError>;

    /// Target currently tracked by the cost.
    fn target(&self) -> &TargetTrajectories;

    fn adopt_mode_schedule(&mut self, _mode_schedule: ModeSchedule) -> Result<(), SolveError> {
        Ok(())
    }

    /// Drop any warm start and internal state.
    fn reset(&mut self) {}
}

// ---------------------------------------------------------------------------
// DdpMpc
// ---------------------------------------------------------------------------

/// Receding-horizon wrapper around [`DdpSolver`].
///
/// Each solve optimizes over `[t, t + time_horizon]`. Extracting the policy
/// also collects a [`SolverSnapshot`] of the iterate, which moves the
/// solver's per-stage working data into the snapshot.
pub struct DdpMpc<M: OcpModel> {
    solver: DdpSolver<M>,
    snapshot: SolverSnapshot,
    time_horizon: f64,
}

impl<M: OcpModel> DdpMpc<M> {
    pub fn new(solver: DdpSolver<M>, settings: &MpcSettings) -> Self {
        Self {
            solver,
            snapshot: SolverSnapshot::new(),
            time_horizon: settings.time_horizon,
        }
    }

    pub const fn solver(&self) -> &DdpSolver<M> {
        &self.solver
    }

    /// Snapshot of the iterate behind the most recently extracted policy.
    pub const fn snapshot(&self) -> &SolverSnapshot {
        &self.snapshot
    }

    pub const fn time_horizon(&self) -> f64 {
        self.time_horizon
    }
}

impl<M: OcpModel> MpcSolver for DdpMpc<M> {
    fn run_solve(&mut self, observation: &Observation) -> Result<(), SolveError> {
        let final_time = observation.time + self.time_horizon;
        let summary = self
            .solver
            .run(observation.time, &observation.state, final_time)?;
        debug!(
            time = observation.time,
            iterations = summary.iterations,
            cost = summary.total_cost,
            converged = summary.converged,
            solve_time_us = summary.solve_time_us,
            "DDP solve finished"
        );
        Ok(())
    }

    fn extract_policy(&mut self) -> Result<PrimalSolution, SolveError> {
        let solution = self.solver.primal_solution()?;
        self.snapshot.collect(&mut self.solver);
        Ok(solution)
    }

    fn extract_provenance(&self, observation: &Observation) -> CommandData {
        CommandData {
            observation: observation.clone(),
            target: self.solver.target().clone(),
            mode_schedule: self.solver.mode_schedule().clone(),
        }
    }

    fn adopt_target(&mut self, target: TargetTrajectories) -> Result<(), SolveError> {
        Ok(self.solver.set_target(target)?)
    }

    fn target(&self) -> &TargetTrajectories {
        self.solver.target()
    }

    fn adopt_mode_schedule(&mut self, mode_schedule: ModeSchedule) -> Result<(), SolveError> {
        self.solver.set_mode_schedule(mode_schedule);
        Ok(())
    }

    fn reset(&mut self) {
        self.solver.reset();
        self.snapshot = SolverSnapshot::new();
    }
}
