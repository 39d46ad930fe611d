//! Observations, targets, mode schedules and solve results.

use nalgebra::DVector;

use crate::control::ControlLaw;
use crate::error::StructureError;
use crate::interpolation::interpolate;

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// A measured system state that triggers a solve.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub time: f64,
    pub state: DVector<f64>,
    /// Most recently applied or estimated input.
    pub input: DVector<f64>,
    /// Execution-status tag (active subsystem / mode).
    pub mode: usize,
}

impl Observation {
    pub const fn new(time: f64, state: DVector<f64>, input: DVector<f64>) -> Self {
        Self {
            time,
            state,
            input,
            mode: 0,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: usize) -> Self {
        self.mode = mode;
        self
    }

    /// Observation with zero input, convenient for tests and demos.
    pub fn from_state(time: f64, state: &[f64], input_dim: usize) -> Self {
        Self::new(time, DVector::from_column_slice(state), DVector::zeros(input_dim))
    }

    /// Rejects non-finite time or state values.
    pub fn validate(&self) -> Result<(), StructureError> {
        if !self.time.is_finite() {
            return Err(StructureError::InvalidTrajectory(format!(
                "observation time {} is not finite",
                self.time
            )));
        }
        if self.state.iter().chain(self.input.iter()).any(|v| !v.is_finite()) {
            return Err(StructureError::InvalidTrajectory(
                "observation contains a non-finite value".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TargetTrajectories
// ---------------------------------------------------------------------------

/// Desired state and input trajectories tracked by the cost.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetTrajectories {
    times: Vec<f64>,
    states: Vec<DVector<f64>>,
    inputs: Vec<DVector<f64>>,
}

impl TargetTrajectories {
    pub fn new(
        times: Vec<f64>,
        states: Vec<DVector<f64>>,
        inputs: Vec<DVector<f64>>,
    ) -> Result<Self, StructureError> {
        if times.is_empty() {
            return Err(StructureError::InvalidTrajectory(
                "target trajectories need at least one sample".into(),
            ));
        }
        if states.len() != times.len() {
            return Err(StructureError::mismatch("target states", times.len(), states.len()));
        }
        if inputs.len() != times.len() {
            return Err(StructureError::mismatch("target inputs", times.len(), inputs.len()));
        }
        if times.windows(2).any(|w| w[1] < w[0]) {
            return Err(StructureError::InvalidTrajectory(
                "target times must be non-decreasing".into(),
            ));
        }
        Ok(Self {
            times,
            states,
            inputs,
        })
    }

    /// A single set point held for all time.
    pub fn constant(time: f64, state: DVector<f64>, input: DVector<f64>) -> Self {
        Self {
            times: vec![time],
            states: vec![state],
            inputs: vec![input],
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[DVector<f64>] {
        &self.states
    }

    pub fn inputs(&self) -> &[DVector<f64>] {
        &self.inputs
    }

    pub fn state_dim(&self) -> usize {
        self.states.first().map_or(0, |v| v.len())
    }

    pub fn input_dim(&self) -> usize {
        self.inputs.first().map_or(0, |v| v.len())
    }

    /// Desired state at `t`. Non-empty by construction.
    pub fn state_at(&self, t: f64) -> DVector<f64> {
        interpolate(&self.times, &self.states, t).unwrap_or_else(|| DVector::zeros(0))
    }

    /// Desired input at `t`. Non-empty by construction.
    pub fn input_at(&self, t: f64) -> DVector<f64> {
        interpolate(&self.times, &self.inputs, t).unwrap_or_else(|| DVector::zeros(0))
    }
}

// ---------------------------------------------------------------------------
// ModeSchedule
// ---------------------------------------------------------------------------

/// Discrete mode sequence of a switched system.
///
/// `mode_sequence[0]` is active before the first event and
/// `mode_sequence[i + 1]` after `event_times[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ModeSchedule {
    event_times: Vec<f64>,
    mode_sequence: Vec<usize>,
}

impl ModeSchedule {
    pub fn new(event_times: Vec<f64>, mode_sequence: Vec<usize>) -> Result<Self, StructureError> {
        if mode_sequence.len() != event_times.len() + 1 {
            return Err(StructureError::mismatch(
                "mode sequence",
                event_times.len() + 1,
                mode_sequence.len(),
            ));
        }
        if event_times.windows(2).any(|w| w[1] < w[0]) {
            return Err(StructureError::InvalidTrajectory(
                "event times must be non-decreasing".into(),
            ));
        }
        Ok(Self {
            event_times,
            mode_sequence,
        })
    }

    /// Single mode, no events.
    pub fn single(mode: usize) -> Self {
        Self {
            event_times: Vec::new(),
            mode_sequence: vec![mode],
        }
    }

    pub fn event_times(&self) -> &[f64] {
        &self.event_times
    }

    pub fn mode_sequence(&self) -> &[usize] {
        &self.mode_sequence
    }

    /// Mode active at time `t`.
    pub fn mode_at(&self, t: f64) -> usize {
        let index = self.event_times.partition_point(|&e| e <= t);
        self.mode_sequence[index]
    }

    /// Event times inside the half-open interval `(start, end]`.
    pub fn events_between(&self, start: f64, end: f64) -> impl Iterator<Item = f64> + '_ {
        self.event_times
            .iter()
            .copied()
            .filter(move |&e| e > start && e <= end)
    }
}

impl Default for ModeSchedule {
    fn default() -> Self {
        Self::single(0)
    }
}

// ---------------------------------------------------------------------------
// CommandData
// ---------------------------------------------------------------------------

/// Inputs that produced a [`PrimalSolution`].
#[derive(Clone, Debug, PartialEq)]
pub struct CommandData {
    pub observation: Observation,
    pub target: TargetTrajectories,
    pub mode_schedule: ModeSchedule,
}

// ---------------------------------------------------------------------------
// PrimalSolution
// ---------------------------------------------------------------------------

/// An optimal trajectory and the control law that realises it.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimalSolution {
    pub time_trajectory: Vec<f64>,
    pub state_trajectory: Vec<DVector<f64>>,
    pub input_trajectory: Vec<DVector<f64>>,
    pub mode_schedule: ModeSchedule,
    pub controller: ControlLaw,
}

impl PrimalSolution {
    /// Check the trajectory invariants: strictly increasing times, aligned
    /// state/input samples, and a controller covering the whole time range.
    pub fn validate(&self) -> Result<(), StructureError> {
        let n = self.time_trajectory.len();
        if n == 0 {
            return Err(StructureError::InvalidTrajectory("empty time trajectory".into()));
        }
        if self.time_trajectory.windows(2).any(|w| w[1] <= w[0]) {
            return Err(StructureError::InvalidTrajectory(
                "time trajectory must be strictly increasing".into(),
            ));
        }
        if self.state_trajectory.len() != n {
            return Err(StructureError::mismatch("state trajectory", n, self.state_trajectory.len()));
        }
        if self.input_trajectory.len() != n {
            return Err(StructureError::mismatch("input trajectory", n, self.input_trajectory.len()));
        }
        let (start, end) = self.controller.time_range().ok_or_else(|| {
            StructureError::InvalidTrajectory("controller has no samples".into())
        })?;
        if start > self.time_trajectory[0] || end < self.time_trajectory[n - 1] {
            return Err(StructureError::InvalidTrajectory(format!(
                "controller range [{start}, {end}] does not cover the trajectory"
            )));
        }
        Ok(())
    }

    pub fn start_time(&self) -> Option<f64> {
        self.time_trajectory.first().copied()
    }

    pub fn final_time(&self) -> Option<f64> {
        self.time_trajectory.last().copied()
    }

    /// Replace a feedback controller by the open-loop input trajectory.
    #[must_use]
    pub fn into_feedforward(self) -> Self {
        let controller = ControlLaw::Feedforward {
            times: self.time_trajectory.clone(),
            inputs: self.input_trajectory.clone(),
        };
        Self { controller, ..self }
    }
}
