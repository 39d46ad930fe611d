//! Conversions between wire messages and `horizon-core` types.
//!
//! Decoding is checked: every message is validated through the core
//! constructors and a malformed message is reported as a [`StructureError`].

use horizon_core::{
    CommandData, ControlLaw, ModeSchedule, Observation, PrimalSolution, StructureError,
    TargetTrajectories,
};
use nalgebra::{DMatrix, DVector};

use crate::messages::{
    ControllerMessage, ControllerType, ModeScheduleMessage, ObservationMessage, PolicyMessage,
    TargetTrajectoriesMessage,
};

fn to_vec(v: &DVector<f64>) -> Vec<f64> {
    v.as_slice().to_vec()
}

fn to_rows(vs: &[DVector<f64>]) -> Vec<Vec<f64>> {
    vs.iter().map(to_vec).collect()
}

fn from_rows(rows: &[Vec<f64>]) -> Vec<DVector<f64>> {
    rows.iter().map(|r| DVector::from_column_slice(r)).collect()
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

impl From<&Observation> for ObservationMessage {
    fn from(obs: &Observation) -> Self {
        Self {
            time: obs.time,
            state: to_vec(&obs.state),
            input: to_vec(&obs.input),
            mode: obs.mode,
        }
    }
}

impl TryFrom<&ObservationMessage> for Observation {
    type Error = StructureError;

    fn try_from(msg: &ObservationMessage) -> Result<Self, Self::Error> {
        let obs = Self::new(
            msg.time,
            DVector::from_column_slice(&msg.state),
            DVector::from_column_slice(&msg.input),
        )
        .with_mode(msg.mode);
        obs.validate()?;
        Ok(obs)
    }
}

// ---------------------------------------------------------------------------
// Target trajectories
// ---------------------------------------------------------------------------

impl From<&TargetTrajectories> for TargetTrajectoriesMessage {
    fn from(target: &TargetTrajectories) -> Self {
        Self {
            times: target.times().to_vec(),
            states: to_rows(target.states()),
            inputs: to_rows(target.inputs()),
        }
    }
}

impl TryFrom<&TargetTrajectoriesMessage> for TargetTrajectories {
    type Error = StructureError;

    fn try_from(msg: &TargetTrajectoriesMessage) -> Result<Self, Self::Error> {
        Self::new(msg.times.clone(), from_rows(&msg.states), from_rows(&msg.inputs))
    }
}

// ---------------------------------------------------------------------------
// Mode schedule
// ---------------------------------------------------------------------------

impl From<&ModeSchedule> for ModeScheduleMessage {
    fn from(schedule: &ModeSchedule) -> Self {
        Self {
            event_times: schedule.event_times().to_vec(),
            mode_sequence: schedule.mode_sequence().to_vec(),
        }
    }
}

impl TryFrom<&ModeScheduleMessage> for ModeSchedule {
    type Error = StructureError;

    fn try_from(msg: &ModeScheduleMessage) -> Result<Self, Self::Error> {
        Self::new(msg.event_times.clone(), msg.mode_sequence.clone())
    }
}

// ---------------------------------------------------------------------------
// Control law
// ---------------------------------------------------------------------------

impl From<&ControlLaw> for ControllerMessage {
    fn from(law: &ControlLaw) -> Self {
        match law {
            ControlLaw::Feedforward { times, inputs } => Self {
                controller_type: ControllerType::Feedforward,
                state_dim: 0,
                input_dim: inputs.first().map_or(0, |u| u.len()),
                time_array: times.clone(),
                data: to_rows(inputs),
            },
            ControlLaw::Linear {
                times,
                biases,
                gains,
            } => {
                let data = biases
                    .iter()
                    .zip(gains)
                    .map(|(bias, gain)| {
                        let mut row = Vec::with_capacity(bias.len() + gain.len());
                        row.extend_from_slice(bias.as_slice());
                        row.extend_from_slice(gain.as_slice());
                        row
                    })
                    .collect();
                Self {
                    controller_type: ControllerType::Linear,
                    state_dim: gains.first().map_or(0, |k| k.ncols()),
                    input_dim: biases.first().map_or(0, |u| u.len()),
                    time_array: times.clone(),
                    data,
                }
            }
        }
    }
}

impl TryFrom<&ControllerMessage> for ControlLaw {
    type Error = StructureError;

    fn try_from(msg: &ControllerMessage) -> Result<Self, Self::Error> {
        let nu = msg.input_dim;
        let nx = msg.state_dim;
        let row_len = match msg.controller_type {
            ControllerType::Feedforward => nu,
            ControllerType::Linear => nu + nu * nx,
        };
        if let Some(row) = msg.data.iter().find(|row| row.len() != row_len) {
            return Err(StructureError::mismatch("controller data row", row_len, row.len()));
        }
        match msg.controller_type {
            ControllerType::Feedforward => {
                Self::feedforward(msg.time_array.clone(), from_rows(&msg.data))
            }
            ControllerType::Linear => {
                let biases = msg
                    .data
                    .iter()
                    .map(|row| DVector::from_column_slice(&row[..nu]))
                    .collect();
                let gains = msg
                    .data
                    .iter()
                    .map(|row| DMatrix::from_column_slice(nu, nx, &row[nu..]))
                    .collect();
                Self::linear(msg.time_array.clone(), biases, gains)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

impl PolicyMessage {
    pub fn new(
        solution: &PrimalSolution,
        command: &CommandData,
        controller_is_updated: bool,
    ) -> Self {
        Self {
            controller_is_updated,
            init_observation: (&command.observation).into(),
            target: (&command.target).into(),
            mode_schedule: (&command.mode_schedule).into(),
            time_trajectory: solution.time_trajectory.clone(),
            state_trajectory: to_rows(&solution.state_trajectory),
            input_trajectory: to_rows(&solution.input_trajectory),
            controller: (&solution.controller).into(),
        }
    }

    /// Reconstruct the primal solution, including a callable control law.
    pub fn primal_solution(&self) -> Result<PrimalSolution, StructureError> {
        let solution = PrimalSolution {
            time_trajectory: self.time_trajectory.clone(),
            state_trajectory: from_rows(&self.state_trajectory),
            input_trajectory: from_rows(&self.input_trajectory),
            mode_schedule: (&self.mode_schedule).try_into()?,
            controller: (&self.controller).try_into()?,
        };
        solution.validate()?;
        Ok(solution)
    }

    pub fn command_data(&self) -> Result<CommandData, StructureError> {
        Ok(CommandData {
            observation: (&self.init_observation).try_into()?,
            target: (&self.target).try_into()?,
            mode_schedule: (&self.mode_schedule).try_into()?,
        })
    }
}
