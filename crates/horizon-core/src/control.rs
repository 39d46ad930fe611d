//! Time-varying control laws produced by a solve.

use nalgebra::{DMatrix, DVector};

use crate::error::StructureError;
use crate::interpolation::interpolate;

/// A control law valid over a time interval.
///
/// Both variants interpolate linearly between samples and hold the end
/// samples outside the interval.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlLaw {
    /// Open-loop input trajectory.
    Feedforward {
        times: Vec<f64>,
        inputs: Vec<DVector<f64>>,
    },
    /// Affine state feedback `u(t, x) = bias(t) + gain(t)·x`.
    Linear {
        times: Vec<f64>,
        biases: Vec<DVector<f64>>,
        gains: Vec<DMatrix<f64>>,
    },
}

impl ControlLaw {
    /// Build a feedforward law, checking that samples and times line up.
    pub fn feedforward(times: Vec<f64>, inputs: Vec<DVector<f64>>) -> Result<Self, StructureError> {
        if times.len() != inputs.len() {
            return Err(StructureError::mismatch("feedforward inputs", times.len(), inputs.len()));
        }
        check_increasing(&times)?;
        Ok(Self::Feedforward { times, inputs })
    }

    /// Build a linear feedback law, checking that samples and times line up.
    pub fn linear(
        times: Vec<f64>,
        biases: Vec<DVector<f64>>,
        gains: Vec<DMatrix<f64>>,
    ) -> Result<Self, StructureError> {
        if times.len() != biases.len() {
            return Err(StructureError::mismatch("feedback biases", times.len(), biases.len()));
        }
        if times.len() != gains.len() {
            return Err(StructureError::mismatch("feedback gains", times.len(), gains.len()));
        }
        check_increasing(&times)?;
        Ok(Self::Linear {
            times,
            biases,
            gains,
        })
    }

    pub fn times(&self) -> &[f64] {
        match self {
            Self::Feedforward { times, .. } | Self::Linear { times, .. } => times,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.times().is_empty()
    }

    pub const fn is_feedback(&self) -> bool {
        matches!(self, Self::Linear { .. })
    }

    /// First and last sample time.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let times = self.times();
        Some((*times.first()?, *times.last()?))
    }

    /// Evaluate the law at time `t` and state `x`.
    ///
    /// Returns `None` for an empty law.
    pub fn compute_input(&self, t: f64, x: &DVector<f64>) -> Option<DVector<f64>> {
        match self {
            Self::Feedforward { times, inputs } => interpolate(times, inputs, t),
            Self::Linear {
                times,
                biases,
                gains,
            } => {
                let bias = interpolate(times, biases, t)?;
                let gain = interpolate(times, gains, t)?;
                Some(bias + gain * x)
            }
        }
    }
}

fn check_increasing(times: &[f64]) -> Result<(), StructureError> {
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(StructureError::InvalidTrajectory(
            "control law times must be strictly increasing".into(),
        ));
    }
    Ok(())
}
