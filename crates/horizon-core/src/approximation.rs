//! Local linear and quadratic models of the dynamics, constraints and cost.

use nalgebra::{DMatrix, DVector};

/// First-order model `f(x, u) ≈ f + dfdx·δx + dfdu·δu` of a vector function.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearApproximation {
    pub f: DVector<f64>,
    pub dfdx: DMatrix<f64>,
    pub dfdu: DMatrix<f64>,
}

impl LinearApproximation {
    /// Zero model with `rows` outputs.
    pub fn zeros(rows: usize, state_dim: usize, input_dim: usize) -> Self {
        Self {
            f: DVector::zeros(rows),
            dfdx: DMatrix::zeros(rows, state_dim),
            dfdu: DMatrix::zeros(rows, input_dim),
        }
    }

    /// Number of outputs of the approximated function.
    pub fn rows(&self) -> usize {
        self.f.len()
    }
}

impl Default for LinearApproximation {
    fn default() -> Self {
        Self::zeros(0, 0, 0)
    }
}

/// Second-order model of a scalar function of state and input.
///
/// `dfdux` is `input_dim × state_dim`. Empty blocks mean the term is absent.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadraticApproximation {
    pub f: f64,
    pub dfdx: DVector<f64>,
    pub dfdu: DVector<f64>,
    pub dfdxx: DMatrix<f64>,
    pub dfdux: DMatrix<f64>,
    pub dfduu: DMatrix<f64>,
}

impl QuadraticApproximation {
    pub fn zeros(state_dim: usize, input_dim: usize) -> Self {
        Self {
            f: 0.0,
            dfdx: DVector::zeros(state_dim),
            dfdu: DVector::zeros(input_dim),
            dfdxx: DMatrix::zeros(state_dim, state_dim),
            dfdux: DMatrix::zeros(input_dim, state_dim),
            dfduu: DMatrix::zeros(input_dim, input_dim),
        }
    }

    /// State-only model, used for terminal costs.
    pub fn state_only(f: f64, dfdx: DVector<f64>, dfdxx: DMatrix<f64>) -> Self {
        Self {
            f,
            dfdx,
            dfdu: DVector::zeros(0),
            dfdxx,
            dfdux: DMatrix::zeros(0, 0),
            dfduu: DMatrix::zeros(0, 0),
        }
    }
}

impl Default for QuadraticApproximation {
    fn default() -> Self {
        Self::zeros(0, 0)
    }
}

/// Per-stage data produced when the solver linearizes around its nominal
/// trajectory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelData {
    pub time: f64,
    pub state_dim: usize,
    pub input_dim: usize,
    pub dynamics: LinearApproximation,
    pub cost: QuadraticApproximation,
}
