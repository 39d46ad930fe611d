//! Optimal control problem models.

use horizon_core::{LinearApproximation, QuadraticApproximation, TargetTrajectories};
use nalgebra::{DMatrix, DVector};

/// A discrete-time optimal control problem: dynamics and a tracking cost.
///
/// `dt` is the length of the transition starting at `t`.
pub trait OcpModel: Send + Sync {
    fn state_dim(&self) -> usize;

    fn input_dim(&self) -> usize;

    /// Next state `x_{k+1}`.
    fn step(&self, t: f64, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64>;

    /// First-order model of [`step`](Self::step) around `(x, u)`.
    fn linearize(&self, t: f64, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> LinearApproximation;

    /// Quadratic model of the running cost accumulated over `[t, t + dt]`.
    fn stage_cost(
        &self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        dt: f64,
        target: &TargetTrajectories,
    ) -> QuadraticApproximation;

    /// Quadratic model of the terminal cost. Input blocks are empty.
    fn terminal_cost(&self, t: f64, x: &DVector<f64>, target: &TargetTrajectories) -> QuadraticApproximation;
}

/// Linear time-invariant dynamics `ẋ = A x + B u` (explicit Euler) with a
/// quadratic tracking cost.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearQuadraticModel {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    q_final: DMatrix<f64>,
}

impl LinearQuadraticModel {
    pub fn new(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        q_final: DMatrix<f64>,
    ) -> Self {
        Self {
            a,
            b,
            q,
            r,
            q_final,
        }
    }

    /// Position/velocity double integrator driven by an acceleration input.
    pub fn double_integrator() -> Self {
        Self::new(
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.5])),
            DMatrix::from_element(1, 1, 0.1),
            DMatrix::from_diagonal(&DVector::from_vec(vec![5.0, 2.0])),
        )
    }

    pub const fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub const fn b(&self) -> &DMatrix<f64> {
        &self.b
    }
}

impl OcpModel for LinearQuadraticModel {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn input_dim(&self) -> usize {
        self.b.ncols()
    }

    fn step(&self, _t: f64, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64> {
        x + (&self.a * x + &self.b * u) * dt
    }

    fn linearize(&self, t: f64, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> LinearApproximation {
        let nx = self.state_dim();
        LinearApproximation {
            f: self.step(t, x, u, dt),
            dfdx: DMatrix::identity(nx, nx) + &self.a * dt,
            dfdu: &self.b * dt,
        }
    }

    fn stage_cost(
        &self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        dt: f64,
        target: &TargetTrajectories,
    ) -> QuadraticApproximation {
        let dx = x - target.state_at(t);
        let du = u - target.input_at(t);
        let q_dx = &self.q * &dx;
        let r_du = &self.r * &du;
        QuadraticApproximation {
            f: 0.5 * dt * (dx.dot(&q_dx) + du.dot(&r_du)),
            dfdx: q_dx * dt,
            dfdu: r_du * dt,
            dfdxx: &self.q * dt,
            dfdux: DMatrix::zeros(self.input_dim(), self.state_dim()),
            dfduu: &self.r * dt,
        }
    }

    fn terminal_cost(&self, t: f64, x: &DVector<f64>, target: &TargetTrajectories) -> QuadraticApproximation {
        let dx = x - target.state_at(t);
        let q_dx = &self.q_final * &dx;
        QuadraticApproximation::state_only(0.5 * dx.dot(&q_dx), q_dx, self.q_final.clone())
    }
}
