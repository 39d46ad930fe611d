//! Random stage-structured problems.

use horizon_core::{LinearApproximation, QuadraticApproximation, StagedProblemSize};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::rng::random_vector;

/// A random LQ approximation over a variable-dimension problem.
#[derive(Debug, Clone)]
pub struct RandomProblem {
    pub size: StagedProblemSize,
    pub dynamics: Vec<LinearApproximation>,
    pub cost: Vec<QuadraticApproximation>,
    pub scaling_vectors: Vec<DVector<f64>>,
}

pub fn random_matrix(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

/// Problem size with `num_stages` stages and dimensions drawn from
/// `1..=max_dim`; every third stage has inequality constraints.
pub fn random_size(rng: &mut ChaCha8Rng, num_stages: usize, max_dim: usize) -> StagedProblemSize {
    let states = (0..=num_stages).map(|_| rng.gen_range(1..=max_dim)).collect();
    let inputs = (0..num_stages).map(|_| rng.gen_range(1..=max_dim)).collect();
    let ineq = (0..=num_stages)
        .map(|k| if k % 3 == 0 { rng.gen_range(0..=max_dim) } else { 0 })
        .collect();
    StagedProblemSize::new(num_stages, states, inputs, ineq)
        .unwrap_or_else(|_| StagedProblemSize::uniform(num_stages, max_dim, max_dim))
}

pub fn random_dynamics(rng: &mut ChaCha8Rng, size: &StagedProblemSize) -> Vec<LinearApproximation> {
    let states = size.num_states();
    let inputs = size.num_inputs();
    (0..size.num_stages())
        .map(|k| LinearApproximation {
            f: random_vector(rng, states[k + 1], -1.0..1.0),
            dfdx: random_matrix(rng, states[k + 1], states[k]),
            dfdu: random_matrix(rng, states[k + 1], inputs[k]),
        })
        .collect()
}

/// Positive semi-definite stage costs; the last entry is the terminal cost.
pub fn random_cost(rng: &mut ChaCha8Rng, size: &StagedProblemSize) -> Vec<QuadraticApproximation> {
    let states = size.num_states();
    let inputs = size.num_inputs();
    let n = size.num_stages();
    (0..=n)
        .map(|k| {
            let nx = states[k];
            let root = random_matrix(rng, nx, nx);
            let dfdxx = &root * root.transpose();
            if k == n {
                return QuadraticApproximation::state_only(0.0, DVector::zeros(nx), dfdxx);
            }
            let nu = inputs[k];
            let root_u = random_matrix(rng, nu, nu);
            QuadraticApproximation {
                f: 0.0,
                dfdx: DVector::zeros(nx),
                dfdu: DVector::zeros(nu),
                dfdxx,
                dfdux: random_matrix(rng, nu, nx) * 0.1,
                dfduu: &root_u * root_u.transpose() + DMatrix::identity(nu, nu),
            }
        })
        .collect()
}

/// One positive scaling vector per transition, sized to its successor state.
pub fn random_scaling_vectors(rng: &mut ChaCha8Rng, size: &StagedProblemSize) -> Vec<DVector<f64>> {
    size.num_states()[1..]
        .iter()
        .map(|&nx| random_vector(rng, nx, 0.5..2.0))
        .collect()
}

pub fn random_problem(rng: &mut ChaCha8Rng, num_stages: usize, max_dim: usize) -> RandomProblem {
    let size = random_size(rng, num_stages, max_dim);
    RandomProblem {
        dynamics: random_dynamics(rng, &size),
        cost: random_cost(rng, &size),
        scaling_vectors: random_scaling_vectors(rng, &size),
        size,
    }
}
