//! Row-sum scaling data of one QP approximation.

use horizon_core::{LinearApproximation, QuadraticApproximation, StagedProblemSize, StructureError};
use nalgebra::DVector;

use crate::pool::WorkerPool;
use crate::precond::{cost_row_abs_sum, dynamics_coupling_row_abs_sum};

/// Absolute row sums of the cost Hessian `H` and of `G Gᵀ` for one LQ
/// approximation, together with the Gershgorin bounds they imply.
#[derive(Clone, Debug, PartialEq)]
pub struct QpScaling {
    pub cost_row_sums: DVector<f64>,
    pub coupling_row_sums: DVector<f64>,
}

impl QpScaling {
    pub fn compute(
        size: &StagedProblemSize,
        cost: &[QuadraticApproximation],
        dynamics: &[LinearApproximation],
        scaling_vectors: Option<&[DVector<f64>]>,
        pool: &WorkerPool,
    ) -> Result<Self, StructureError> {
        Ok(Self {
            cost_row_sums: cost_row_abs_sum(size, cost)?,
            coupling_row_sums: dynamics_coupling_row_abs_sum(
                size,
                dynamics,
                None,
                scaling_vectors,
                pool,
            )?,
        })
    }

    /// Upper bound on the largest eigenvalue of `H`.
    pub fn hessian_eigen_bound(&self) -> f64 {
        max_entry(&self.cost_row_sums)
    }

    /// Upper bound on the largest eigenvalue of `G Gᵀ`, i.e. on `‖G‖²`.
    pub fn coupling_eigen_bound(&self) -> f64 {
        max_entry(&self.coupling_row_sums)
    }

    /// Step sizes `(α, β)` of a primal-dual projected gradient iteration with
    /// strong convexity modulus `mu`.
    ///
    /// Uses `α = 2 / (λ_H + sqrt(λ_H² + 4 λ_G))` and `β = 2 λ_G α` when the
    /// bounds are positive. Returns `None` when both bounds vanish.
    pub fn step_sizes(&self, mu: f64) -> Option<(f64, f64)> {
        let lambda_h = self.hessian_eigen_bound().max(mu);
        let lambda_g = self.coupling_eigen_bound();
        let denom = lambda_h + lambda_h.mul_add(lambda_h, 4.0 * lambda_g).sqrt();
        if denom <= 0.0 {
            return None;
        }
        let alpha = 2.0 / denom;
        Some((alpha, 2.0 * lambda_g * alpha))
    }
}

fn max_entry(v: &DVector<f64>) -> f64 {
    v.iter().copied().fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn lq_problem() -> (StagedProblemSize, Vec<QuadraticApproximation>, Vec<LinearApproximation>) {
        let size = StagedProblemSize::uniform(3, 2, 1);
        let dynamics = vec![
            LinearApproximation {
                f: DVector::zeros(2),
                dfdx: DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]),
                dfdu: DMatrix::from_row_slice(2, 1, &[0.0, 0.1]),
            };
            3
        ];
        let mut stage = QuadraticApproximation::zeros(2, 1);
        stage.dfdxx = DMatrix::identity(2, 2);
        stage.dfduu = DMatrix::from_element(1, 1, 0.1);
        let mut cost = vec![stage; 3];
        cost.push(QuadraticApproximation::state_only(
            0.0,
            DVector::zeros(2),
            DMatrix::identity(2, 2) * 10.0,
        ));
        (size, cost, dynamics)
    }

    #[test]
    fn bounds_are_row_sum_maxima() {
        let _serial = linalg::test_lock();
        let (size, cost, dynamics) = lq_problem();
        let pool = WorkerPool::new(2).unwrap();
        let scaling = QpScaling::compute(&size, &cost, &dynamics, None, &pool).unwrap();
        assert_eq!(scaling.cost_row_sums.len(), size.num_decision_variables());
        assert_eq!(scaling.coupling_row_sums.len(), size.num_dynamics_constraints());
        assert_relative_eq!(scaling.hessian_eigen_bound(), 10.0);
        assert!(scaling.coupling_eigen_bound() >= 1.0);
    }

    #[test]
    fn step_sizes_are_positive() {
        let scaling = QpScaling {
            cost_row_sums: DVector::from_vec(vec![1.0, 4.0]),
            coupling_row_sums: DVector::from_vec(vec![3.0]),
        };
        let (alpha, beta) = scaling.step_sizes(0.0).unwrap();
        assert_relative_eq!(alpha, 2.0 / (4.0 + 28.0_f64.sqrt()));
        assert_relative_eq!(beta, 6.0 * alpha);
    }

    #[test]
    fn vanishing_bounds_have_no_step() {
        let scaling = QpScaling {
            cost_row_sums: DVector::zeros(2),
            coupling_row_sums: DVector::zeros(1),
        };
        assert_eq!(scaling.step_sizes(0.0), None);
    }
}
