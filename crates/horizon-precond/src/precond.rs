//! Absolute row sums of the cost Hessian and of the dynamics coupling matrix.

use std::sync::OnceLock;

use horizon_core::{LinearApproximation, QuadraticApproximation, StagedProblemSize, StructureError};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::linalg::SingleThreadedLinalg;
use crate::pool::WorkerPool;
use crate::queue::StageQueue;

// ---------------------------------------------------------------------------
// Cost Hessian
// ---------------------------------------------------------------------------

/// Absolute row sums of the block-diagonal cost Hessian.
///
/// `cost` holds one quadratic model per stage `0..=N`. Stage 0 contributes its
/// input block only and stage `N` its state block only. Empty blocks are
/// treated as absent. The result has `num_decision_variables()` entries.
pub fn cost_row_abs_sum(
    size: &StagedProblemSize,
    cost: &[QuadraticApproximation],
) -> Result<DVector<f64>, StructureError> {
    size.require_transitions()?;
    let n = size.num_stages();
    if cost.len() != n + 1 {
        return Err(StructureError::mismatch("cost stages", n + 1, cost.len()));
    }

    let mut res = DVector::zeros(size.num_decision_variables());
    let nu_0 = size.num_inputs()[0];
    add_block(&mut res, 0, nu_0, &cost[0].dfduu, "stage 0 input Hessian")?;

    let mut row = nu_0;
    for (k, stage) in cost.iter().enumerate().take(n).skip(1) {
        let nx = size.num_states()[k];
        let nu = size.num_inputs()[k];
        add_block(&mut res, row, nx, &stage.dfdxx, "state Hessian")?;
        if !stage.dfdux.is_empty() {
            add_block(&mut res, row, nx, &stage.dfdux.transpose(), "cross Hessian")?;
            add_block(&mut res, row + nx, nu, &stage.dfdux, "cross Hessian")?;
        }
        add_block(&mut res, row + nx, nu, &stage.dfduu, "input Hessian")?;
        row += nx + nu;
    }

    let nx_n = size.num_states()[n];
    add_block(&mut res, row, nx_n, &cost[n].dfdxx, "terminal state Hessian")?;
    Ok(res)
}

/// Add the absolute row sums of `block` to `res[row..row + rows]`.
fn add_block(
    res: &mut DVector<f64>,
    row: usize,
    rows: usize,
    block: &DMatrix<f64>,
    what: &'static str,
) -> Result<(), StructureError> {
    if block.is_empty() {
        return Ok(());
    }
    if block.nrows() != rows {
        return Err(StructureError::mismatch(what, rows, block.nrows()));
    }
    let mut segment = res.rows_mut(row, rows);
    segment += abs_row_sum(block);
    Ok(())
}

// ---------------------------------------------------------------------------
// Dynamics coupling
// ---------------------------------------------------------------------------

/// Absolute row sums of `G Gᵀ`, where `G` stacks the dynamics constraints
/// `x_{k+1} = A_k x_k + B_k u_k` over all stages.
///
/// Block `k` of the result has `num_states[k + 1]` entries and combines
/// - the diagonal `diag(s_k²)` (identity without scaling vectors),
/// - `B_k B_kᵀ`, and `A_k A_kᵀ` for `k > 0`,
/// - the off-diagonal coupling `A_k diag(s_{k-1})` for `k > 0`,
/// - the off-diagonal coupling `(A_{k+1} diag(s_k))ᵀ` for `k < N - 1`.
///
/// `s_k` is the scaling vector of `x_{k+1}`. Inequality constraints are
/// accepted for interface compatibility (their stage count is checked) but do
/// not enter the sums.
///
/// Stages are computed concurrently on `pool`; every stage is evaluated by
/// exactly the same arithmetic regardless of which worker claims it, so the
/// output is bit-identical for any worker count. Linear algebra is pinned to
/// one thread for the duration of the call.
pub fn dynamics_coupling_row_abs_sum(
    size: &StagedProblemSize,
    dynamics: &[LinearApproximation],
    inequality_constraints: Option<&[LinearApproximation]>,
    scaling_vectors: Option<&[DVector<f64>]>,
    pool: &WorkerPool,
) -> Result<DVector<f64>, StructureError> {
    size.require_transitions()?;
    let n = size.num_stages();
    if let Some(scaling) = scaling_vectors {
        if scaling.len() != n {
            return Err(StructureError::mismatch("scaling vectors", n, scaling.len()));
        }
    }
    if let Some(constraints) = inequality_constraints {
        if constraints.len() != n + 1 {
            return Err(StructureError::mismatch(
                "inequality constraint stages",
                n + 1,
                constraints.len(),
            ));
        }
    }
    check_dynamics(size, dynamics, scaling_vectors)?;

    let _single = SingleThreadedLinalg::pin();

    let queue = StageQueue::new(n);
    let slots: Vec<OnceLock<DVector<f64>>> = (0..n).map(|_| OnceLock::new()).collect();
    let task = |_worker_id: usize| {
        while let Some(k) = queue.claim() {
            let block = coupling_stage(n, k, dynamics, scaling_vectors);
            // Each index is claimed once, so the slot is always vacant here.
            let _ = slots[k].set(block);
        }
    };
    pool.run_parallel(task, pool.num_threads());

    let mut res = DVector::zeros(size.num_dynamics_constraints());
    let mut row = 0;
    for (k, slot) in slots.into_iter().enumerate() {
        let block = slot
            .into_inner()
            .ok_or(StructureError::mismatch("computed stages", n, k))?;
        res.rows_mut(row, block.len()).copy_from(&block);
        row += block.len();
    }
    debug!(
        stages = n,
        rows = res.len(),
        workers = pool.num_threads(),
        "Computed dynamics coupling row sums"
    );
    Ok(res)
}

/// Shape checks, done before any worker starts.
fn check_dynamics(
    size: &StagedProblemSize,
    dynamics: &[LinearApproximation],
    scaling_vectors: Option<&[DVector<f64>]>,
) -> Result<(), StructureError> {
    let n = size.num_stages();
    if dynamics.len() != n {
        return Err(StructureError::mismatch("dynamics stages", n, dynamics.len()));
    }
    let states = size.num_states();
    for (k, stage) in dynamics.iter().enumerate() {
        let nx_next = states[k + 1];
        if stage.dfdu.nrows() != nx_next {
            return Err(StructureError::mismatch("input Jacobian rows", nx_next, stage.dfdu.nrows()));
        }
        if k > 0 {
            if stage.dfdx.nrows() != nx_next {
                return Err(StructureError::mismatch("state Jacobian rows", nx_next, stage.dfdx.nrows()));
            }
            if stage.dfdx.ncols() != states[k] {
                return Err(StructureError::mismatch("state Jacobian columns", states[k], stage.dfdx.ncols()));
            }
        }
        if let Some(scaling) = scaling_vectors {
            if scaling[k].len() != nx_next {
                return Err(StructureError::mismatch("scaling vector length", nx_next, scaling[k].len()));
            }
        }
    }
    Ok(())
}

fn coupling_stage(
    n: usize,
    k: usize,
    dynamics: &[LinearApproximation],
    scaling_vectors: Option<&[DVector<f64>]>,
) -> DVector<f64> {
    let b = &dynamics[k].dfdu;
    let nx_next = b.nrows();

    let mut temp = match scaling_vectors {
        Some(scaling) => DMatrix::from_diagonal(&scaling[k].component_mul(&scaling[k])),
        None => DMatrix::identity(nx_next, nx_next),
    };
    temp += b * b.transpose();
    if k != 0 {
        let a = &dynamics[k].dfdx;
        temp += a * a.transpose();
    }

    let mut sums = abs_row_sum(&temp);

    if k != 0 {
        let a = &dynamics[k].dfdx;
        sums += match scaling_vectors {
            Some(scaling) => abs_row_sum(&(a * DMatrix::from_diagonal(&scaling[k - 1]))),
            None => abs_row_sum(a),
        };
    }
    if k != n - 1 {
        let a_next = &dynamics[k + 1].dfdx;
        sums += match scaling_vectors {
            Some(scaling) => abs_col_sum(&(a_next * DMatrix::from_diagonal(&scaling[k]))),
            None => abs_col_sum(a_next),
        };
    }
    sums
}

fn abs_row_sum(m: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(m.nrows(), m.row_iter().map(|r| r.iter().map(|v| v.abs()).sum()))
}

/// Row sums of `|mᵀ|`.
fn abs_col_sum(m: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(
        m.ncols(),
        m.column_iter().map(|c| c.iter().map(|v| v.abs()).sum()),
    )
}
