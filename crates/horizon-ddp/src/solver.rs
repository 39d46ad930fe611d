//! Gauss-Newton DDP over a partitioned, receding time horizon.
//!
//! One call to [`DdpSolver::run`]:
//!
//! 1. Shifts the time partitions forward if the initial time has passed the
//!    first partition (a "rewind").
//! 2. Rolls out the warm-start controller of the previous call.
//! 3. Iterates: linearize dynamics and quadratize cost per stage, Riccati
//!    backward pass, forward rollout with backtracking line search, until the
//!    relative cost change falls below `min_rel_cost`.
//! 4. Stores the nominal trajectories, model data and value function
//!    partition-major, together with a linear feedback controller.

use std::time::Instant;

use horizon_core::{
    ConfigError, ControlLaw, DdpSettings, LinearApproximation, ModeSchedule, ModelData, MpcSettings,
    PrimalSolution, QuadraticApproximation, SolveError, StagedProblemSize, StructureError,
    TargetTrajectories,
};
use horizon_precond::{QpScaling, WorkerPool, linalg};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use crate::controller::LinearController;
use crate::model::OcpModel;

/// Outcome of one [`DdpSolver::run`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DdpSummary {
    pub iterations: usize,
    pub total_cost: f64,
    /// Whether the relative cost change fell below `min_rel_cost`.
    pub converged: bool,
    pub solve_time_us: u64,
}

/// Quadratic value function `s + Svᵀ δx + ½ δxᵀ Sm δx` at one time node.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueFunctionSample {
    pub time: f64,
    pub s: f64,
    pub sv: DVector<f64>,
    pub sm: DMatrix<f64>,
}

impl Default for ValueFunctionSample {
    fn default() -> Self {
        Self {
            time: 0.0,
            s: 0.0,
            sv: DVector::zeros(0),
            sm: DMatrix::zeros(0, 0),
        }
    }
}

struct BackwardPass {
    feedforward: Vec<DVector<f64>>,
    gains: Vec<DMatrix<f64>>,
    value: Vec<ValueFunctionSample>,
    /// Predicted cost change of a full step (non-positive).
    expected_change: f64,
}

/// Discrete-time DDP solver for an [`OcpModel`].
pub struct DdpSolver<M: OcpModel> {
    model: M,
    settings: DdpSettings,
    time_horizon: f64,
    pool: Option<WorkerPool>,
    target: TargetTrajectories,
    scaling: Option<QpScaling>,
    summary: DdpSummary,

    pub(crate) mode_schedule: ModeSchedule,
    pub(crate) init_time: f64,
    pub(crate) final_time: f64,
    pub(crate) init_state: DVector<f64>,
    pub(crate) num_partitions: usize,
    pub(crate) partitioning_times: Vec<f64>,
    pub(crate) init_active_partition: usize,
    pub(crate) final_active_partition: usize,
    pub(crate) rewind_counter: u64,

    pub(crate) controllers: Vec<LinearController>,
    pub(crate) nominal_times: Vec<Vec<f64>>,
    pub(crate) nominal_post_event_indices: Vec<Vec<usize>>,
    pub(crate) nominal_states: Vec<Vec<DVector<f64>>>,
    pub(crate) nominal_inputs: Vec<Vec<DVector<f64>>>,
    pub(crate) model_data: Vec<Vec<ModelData>>,
    pub(crate) value_function: Vec<Vec<ValueFunctionSample>>,
    pub(crate) heuristics: QuadraticApproximation,
}

impl<M: OcpModel> DdpSolver<M> {
    /// Build a solver; fails if `settings` or `mpc` do not validate.
    pub fn new(model: M, settings: DdpSettings, mpc: &MpcSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        mpc.validate()?;
        let num_partitions = mpc.num_partitions;
        let target = TargetTrajectories::constant(
            0.0,
            DVector::zeros(model.state_dim()),
            DVector::zeros(model.input_dim()),
        );
        let init_state = DVector::zeros(model.state_dim());
        Ok(Self {
            model,
            settings,
            time_horizon: mpc.time_horizon,
            pool: None,
            target,
            scaling: None,
            summary: DdpSummary::default(),
            mode_schedule: ModeSchedule::default(),
            init_time: 0.0,
            final_time: 0.0,
            init_state,
            num_partitions,
            partitioning_times: Vec::new(),
            init_active_partition: 0,
            final_active_partition: 0,
            rewind_counter: 0,
            controllers: vec![LinearController::default(); num_partitions],
            nominal_times: vec![Vec::new(); num_partitions],
            nominal_post_event_indices: vec![Vec::new(); num_partitions],
            nominal_states: vec![Vec::new(); num_partitions],
            nominal_inputs: vec![Vec::new(); num_partitions],
            model_data: vec![Vec::new(); num_partitions],
            value_function: vec![Vec::new(); num_partitions],
            heuristics: QuadraticApproximation::default(),
        })
    }

    /// Worker pool used to compute QP scaling data each iteration.
    #[must_use]
    pub fn with_worker_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    pub const fn settings(&self) -> &DdpSettings {
        &self.settings
    }

    pub const fn time_horizon(&self) -> f64 {
        self.time_horizon
    }

    pub const fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn partitioning_times(&self) -> &[f64] {
        &self.partitioning_times
    }

    pub const fn rewind_counter(&self) -> u64 {
        self.rewind_counter
    }

    pub const fn init_time(&self) -> f64 {
        self.init_time
    }

    pub const fn final_time(&self) -> f64 {
        self.final_time
    }

    pub const fn summary(&self) -> &DdpSummary {
        &self.summary
    }

    /// Scaling data of the last iteration's LQ approximation.
    pub const fn scaling(&self) -> Option<&QpScaling> {
        self.scaling.as_ref()
    }

    pub const fn target(&self) -> &TargetTrajectories {
        &self.target
    }

    pub const fn mode_schedule(&self) -> &ModeSchedule {
        &self.mode_schedule
    }

    pub fn controllers(&self) -> &[LinearController] {
        &self.controllers
    }

    pub fn set_target(&mut self, target: TargetTrajectories) -> Result<(), StructureError> {
        if target.state_dim() != self.model.state_dim() {
            return Err(StructureError::mismatch(
                "target state dimension",
                self.model.state_dim(),
                target.state_dim(),
            ));
        }
        if target.input_dim() != self.model.input_dim() {
            return Err(StructureError::mismatch(
                "target input dimension",
                self.model.input_dim(),
                target.input_dim(),
            ));
        }
        self.target = target;
        Ok(())
    }

    pub fn set_mode_schedule(&mut self, mode_schedule: ModeSchedule) {
        self.mode_schedule = mode_schedule;
    }

    /// Drop the warm start and every stored trajectory.
    pub fn reset(&mut self) {
        self.partitioning_times.clear();
        self.rewind_counter = 0;
        self.init_active_partition = 0;
        self.final_active_partition = 0;
        self.scaling = None;
        self.summary = DdpSummary::default();
        self.heuristics = QuadraticApproximation::default();
        self.clear_partitions();
        debug!("DDP solver reset");
    }

    // -----------------------------------------------------------------------
    // Solve
    // -----------------------------------------------------------------------

    /// Optimize over `[init_time, final_time]` starting from `init_state`.
    pub fn run(
        &mut self,
        init_time: f64,
        init_state: &DVector<f64>,
        final_time: f64,
    ) -> Result<DdpSummary, SolveError> {
        let start = Instant::now();
        let nx = self.model.state_dim();
        if init_state.len() != nx {
            return Err(StructureError::mismatch("initial state", nx, init_state.len()).into());
        }
        if final_time.partial_cmp(&init_time) != Some(std::cmp::Ordering::Greater) {
            return Err(StructureError::InvalidTrajectory(format!(
                "final time {final_time} must be after initial time {init_time}"
            ))
            .into());
        }

        // 1. Partitions and time grid
        self.update_partitions(init_time, final_time);
        let times = time_grid(init_time, final_time, self.settings.time_step);

        // 2. Warm-start rollout
        let warm_start = LinearController::concatenate(&self.controllers)
            .ok()
            .filter(|law| !law.is_empty());
        let (mut xs, mut us) = self.rollout(&times, init_state, |_, t, x| {
            self.warm_start_input(warm_start.as_ref(), t, x)
        });
        let mut cost = self.total_cost(&times, &xs, &us);
        if !cost.is_finite() {
            return Err(SolveError::Diverged { iteration: 0 });
        }

        // 3. Gauss-Newton iterations
        let mut converged = false;
        let mut iterations = 0;
        let mut last = None;
        while iterations < self.settings.max_iterations {
            iterations += 1;
            let (dynamics, quadratic_cost) = self.approximate(&times, &xs, &us);
            if self.settings.compute_scaling {
                if let Some(pool) = &self.pool {
                    let size = StagedProblemSize::uniform(us.len(), nx, self.model.input_dim());
                    self.scaling =
                        Some(QpScaling::compute(&size, &quadratic_cost, &dynamics, None, pool)?);
                }
            }
            let backward = backward_pass(&times, &dynamics, &quadratic_cost)?;
            if -backward.expected_change <= self.settings.min_rel_cost * cost.abs().max(1e-9) {
                debug!(iteration = iterations, cost, "Predicted improvement below tolerance");
                last = Some((backward, dynamics, quadratic_cost));
                converged = true;
                break;
            }

            let accepted = self.line_search(&times, init_state, &xs, &us, &backward, cost);
            last = Some((backward, dynamics, quadratic_cost));
            let Some((new_xs, new_us, new_cost, alpha)) = accepted else {
                debug!(iteration = iterations, cost, "No descent step found");
                break;
            };
            let rel_change = (cost - new_cost).abs() / cost.abs().max(f64::EPSILON);
            debug!(
                iteration = iterations,
                cost = new_cost,
                alpha,
                rel_change,
                "DDP iteration"
            );
            xs = new_xs;
            us = new_us;
            cost = new_cost;
            if rel_change < self.settings.min_rel_cost {
                converged = true;
                break;
            }
        }
        let (backward, dynamics, quadratic_cost) = last.ok_or_else(|| {
            SolveError::Failed("no iteration ran (max_iterations is zero)".into())
        })?;

        // 4. Store results partition-major
        self.init_time = init_time;
        self.final_time = final_time;
        self.init_state = init_state.clone();
        self.store(&times, &xs, &us, &backward, dynamics, quadratic_cost);

        let elapsed = start.elapsed();
        self.summary = DdpSummary {
            iterations,
            total_cost: cost,
            converged,
            solve_time_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        };
        Ok(self.summary.clone())
    }

    /// The optimized trajectory over the active partitions.
    pub fn primal_solution(&self) -> Result<PrimalSolution, SolveError> {
        let active = self.init_active_partition..=self.final_active_partition;
        let time_trajectory: Vec<f64> = self.nominal_times[active.clone()].concat();
        if time_trajectory.is_empty() {
            return Err(SolveError::Failed("no solution available".into()));
        }
        let controller: ControlLaw =
            LinearController::concatenate(&self.controllers[active.clone()])?;
        Ok(PrimalSolution {
            time_trajectory,
            state_trajectory: self.nominal_states[active.clone()].concat(),
            input_trajectory: self.nominal_inputs[active].concat(),
            mode_schedule: self.mode_schedule.clone(),
            controller,
        })
    }

    // -----------------------------------------------------------------------
    // Partitions
    // -----------------------------------------------------------------------

    fn update_partitions(&mut self, init_time: f64, final_time: f64) {
        let length = self.time_horizon / self.num_partitions as f64;
        let needs_init = match (self.partitioning_times.first(), self.partitioning_times.last()) {
            (Some(&first), Some(&last)) => init_time < first || init_time >= last,
            _ => true,
        };
        if needs_init {
            self.partitioning_times = (0..=self.num_partitions)
                .map(|i| (i as f64).mul_add(length, init_time))
                .collect();
            self.clear_partitions();
        }
        while self.num_partitions > 1 && init_time >= self.partitioning_times[1] {
            self.rewind(length);
        }
        self.init_active_partition = self.partition_of(init_time);
        self.final_active_partition = self.partition_of(final_time);
    }

    /// Drop the oldest partition and append an empty one at the end.
    fn rewind(&mut self, length: f64) {
        self.partitioning_times.remove(0);
        let last = self.partitioning_times.last().copied().unwrap_or_default();
        self.partitioning_times.push(last + length);
        self.controllers.rotate_left(1);
        if let Some(c) = self.controllers.last_mut() {
            c.clear();
        }
        shift_partitions(&mut self.nominal_times);
        shift_partitions(&mut self.nominal_post_event_indices);
        shift_partitions(&mut self.nominal_states);
        shift_partitions(&mut self.nominal_inputs);
        shift_partitions(&mut self.model_data);
        shift_partitions(&mut self.value_function);
        self.rewind_counter += 1;
        debug!(
            rewind_counter = self.rewind_counter,
            first_boundary = self.partitioning_times[0],
            "Rewound time partitions"
        );
    }

    /// Partition containing `t`. Boundary times belong to the later partition.
    fn partition_of(&self, t: f64) -> usize {
        self.partitioning_times
            .partition_point(|&b| b <= t)
            .saturating_sub(1)
            .min(self.num_partitions - 1)
    }

    fn clear_partitions(&mut self) {
        self.controllers.resize_with(self.num_partitions, LinearController::default);
        self.controllers.iter_mut().for_each(LinearController::clear);
        resize_partitions(&mut self.nominal_times, self.num_partitions);
        resize_partitions(&mut self.nominal_post_event_indices, self.num_partitions);
        resize_partitions(&mut self.nominal_states, self.num_partitions);
        resize_partitions(&mut self.nominal_inputs, self.num_partitions);
        resize_partitions(&mut self.model_data, self.num_partitions);
        resize_partitions(&mut self.value_function, self.num_partitions);
    }

    // -----------------------------------------------------------------------
    // Iteration steps
    // -----------------------------------------------------------------------

    fn warm_start_input(&self, warm_start: Option<&ControlLaw>, t: f64, x: &DVector<f64>) -> DVector<f64> {
        warm_start
            .and_then(|law| law.compute_input(t, x))
            .filter(|u| u.len() == self.model.input_dim() && u.iter().all(|v| v.is_finite()))
            .unwrap_or_else(|| self.target.input_at(t))
    }

    fn rollout(
        &self,
        times: &[f64],
        x0: &DVector<f64>,
        mut policy: impl FnMut(usize, f64, &DVector<f64>) -> DVector<f64>,
    ) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
        let n = times.len() - 1;
        let mut xs = Vec::with_capacity(n + 1);
        let mut us = Vec::with_capacity(n);
        xs.push(x0.clone());
        for k in 0..n {
            let u = policy(k, times[k], &xs[k]);
            let next = self.model.step(times[k], &xs[k], &u, times[k + 1] - times[k]);
            us.push(u);
            xs.push(next);
        }
        (xs, us)
    }

    fn total_cost(&self, times: &[f64], xs: &[DVector<f64>], us: &[DVector<f64>]) -> f64 {
        let n = us.len();
        let running: f64 = (0..n)
            .map(|k| {
                self.model
                    .stage_cost(times[k], &xs[k], &us[k], times[k + 1] - times[k], &self.target)
                    .f
            })
            .sum();
        running + self.model.terminal_cost(times[n], &xs[n], &self.target).f
    }

    /// Per-stage LQ approximation: `N` dynamics models and `N + 1` cost models.
    fn approximate(
        &self,
        times: &[f64],
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
    ) -> (Vec<LinearApproximation>, Vec<QuadraticApproximation>) {
        let n = us.len();
        let stage = |k: usize| {
            let dt = times[k + 1] - times[k];
            (
                self.model.linearize(times[k], &xs[k], &us[k], dt),
                self.model.stage_cost(times[k], &xs[k], &us[k], dt, &self.target),
            )
        };
        let stages: Vec<_> = if linalg::parallel_enabled() {
            (0..n).into_par_iter().map(stage).collect()
        } else {
            (0..n).map(stage).collect()
        };
        let (dynamics, mut cost): (Vec<_>, Vec<_>) = stages.into_iter().unzip();
        cost.push(self.model.terminal_cost(times[n], &xs[n], &self.target));
        (dynamics, cost)
    }

    #[allow(clippy::type_complexity)]
    fn line_search(
        &self,
        times: &[f64],
        x0: &DVector<f64>,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        backward: &BackwardPass,
        cost: f64,
    ) -> Option<(Vec<DVector<f64>>, Vec<DVector<f64>>, f64, f64)> {
        let mut alpha = 1.0;
        while alpha >= self.settings.line_search_min_step {
            let (new_xs, new_us) = self.rollout(times, x0, |k, _, x| {
                &us[k] + &backward.feedforward[k] * alpha + &backward.gains[k] * (x - &xs[k])
            });
            let new_cost = self.total_cost(times, &new_xs, &new_us);
            if new_cost.is_finite() && new_cost <= cost {
                return Some((new_xs, new_us, new_cost, alpha));
            }
            alpha *= self.settings.line_search_contraction;
        }
        None
    }

    fn store(
        &mut self,
        times: &[f64],
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        backward: &BackwardPass,
        dynamics: Vec<LinearApproximation>,
        cost: Vec<QuadraticApproximation>,
    ) {
        let n = us.len();
        let nx = self.model.state_dim();
        let nu = self.model.input_dim();
        self.clear_partitions();

        let mut local_index = vec![0; self.num_partitions];
        let mut node_partition = Vec::with_capacity(n + 1);
        let mut dynamics = dynamics.into_iter();
        for (k, (&t, stage_cost)) in times.iter().zip(cost).enumerate() {
            let p = self.partition_of(t);
            node_partition.push((p, local_index[p]));
            local_index[p] += 1;

            // The terminal node reuses the last transition's input and gain.
            let j = k.min(n - 1);
            let gain = &backward.gains[j];
            let input = &us[j];
            self.nominal_times[p].push(t);
            self.nominal_states[p].push(xs[k].clone());
            self.nominal_inputs[p].push(input.clone());
            let controller = &mut self.controllers[p];
            controller.times.push(t);
            controller.biases.push(input - gain * &xs[k]);
            controller.gains.push(gain.clone());
            self.model_data[p].push(ModelData {
                time: t,
                state_dim: nx,
                input_dim: nu,
                dynamics: dynamics.next().unwrap_or_default(),
                cost: stage_cost,
            });
            self.value_function[p].push(backward.value[k].clone());
        }

        for event in self.mode_schedule.events_between(times[0], times[n]) {
            let node = times.partition_point(|&t| t < event);
            if let Some(&(p, local)) = node_partition.get(node) {
                self.nominal_post_event_indices[p].push(local);
            }
        }

        if let Some(terminal) = self.model_data[self.final_active_partition].last() {
            self.heuristics = terminal.cost.clone();
        }
    }
}

impl<M: OcpModel + std::fmt::Debug> std::fmt::Debug for DdpSolver<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DdpSolver")
            .field("model", &self.model)
            .field("num_partitions", &self.num_partitions)
            .field("rewind_counter", &self.rewind_counter)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Grid from `init` to `end` with spacing `dt`; the last interval may be
/// shorter so that `end` is always a node.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn time_grid(init: f64, end: f64, dt: f64) -> Vec<f64> {
    let steps = ((end - init) / dt - 1e-9).ceil().max(1.0) as usize;
    let mut times: Vec<f64> = (0..steps).map(|k| (k as f64).mul_add(dt, init)).collect();
    times.push(end);
    times
}

fn backward_pass(
    times: &[f64],
    dynamics: &[LinearApproximation],
    cost: &[QuadraticApproximation],
) -> Result<BackwardPass, SolveError> {
    let n = dynamics.len();
    let terminal = &cost[n];
    let mut s = terminal.f;
    let mut sv = terminal.dfdx.clone();
    let mut sm = terminal.dfdxx.clone();

    let mut feedforward = vec![DVector::zeros(0); n];
    let mut gains = vec![DMatrix::zeros(0, 0); n];
    let mut value = vec![ValueFunctionSample::default(); n + 1];
    let mut expected_change = 0.0;
    value[n] = ValueFunctionSample {
        time: times[n],
        s,
        sv: sv.clone(),
        sm: sm.clone(),
    };

    for k in (0..n).rev() {
        let a = &dynamics[k].dfdx;
        let b = &dynamics[k].dfdu;
        let l = &cost[k];
        let lux = if l.dfdux.is_empty() {
            DMatrix::zeros(b.ncols(), a.ncols())
        } else {
            l.dfdux.clone()
        };

        let sm_a = &sm * a;
        let sm_b = &sm * b;
        let qx = &l.dfdx + a.transpose() * &sv;
        let qu = &l.dfdu + b.transpose() * &sv;
        let qxx = &l.dfdxx + a.transpose() * &sm_a;
        let quu = &l.dfduu + b.transpose() * &sm_b;
        let quu = (&quu + quu.transpose()) * 0.5;
        let qux = lux + b.transpose() * &sm_a;

        let chol = quu
            .clone()
            .cholesky()
            .ok_or(SolveError::NotPositiveDefinite { stage: k })?;
        let k_ff = -chol.solve(&qu);
        let k_fb = -chol.solve(&qux);

        let k_fb_t = k_fb.transpose();
        let stage_change = k_ff.dot(&qu) + 0.5 * k_ff.dot(&(&quu * &k_ff));
        expected_change += stage_change;
        s += l.f + stage_change;
        sv = qx + &k_fb_t * &quu * &k_ff + &k_fb_t * &qu + qux.transpose() * &k_ff;
        let sm_next = qxx + &k_fb_t * &quu * &k_fb + &k_fb_t * &qux + qux.transpose() * &k_fb;
        sm = (&sm_next + sm_next.transpose()) * 0.5;

        value[k] = ValueFunctionSample {
            time: times[k],
            s,
            sv: sv.clone(),
            sm: sm.clone(),
        };
        feedforward[k] = k_ff;
        gains[k] = k_fb;
    }

    Ok(BackwardPass {
        feedforward,
        gains,
        value,
        expected_change,
    })
}

fn shift_partitions<T>(buffer: &mut [Vec<T>]) {
    buffer.rotate_left(1);
    if let Some(last) = buffer.last_mut() {
        last.clear();
    }
}

fn resize_partitions<T>(buffer: &mut Vec<Vec<T>>, num_partitions: usize) {
    buffer.resize_with(num_partitions, Vec::new);
    buffer.iter_mut().for_each(Vec::clear);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearQuadraticModel;
    use approx::assert_relative_eq;

    fn solver() -> DdpSolver<LinearQuadraticModel> {
        let mpc = MpcSettings {
            time_horizon: 1.0,
            num_partitions: 2,
            debug_print: false,
        };
        DdpSolver::new(LinearQuadraticModel::double_integrator(), DdpSettings::default(), &mpc)
            .unwrap()
    }

    fn x0() -> DVector<f64> {
        DVector::from_vec(vec![1.0, 0.0])
    }

    #[test]
    fn time_grid_ends_on_final_time() {
        let times = time_grid(0.0, 0.25, 0.1);
        assert_eq!(times.len(), 4);
        assert_relative_eq!(times[2], 0.2);
        assert_relative_eq!(times[3], 0.25);

        let exact = time_grid(0.0, 0.3, 0.1);
        assert_eq!(exact.len(), 4);
        assert!(exact.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn solve_reduces_cost_and_converges_for_lq() {
        let mut solver = solver();
        let summary = solver.run(0.0, &x0(), 1.0).unwrap();
        assert!(summary.converged);
        assert!(summary.iterations <= 3);

        // The optimal cost is below the zero-input cost.
        let zero_input = DdpSolver::new(
            LinearQuadraticModel::double_integrator(),
            DdpSettings::default(),
            &MpcSettings::default(),
        )
        .unwrap();
        let times = time_grid(0.0, 1.0, 0.01);
        let (xs, us) = zero_input.rollout(&times, &x0(), |_, _, _| DVector::zeros(1));
        assert!(summary.total_cost < zero_input.total_cost(&times, &xs, &us));
    }

    #[test]
    fn primal_solution_is_valid_and_starts_at_init_time() {
        let mut solver = solver();
        solver.run(0.0, &x0(), 1.0).unwrap();
        let solution = solver.primal_solution().unwrap();
        solution.validate().unwrap();
        assert_relative_eq!(solution.start_time().unwrap(), 0.0);
        assert_relative_eq!(solution.final_time().unwrap(), 1.0);
        assert!(solution.controller.is_feedback());
    }

    #[test]
    fn feedback_reproduces_nominal_input() {
        let mut solver = solver();
        solver.run(0.0, &x0(), 1.0).unwrap();
        let solution = solver.primal_solution().unwrap();
        let k = 10;
        let u = solution
            .controller
            .compute_input(solution.time_trajectory[k], &solution.state_trajectory[k])
            .unwrap();
        assert_relative_eq!(u[0], solution.input_trajectory[k][0], epsilon = 1e-9);
    }

    #[test]
    fn data_is_partition_major() {
        let mut solver = solver();
        solver.run(0.0, &x0(), 1.0).unwrap();
        assert_eq!(solver.nominal_times.len(), 2);
        assert!(solver.nominal_times.iter().all(|p| !p.is_empty()));
        assert!(solver.nominal_times[0].last() < solver.nominal_times[1].first());
        assert_eq!(solver.model_data[0].len(), solver.nominal_times[0].len());
        assert_eq!(solver.value_function[1].len(), solver.nominal_times[1].len());
        assert_eq!(solver.partitioning_times(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn advancing_past_a_boundary_rewinds() {
        let mut solver = solver();
        solver.run(0.0, &x0(), 1.0).unwrap();
        assert_eq!(solver.rewind_counter(), 0);
        solver.run(0.2, &x0(), 1.2).unwrap();
        assert_eq!(solver.rewind_counter(), 0);
        solver.run(0.6, &x0(), 1.6).unwrap();
        assert_eq!(solver.rewind_counter(), 1);
        assert_relative_eq!(solver.partitioning_times()[0], 0.5);
        solver.primal_solution().unwrap().validate().unwrap();
    }

    #[test]
    fn target_is_tracked() {
        let mut solver = solver();
        let goal = DVector::from_vec(vec![2.0, 0.0]);
        solver
            .set_target(TargetTrajectories::constant(0.0, goal, DVector::zeros(1)))
            .unwrap();
        solver.run(0.0, &DVector::from_vec(vec![2.0, 0.0]), 1.0).unwrap();
        let solution = solver.primal_solution().unwrap();
        for x in &solution.state_trajectory {
            assert_relative_eq!(x[0], 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn wrong_target_dimension_is_rejected() {
        let mut solver = solver();
        let err = solver
            .set_target(TargetTrajectories::constant(0.0, DVector::zeros(3), DVector::zeros(1)))
            .unwrap_err();
        assert_eq!(err, StructureError::mismatch("target state dimension", 2, 3));
    }

    #[test]
    fn wrong_initial_state_dimension_is_rejected() {
        let mut solver = solver();
        let err = solver.run(0.0, &DVector::zeros(3), 1.0).unwrap_err();
        assert!(matches!(err, SolveError::Structure(_)));
    }

    #[test]
    fn indefinite_input_hessian_fails() {
        let model = LinearQuadraticModel::new(
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            DMatrix::identity(2, 2),
            DMatrix::from_element(1, 1, -1.0),
            DMatrix::identity(2, 2),
        );
        let mut solver =
            DdpSolver::new(model, DdpSettings::default(), &MpcSettings::default()).unwrap();
        let err = solver.run(0.0, &x0(), 1.0).unwrap_err();
        assert!(matches!(err, SolveError::NotPositiveDefinite { .. }));
    }

    #[test]
    fn scaling_is_computed_with_a_pool() {
        let mut solver = solver().with_worker_pool(WorkerPool::new(2).unwrap());
        solver.run(0.0, &x0(), 0.5).unwrap();
        let scaling = solver.scaling().unwrap();
        let n = 50;
        assert_eq!(scaling.cost_row_sums.len(), 3 * n);
        assert_eq!(scaling.coupling_row_sums.len(), 2 * n);
        assert!(scaling.coupling_eigen_bound() >= 1.0);
    }

    #[test]
    fn post_event_indices_are_recorded() {
        let mut solver = solver();
        solver.set_mode_schedule(ModeSchedule::new(vec![0.25, 0.75], vec![0, 1, 0]).unwrap());
        solver.run(0.0, &x0(), 1.0).unwrap();
        assert_eq!(solver.nominal_post_event_indices[0], vec![25]);
        assert_eq!(solver.nominal_post_event_indices[1], vec![25]);
    }

    #[test]
    fn reset_clears_warm_start() {
        let mut solver = solver();
        solver.run(0.0, &x0(), 1.0).unwrap();
        solver.run(0.6, &x0(), 1.6).unwrap();
        solver.reset();
        assert_eq!(solver.rewind_counter(), 0);
        assert!(solver.partitioning_times().is_empty());
        assert!(solver.controllers().iter().all(LinearController::is_empty));
        assert!(solver.primal_solution().is_err());
    }

    #[test]
    fn non_positive_time_step_is_rejected() {
        for time_step in [0.0, -0.01, f64::NAN] {
            let settings = DdpSettings {
                time_step,
                ..DdpSettings::default()
            };
            let err = DdpSolver::new(
                LinearQuadraticModel::double_integrator(),
                settings,
                &MpcSettings::default(),
            )
            .err()
            .unwrap();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref field, .. } if field == "ddp.time_step"
            ));
        }
    }

    #[test]
    fn non_shrinking_line_search_is_rejected() {
        let settings = DdpSettings {
            line_search_contraction: 1.0,
            ..DdpSettings::default()
        };
        let err = DdpSolver::new(
            LinearQuadraticModel::double_integrator(),
            settings,
            &MpcSettings::default(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("ddp.line_search_contraction"));
    }

    #[test]
    fn zero_partitions_are_rejected() {
        let mpc = MpcSettings {
            num_partitions: 0,
            ..MpcSettings::default()
        };
        let result =
            DdpSolver::new(LinearQuadraticModel::double_integrator(), DdpSettings::default(), &mpc);
        assert!(result.is_err());
    }
}
