//! Move-based capture of a solver's working state.

use std::mem;

use horizon_core::{ModeSchedule, ModelData};
use nalgebra::{DMatrix, DVector};

use crate::controller::LinearController;
use crate::model::OcpModel;
use crate::solver::{DdpSolver, ValueFunctionSample};

/// Self-contained record of one [`DdpSolver`] iterate.
///
/// [`collect`](Self::collect) copies scalars, partition boundaries, the
/// controllers and the nominal trajectories, and *moves* the model data and
/// value-function trajectories out of the solver. Those buffers are rebuilt
/// by the solver's next iteration, so the solver is left with empty, reusable
/// buffers while the snapshot keeps the previous iterate alive.
///
/// A snapshot can be reused: every sequence is resized to the solver's
/// partition count on each collect.
#[derive(Clone, Debug)]
pub struct SolverSnapshot {
    pub init_time: f64,
    pub final_time: f64,
    pub init_state: DVector<f64>,

    pub init_active_partition: usize,
    pub final_active_partition: usize,
    pub num_partitions: usize,
    pub partitioning_times: Vec<f64>,

    pub rewind_counter: u64,

    pub mode_schedule: ModeSchedule,

    pub controllers: Vec<LinearController>,

    pub nominal_times: Vec<Vec<f64>>,
    pub nominal_post_event_indices: Vec<Vec<usize>>,
    pub nominal_states: Vec<Vec<DVector<f64>>>,
    pub nominal_inputs: Vec<Vec<DVector<f64>>>,

    pub model_data: Vec<Vec<ModelData>>,

    /// Terminal cost, interpreted as the heuristic value function.
    pub s_heuristics: f64,
    pub sv_heuristics: DVector<f64>,
    pub sm_heuristics: DMatrix<f64>,

    pub value_function: Vec<Vec<ValueFunctionSample>>,
}

impl Default for SolverSnapshot {
    fn default() -> Self {
        Self {
            init_time: 0.0,
            final_time: 0.0,
            init_state: DVector::zeros(0),
            init_active_partition: 0,
            final_active_partition: 0,
            num_partitions: 0,
            partitioning_times: Vec::new(),
            rewind_counter: 0,
            mode_schedule: ModeSchedule::default(),
            controllers: Vec::new(),
            nominal_times: Vec::new(),
            nominal_post_event_indices: Vec::new(),
            nominal_states: Vec::new(),
            nominal_inputs: Vec::new(),
            model_data: Vec::new(),
            s_heuristics: 0.0,
            sv_heuristics: DVector::zeros(0),
            sm_heuristics: DMatrix::zeros(0, 0),
            value_function: Vec::new(),
        }
    }
}

impl SolverSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the solver's current iterate.
    pub fn collect<M: OcpModel>(&mut self, solver: &mut DdpSolver<M>) {
        let num_partitions = solver.num_partitions;
        self.resize(num_partitions);

        self.init_time = solver.init_time;
        self.final_time = solver.final_time;
        self.init_state.clone_from(&solver.init_state);
        self.init_active_partition = solver.init_active_partition;
        self.final_active_partition = solver.final_active_partition;
        self.num_partitions = num_partitions;
        self.partitioning_times.clone_from(&solver.partitioning_times);
        self.rewind_counter = solver.rewind_counter;
        self.mode_schedule.clone_from(&solver.mode_schedule);

        self.controllers.clone_from(&solver.controllers);
        self.nominal_times.clone_from(&solver.nominal_times);
        self.nominal_post_event_indices
            .clone_from(&solver.nominal_post_event_indices);
        self.nominal_states.clone_from(&solver.nominal_states);
        self.nominal_inputs.clone_from(&solver.nominal_inputs);

        self.s_heuristics = solver.heuristics.f;
        self.sv_heuristics.clone_from(&solver.heuristics.dfdx);
        self.sm_heuristics.clone_from(&solver.heuristics.dfdxx);

        for (mine, theirs) in self.model_data.iter_mut().zip(&mut solver.model_data) {
            *mine = mem::take(theirs);
        }
        for (mine, theirs) in self
            .value_function
            .iter_mut()
            .zip(&mut solver.value_function)
        {
            *mine = mem::take(theirs);
        }
    }

    /// Number of time nodes over all partitions.
    pub fn num_nodes(&self) -> usize {
        self.nominal_times.iter().map(Vec::len).sum()
    }

    fn resize(&mut self, num_partitions: usize) {
        if self.num_partitions == num_partitions && self.model_data.len() == num_partitions {
            return;
        }
        self.controllers
            .resize_with(num_partitions, LinearController::default);
        self.nominal_times.resize_with(num_partitions, Vec::new);
        self.nominal_post_event_indices
            .resize_with(num_partitions, Vec::new);
        self.nominal_states.resize_with(num_partitions, Vec::new);
        self.nominal_inputs.resize_with(num_partitions, Vec::new);
        self.model_data.resize_with(num_partitions, Vec::new);
        self.value_function.resize_with(num_partitions, Vec::new);
    }
}
