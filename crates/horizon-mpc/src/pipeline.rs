//! The observation → solve → policy pipeline.

use std::sync::Arc;

use horizon_comm::PolicyPublisher;
use horizon_core::{Observation, PipelineSettings, SolveError};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::hooks::{NoHooks, PipelineHooks, SynchronizedModule};
use crate::publisher::PublisherThread;
use crate::shared::{PipelineHandle, PipelineState, PublishedPolicy, Shared};
use crate::solver::MpcSolver;
use crate::timer::SolveTimer;

/// Turns observations into published policies.
///
/// [`on_observation`](Self::on_observation) runs the solve synchronously on
/// the caller's thread and commits the result into a shared "current"
/// policy. A publisher thread started by [`launch`](Self::launch) emits the
/// current policy whenever a new one is committed; if several solves finish
/// before it wakes, only the latest is emitted.
///
/// Resets, target updates and mode-schedule updates arrive through a
/// [`PipelineHandle`] from any thread and are applied at the start of the
/// next observation.
///
/// # Example
///
/// ```
/// use horizon_comm::ChannelPublisher;
/// use horizon_core::{DdpSettings, MpcSettings, Observation, PipelineSettings};
/// use horizon_ddp::{DdpSolver, LinearQuadraticModel};
/// use horizon_mpc::{DdpMpc, PolicyPipeline};
///
/// let settings = MpcSettings::default();
/// let ddp = DdpSolver::new(
///     LinearQuadraticModel::double_integrator(),
///     DdpSettings::default(),
///     &settings,
/// )
/// .unwrap();
/// let mut mpc = DdpMpc::new(ddp, &settings);
/// let (publisher, policies) = ChannelPublisher::channel();
///
/// let mut pipeline = PolicyPipeline::new(&mut mpc, PipelineSettings::default());
/// pipeline.launch(publisher).unwrap();
/// pipeline
///     .on_observation(&Observation::from_state(0.0, &[1.0, 0.0], 1))
///     .unwrap();
///
/// let policy = policies.recv().unwrap();
/// assert_eq!(policy.time_trajectory[0], 0.0);
/// ```
pub struct PolicyPipeline<'a, S: MpcSolver> {
    solver: &'a mut S,
    hooks: Box<dyn PipelineHooks + 'a>,
    modules: Vec<Box<dyn SynchronizedModule + 'a>>,
    settings: PipelineSettings,
    shared: Arc<Shared>,
    publisher: Option<PublisherThread>,
    initial_call: bool,
    sequence: u64,
    timer: SolveTimer,
}

impl<'a, S: MpcSolver> PolicyPipeline<'a, S> {
    pub fn new(solver: &'a mut S, settings: PipelineSettings) -> Self {
        Self {
            solver,
            hooks: Box::new(NoHooks),
            modules: Vec::new(),
            settings,
            shared: Arc::new(Shared::new()),
            publisher: None,
            initial_call: true,
            sequence: 0,
            timer: SolveTimer::new(),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: impl PipelineHooks + 'a) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    #[must_use]
    pub fn with_module(mut self, module: impl SynchronizedModule + 'a) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Start the publisher thread.
    pub fn launch(&mut self, publisher: impl PolicyPublisher + 'static) -> Result<(), PipelineError> {
        if self.shared.is_terminated() {
            return Err(PipelineError::Shutdown);
        }
        if self.publisher.is_some() {
            return Err(PipelineError::AlreadyLaunched);
        }
        let thread = PublisherThread::spawn(
            &self.settings.publisher_thread_name,
            Arc::clone(&self.shared),
            Box::new(publisher),
        )?;
        self.publisher = Some(thread);
        info!(thread = %self.settings.publisher_thread_name, "Pipeline launched");
        Ok(())
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn current_policy(&self) -> Option<Arc<PublishedPolicy>> {
        self.shared.current()
    }

    pub const fn timer(&self) -> &SolveTimer {
        &self.timer
    }

    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Solve from `observation` and commit the resulting policy.
    ///
    /// On error nothing is committed: the previously published policy stays
    /// current and the publisher is not woken.
    ///
    /// A reset requested after this cycle applied pending resets is left for
    /// the next observation. The cycle then returns `Ok(())` without solving,
    /// or, if the solve already ran, without committing its policy.
    pub fn on_observation(&mut self, observation: &Observation) -> Result<(), PipelineError> {
        if self.shared.is_terminated() {
            return Err(PipelineError::Shutdown);
        }
        observation
            .validate()
            .map_err(|e| SolveError::InvalidObservation(e.to_string()))?;

        // 1. Pending reset
        if self.shared.take_reset() {
            self.shared.clear_current();
            self.solver.reset();
            self.initial_call = true;
            info!(time = observation.time, "Reset applied");
        }

        // 2. Pending target and mode schedule
        if let Some(target) = self.shared.target.take() {
            self.solver.adopt_target(target)?;
            debug!("Target trajectories updated");
        }
        if let Some(mode_schedule) = self.shared.mode_schedule.take() {
            self.solver.adopt_mode_schedule(mode_schedule)?;
            debug!("Mode schedule updated");
        }

        // 3. First call
        if self.initial_call {
            self.hooks.init_call(observation);
            if let Some(mode_schedule) = self.hooks.initial_mode_schedule(observation) {
                self.solver.adopt_mode_schedule(mode_schedule)?;
            }
            self.initial_call = false;
        }

        // 4. Solve
        let target = self.solver.target();
        for module in &mut self.modules {
            module.pre_solve(observation.time, &observation.state, target);
        }
        if self.shared.reset_requested() {
            info!(time = observation.time, "Reset pending, solve skipped");
            return Ok(());
        }
        self.timer.start();
        let result = self.solver.run_solve(observation);
        let elapsed = self.timer.end().unwrap_or_default();
        if let Err(e) = result {
            warn!(time = observation.time, "Solve failed: {e}");
            return Err(e.into());
        }
        debug!(
            time = observation.time,
            solve_ms = elapsed.as_secs_f64() * 1e3,
            "Solve finished"
        );

        // 5. Extract into a fresh pair
        let mut solution = self.solver.extract_policy()?;
        if !self.settings.use_feedback_policy {
            solution = solution.into_feedforward();
        }
        let command = self.solver.extract_provenance(observation);
        let policy = Arc::new(PublishedPolicy {
            sequence: self.sequence + 1,
            solution,
            command,
        });

        // 6. Swap into "current"
        if !self.shared.commit_unless_reset(Arc::clone(&policy)) {
            info!(time = observation.time, "Reset arrived during the solve, policy discarded");
            return Ok(());
        }
        self.sequence = policy.sequence;

        // 7. Synchronized modules
        for module in &mut self.modules {
            module.post_solve(&policy.solution);
        }
        Ok(())
    }

    /// Stop and join the publisher thread.
    ///
    /// A policy committed but not yet emitted is dropped.
    pub fn shutdown(&mut self) {
        self.shared.terminate();
        if let Some(mut publisher) = self.publisher.take() {
            publisher.join();
        }
        if self.timer.num_intervals() > 0 {
            info!(
                solves = self.timer.num_intervals(),
                average_ms = self.timer.average().as_secs_f64() * 1e3,
                max_ms = self.timer.max().as_secs_f64() * 1e3,
                "Pipeline stopped"
            );
        }
    }
}

impl<S: MpcSolver> Drop for PolicyPipeline<'_, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_comm::ChannelPublisher;
    use horizon_core::{
        CommandData, ControlLaw, ModeSchedule, PrimalSolution, TargetTrajectories,
    };
    use nalgebra::DVector;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Solver that returns a two-sample constant policy at the observed state.
    struct ConstantSolver {
        target: TargetTrajectories,
        last: Option<Observation>,
        fail: bool,
        resets: usize,
        /// Requests a reset through this handle from inside the next solve.
        reset_during_solve: Option<PipelineHandle>,
    }

    impl ConstantSolver {
        fn new() -> Self {
            Self {
                target: TargetTrajectories::constant(0.0, DVector::zeros(1), DVector::zeros(1)),
                last: None,
                fail: false,
                resets: 0,
                reset_during_solve: None,
            }
        }
    }

    impl MpcSolver for ConstantSolver {
        fn run_solve(&mut self, observation: &Observation) -> Result<(), SolveError> {
            if self.fail {
                return Err(SolveError::Failed("scripted".into()));
            }
            self.last = Some(observation.clone());
            if let Some(handle) = self.reset_during_solve.take() {
                handle.request_reset(self.target.clone()).unwrap();
            }
            Ok(())
        }

        fn extract_policy(&mut self) -> Result<PrimalSolution, SolveError> {
            let obs = self
                .last
                .clone()
                .ok_or_else(|| SolveError::Failed("no solve".into()))?;
            let times = vec![obs.time, obs.time + 1.0];
            let inputs = vec![DVector::from_element(1, -obs.state[0]); 2];
            Ok(PrimalSolution {
                time_trajectory: times.clone(),
                state_trajectory: vec![obs.state.clone(); 2],
                input_trajectory: inputs.clone(),
                mode_schedule: ModeSchedule::default(),
                controller: ControlLaw::Linear {
                    times,
                    biases: inputs,
                    gains: vec![nalgebra::DMatrix::zeros(1, 1); 2],
                },
            })
        }

        fn extract_provenance(&self, observation: &Observation) -> CommandData {
            CommandData {
                observation: observation.clone(),
                target: self.target.clone(),
                mode_schedule: ModeSchedule::default(),
            }
        }

        fn adopt_target(&mut self, target: TargetTrajectories) -> Result<(), SolveError> {
            self.target = target;
            Ok(())
        }

        fn target(&self) -> &TargetTrajectories {
            &self.target
        }

        fn reset(&mut self) {
            self.resets += 1;
            self.last = None;
        }
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl SynchronizedModule for Recorder {
        fn pre_solve(&mut self, time: f64, _state: &DVector<f64>, _target: &TargetTrajectories) {
            self.0.lock().unwrap().push(format!("pre {time}"));
        }

        fn post_solve(&mut self, solution: &PrimalSolution) {
            let start = solution.start_time().unwrap();
            self.0.lock().unwrap().push(format!("post {start}"));
        }
    }

    fn obs(t: f64) -> Observation {
        Observation::from_state(t, &[1.0], 1)
    }

    #[test]
    fn observation_commits_a_policy() {
        let mut solver = ConstantSolver::new();
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        pipeline.on_observation(&obs(0.0)).unwrap();
        let current = pipeline.current_policy().unwrap();
        assert_eq!(current.sequence, 1);
        assert_eq!(current.solution.start_time(), Some(0.0));
        assert_eq!(pipeline.state(), PipelineState::Active);
        assert_eq!(pipeline.timer().num_intervals(), 1);
    }

    #[test]
    fn modules_run_around_the_solve() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut solver = ConstantSolver::new();
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default())
            .with_module(Recorder(Arc::clone(&log)));
        pipeline.on_observation(&obs(0.5)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["pre 0.5", "post 0.5"]);
    }

    #[test]
    fn failed_solve_keeps_current_policy() {
        let mut solver = ConstantSolver::new();
        {
            let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
            pipeline.on_observation(&obs(0.0)).unwrap();
            pipeline.solver.fail = true;
            let err = pipeline.on_observation(&obs(0.1)).unwrap_err();
            assert!(matches!(err, PipelineError::Solve(_)));
            assert_eq!(pipeline.current_policy().unwrap().sequence, 1);
        }
        assert_eq!(solver.last.unwrap().time, 0.0);
    }

    #[test]
    fn feedforward_setting_strips_the_gains() {
        let mut solver = ConstantSolver::new();
        let settings = PipelineSettings {
            use_feedback_policy: false,
            ..PipelineSettings::default()
        };
        let mut pipeline = PolicyPipeline::new(&mut solver, settings);
        pipeline.on_observation(&obs(0.0)).unwrap();
        assert!(!pipeline.current_policy().unwrap().solution.controller.is_feedback());
    }

    #[test]
    fn reset_clears_current_and_resets_solver() {
        let mut solver = ConstantSolver::new();
        {
            let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
            let handle = pipeline.handle();
            pipeline.on_observation(&obs(0.0)).unwrap();
            let target =
                TargetTrajectories::constant(0.0, DVector::from_element(1, 3.0), DVector::zeros(1));
            handle.request_reset(target.clone()).unwrap();
            assert_eq!(handle.state(), PipelineState::ResetPending);
            pipeline.on_observation(&obs(0.2)).unwrap();
            let current = handle.current_policy().unwrap();
            assert_eq!(current.command.target, target);
            assert_eq!(current.sequence, 2);
            assert!(handle.reset_occurred());
        }
        assert_eq!(solver.resets, 1);
    }

    #[test]
    fn reset_during_the_solve_discards_its_policy() {
        let mut solver = ConstantSolver::new();
        {
            let (publisher, policies) = ChannelPublisher::channel();
            let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
            pipeline.launch(publisher).unwrap();
            pipeline.on_observation(&obs(0.0)).unwrap();
            let first = policies.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(first.init_observation.time, 0.0);

            let handle = pipeline.handle();
            pipeline.solver.reset_during_solve = Some(handle);
            pipeline.on_observation(&obs(0.1)).unwrap();
            assert_eq!(pipeline.state(), PipelineState::ResetPending);
            assert_eq!(pipeline.current_policy().unwrap().sequence, 1);
            assert!(policies.recv_timeout(Duration::from_millis(100)).is_err());

            pipeline.on_observation(&obs(0.2)).unwrap();
            let current = pipeline.current_policy().unwrap();
            assert_eq!(current.sequence, 2);
            assert_eq!(current.command.observation.time, 0.2);
            assert_eq!(pipeline.state(), PipelineState::Active);
        }
        assert_eq!(solver.resets, 1);
    }

    #[test]
    fn invalid_observation_is_rejected_before_solving() {
        let mut solver = ConstantSolver::new();
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
        let err = pipeline
            .on_observation(&Observation::from_state(f64::NAN, &[0.0], 1))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Solve(SolveError::InvalidObservation(_))
        ));
        assert!(pipeline.current_policy().is_none());
        assert_eq!(pipeline.timer().num_intervals(), 0);
    }

    #[test]
    fn launch_twice_and_after_shutdown() {
        let mut solver = ConstantSolver::new();
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
        let (publisher, _rx) = ChannelPublisher::channel();
        pipeline.launch(publisher.clone()).unwrap();
        assert!(matches!(
            pipeline.launch(publisher.clone()),
            Err(PipelineError::AlreadyLaunched)
        ));
        pipeline.shutdown();
        assert!(matches!(pipeline.launch(publisher), Err(PipelineError::Shutdown)));
        assert!(matches!(
            pipeline.on_observation(&obs(0.0)),
            Err(PipelineError::Shutdown)
        ));
    }

    #[test]
    fn publisher_emits_committed_policy() {
        let mut solver = ConstantSolver::new();
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
        let (publisher, rx) = ChannelPublisher::channel();
        pipeline.launch(publisher).unwrap();
        pipeline.on_observation(&obs(0.0)).unwrap();
        let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(message.controller_is_updated);
        assert_eq!(message.time_trajectory, vec![0.0, 1.0]);
    }
}
