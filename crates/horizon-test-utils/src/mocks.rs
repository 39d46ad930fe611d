//! Mock solvers, publishers and hooks for pipeline tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use horizon_comm::{PolicyMessage, PolicyPublisher, TransportError};
use horizon_core::{
    CommandData, ControlLaw, ModeSchedule, Observation, PrimalSolution, SolveError,
    TargetTrajectories,
};
use horizon_mpc::{MpcSolver, PipelineHooks};
use nalgebra::{DMatrix, DVector};

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Ordered record of calls, shared between mocks.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

// ---------------------------------------------------------------------------
// ScriptedSolver
// ---------------------------------------------------------------------------

/// Solver whose "optimal" policy drives the state toward the target state
/// with a fixed gain over a unit horizon.
///
/// Solves listed in the failure script (by 0-based call index) fail with
/// [`SolveError::Failed`]. Every call is appended to the event log.
#[derive(Debug)]
pub struct ScriptedSolver {
    state_dim: usize,
    input_dim: usize,
    target: TargetTrajectories,
    mode_schedule: ModeSchedule,
    fail_on: HashSet<usize>,
    delay: Option<Duration>,
    calls: usize,
    last: Option<Observation>,
    log: EventLog,
}

impl ScriptedSolver {
    pub fn new(state_dim: usize, input_dim: usize) -> Self {
        Self {
            state_dim,
            input_dim,
            target: TargetTrajectories::constant(
                0.0,
                DVector::zeros(state_dim),
                DVector::zeros(input_dim),
            ),
            mode_schedule: ModeSchedule::default(),
            fail_on: HashSet::new(),
            delay: None,
            calls: 0,
            last: None,
            log: EventLog::new(),
        }
    }

    #[must_use]
    pub fn failing_on(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_on.extend(calls);
        self
    }

    /// Sleep for `delay` inside every solve.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    pub const fn calls(&self) -> usize {
        self.calls
    }

    pub const fn mode_schedule(&self) -> &ModeSchedule {
        &self.mode_schedule
    }
}

impl MpcSolver for ScriptedSolver {
    fn run_solve(&mut self, observation: &Observation) -> Result<(), SolveError> {
        let call = self.calls;
        self.calls += 1;
        self.log.push(format!("solve {}", observation.time));
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fail_on.contains(&call) {
            return Err(SolveError::Failed(format!("scripted failure on call {call}")));
        }
        self.last = Some(observation.clone());
        Ok(())
    }

    fn extract_policy(&mut self) -> Result<PrimalSolution, SolveError> {
        let obs = self
            .last
            .as_ref()
            .ok_or_else(|| SolveError::Failed("no successful solve".into()))?;
        let times = vec![obs.time, obs.time + 0.5, obs.time + 1.0];
        let goal = self.target.state_at(obs.time);
        let gain = DMatrix::from_fn(self.input_dim, self.state_dim, |i, j| {
            if i == j { -1.0 } else { 0.0 }
        });
        let bias = -&gain * &goal;
        let state_trajectory: Vec<_> = times.iter().map(|_| obs.state.clone()).collect();
        let input_trajectory: Vec<_> = state_trajectory
            .iter()
            .map(|x| &bias + &gain * x)
            .collect();
        Ok(PrimalSolution {
            time_trajectory: times.clone(),
            state_trajectory,
            input_trajectory,
            mode_schedule: self.mode_schedule.clone(),
            controller: ControlLaw::Linear {
                times,
                biases: vec![bias; 3],
                gains: vec![gain; 3],
            },
        })
    }

    fn extract_provenance(&self, observation: &Observation) -> CommandData {
        CommandData {
            observation: observation.clone(),
            target: self.target.clone(),
            mode_schedule: self.mode_schedule.clone(),
        }
    }

    fn adopt_target(&mut self, target: TargetTrajectories) -> Result<(), SolveError> {
        self.log.push("adopt_target");
        self.target = target;
        Ok(())
    }

    fn target(&self) -> &TargetTrajectories {
        &self.target
    }

    fn adopt_mode_schedule(&mut self, mode_schedule: ModeSchedule) -> Result<(), SolveError> {
        self.log.push("adopt_mode_schedule");
        self.mode_schedule = mode_schedule;
        Ok(())
    }

    fn reset(&mut self) {
        self.log.push("reset");
        self.last = None;
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Recorded {
    messages: Mutex<Vec<PolicyMessage>>,
    arrived: Condvar,
}

/// Publisher that keeps every emitted policy for inspection.
///
/// Clones share the same record, so a test keeps one clone while the
/// pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    recorded: Arc<Recorded>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PolicyMessage> {
        self.recorded.messages.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.recorded.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until at least `count` policies were published or `timeout`
    /// elapses. Returns whether the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(|messages| messages.len() >= count, timeout)
    }

    /// Block until `done` holds for the published policies or `timeout`
    /// elapses. Returns whether `done` was reached.
    pub fn wait_until(
        &self,
        mut done: impl FnMut(&[PolicyMessage]) -> bool,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut messages = self.recorded.messages.lock().unwrap();
        while !done(&messages) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            messages = self
                .recorded
                .arrived
                .wait_timeout(messages, remaining)
                .unwrap()
                .0;
        }
        true
    }
}

impl PolicyPublisher for RecordingPublisher {
    fn publish(&mut self, policy: PolicyMessage) -> Result<(), TransportError> {
        self.recorded.messages.lock().unwrap().push(policy);
        self.recorded.arrived.notify_all();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CountingHooks
// ---------------------------------------------------------------------------

/// Hooks that count their calls and optionally supply a mode schedule.
#[derive(Debug, Clone, Default)]
pub struct CountingHooks {
    init_calls: Arc<AtomicUsize>,
    initial_schedule: Option<ModeSchedule>,
    log: Option<EventLog>,
}

impl CountingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_initial_mode_schedule(mut self, mode_schedule: ModeSchedule) -> Self {
        self.initial_schedule = Some(mode_schedule);
        self
    }

    #[must_use]
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

impl PipelineHooks for CountingHooks {
    fn init_call(&mut self, observation: &Observation) {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(format!("init_call {}", observation.time));
        }
    }

    fn initial_mode_schedule(&mut self, _observation: &Observation) -> Option<ModeSchedule> {
        self.initial_schedule.clone()
    }
}
