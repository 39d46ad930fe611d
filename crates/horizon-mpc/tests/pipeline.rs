//! Concurrency scenarios of the policy pipeline.

use std::thread;
use std::time::Duration;

use horizon_core::{ModeSchedule, Observation, PipelineSettings, PrimalSolution, TargetTrajectories};
use horizon_mpc::{
    PipelineError, PipelineHandle, PipelineState, PolicyPipeline, SynchronizedModule,
};
use horizon_test_utils::{CountingHooks, EventLog, RecordingPublisher, ScriptedSolver};
use nalgebra::DVector;

const TIMEOUT: Duration = Duration::from_secs(5);

fn obs(t: f64) -> Observation {
    Observation::from_state(t, &[1.0, 0.0], 2)
}

fn target(x: f64) -> TargetTrajectories {
    TargetTrajectories::constant(0.0, DVector::from_vec(vec![x, 0.0]), DVector::zeros(2))
}

#[test]
fn one_observation_emits_one_policy_starting_at_zero() {
    let mut solver = ScriptedSolver::new(2, 2);
    let recorder = RecordingPublisher::new();
    {
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
        pipeline.launch(recorder.clone()).unwrap();
        pipeline.on_observation(&obs(0.0)).unwrap();
        assert!(recorder.wait_for(1, TIMEOUT));
        pipeline.shutdown();
    }
    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].time_trajectory[0], 0.0);
    assert!(messages[0].controller_is_updated);
    let solution = messages[0].primal_solution().unwrap();
    assert!(solution.controller.is_feedback());
}

#[test]
fn only_the_latest_policy_is_emitted_when_publisher_lags() {
    let mut solver = ScriptedSolver::new(2, 2);
    let recorder = RecordingPublisher::new();
    let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
    pipeline.on_observation(&obs(0.0)).unwrap();
    pipeline.on_observation(&obs(0.1)).unwrap();

    pipeline.launch(recorder.clone()).unwrap();
    assert!(recorder.wait_for(1, TIMEOUT));
    pipeline.shutdown();

    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].init_observation.time, 0.1);
    assert_eq!(messages[0].time_trajectory[0], 0.1);
}

#[test]
fn reset_runs_init_call_once_before_the_next_solve() {
    let log = EventLog::new();
    let mut solver = ScriptedSolver::new(2, 2).with_log(log.clone());
    let hooks = CountingHooks::new().with_log(log.clone());
    let recorder = RecordingPublisher::new();

    let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default())
        .with_hooks(hooks.clone());
    let handle = pipeline.handle();
    pipeline.launch(recorder.clone()).unwrap();

    pipeline.on_observation(&obs(0.0)).unwrap();
    assert_eq!(hooks.init_calls(), 1);

    handle.request_reset(target(3.0)).unwrap();
    handle.request_reset(target(3.0)).unwrap();
    assert_eq!(handle.state(), PipelineState::ResetPending);
    assert_eq!(hooks.init_calls(), 1);

    pipeline.on_observation(&obs(0.5)).unwrap();
    assert_eq!(hooks.init_calls(), 2);
    assert_eq!(handle.state(), PipelineState::Active);

    pipeline.on_observation(&obs(0.6)).unwrap();
    assert_eq!(hooks.init_calls(), 2);

    assert!(recorder.wait_until(
        |messages| messages
            .last()
            .is_some_and(|m| m.init_observation.time == 0.6),
        TIMEOUT
    ));
    pipeline.shutdown();

    assert_eq!(
        log.events(),
        vec![
            "init_call 0",
            "solve 0",
            "reset",
            "adopt_target",
            "init_call 0.5",
            "solve 0.5",
            "solve 0.6",
        ]
    );
    let last = recorder.messages().pop().unwrap();
    assert_eq!(last.target.states[0], vec![3.0, 0.0]);
    assert!(handle.reset_occurred());
}

/// Requests a reset from inside the first `pre_solve` it sees.
struct ResetBeforeFirstSolve {
    handle: PipelineHandle,
    fired: bool,
}

impl SynchronizedModule for ResetBeforeFirstSolve {
    fn pre_solve(&mut self, _time: f64, _state: &DVector<f64>, _target: &TargetTrajectories) {
        if !self.fired {
            self.fired = true;
            self.handle.request_reset(target(4.0)).unwrap();
        }
    }

    fn post_solve(&mut self, _solution: &PrimalSolution) {}
}

#[test]
fn reset_accepted_before_the_solve_skips_it() {
    let log = EventLog::new();
    let mut solver = ScriptedSolver::new(2, 2).with_log(log.clone());
    let recorder = RecordingPublisher::new();
    {
        let pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
        let handle = pipeline.handle();
        let mut pipeline = pipeline.with_module(ResetBeforeFirstSolve {
            handle: handle.clone(),
            fired: false,
        });
        pipeline.launch(recorder.clone()).unwrap();

        pipeline.on_observation(&obs(0.0)).unwrap();
        assert_eq!(handle.state(), PipelineState::ResetPending);
        assert!(pipeline.current_policy().is_none());
        assert!(!recorder.wait_for(1, Duration::from_millis(100)));

        pipeline.on_observation(&obs(0.1)).unwrap();
        assert_eq!(handle.state(), PipelineState::Active);
        assert!(recorder.wait_for(1, TIMEOUT));
        pipeline.shutdown();
    }
    assert_eq!(solver.calls(), 1);
    assert_eq!(log.events(), vec!["reset", "adopt_target", "solve 0.1"]);
    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].target.states[0], vec![4.0, 0.0]);
}

#[test]
fn failing_solve_leaves_current_and_publisher_untouched() {
    let mut solver = ScriptedSolver::new(2, 2).failing_on([1]);
    let recorder = RecordingPublisher::new();
    {
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
        pipeline.launch(recorder.clone()).unwrap();
        pipeline.on_observation(&obs(0.0)).unwrap();
        assert!(recorder.wait_for(1, TIMEOUT));

        let err = pipeline.on_observation(&obs(0.1)).unwrap_err();
        assert!(matches!(err, PipelineError::Solve(_)));
        let current = pipeline.current_policy().unwrap();
        assert_eq!(current.sequence, 1);
        assert_eq!(current.command.observation.time, 0.0);

        assert!(!recorder.wait_for(2, Duration::from_millis(100)));
        pipeline.shutdown();
    }
    assert_eq!(recorder.len(), 1);
    assert_eq!(solver.calls(), 2);
}

#[test]
fn failing_first_solve_publishes_nothing() {
    let mut solver = ScriptedSolver::new(2, 2).failing_on([0]);
    let recorder = RecordingPublisher::new();
    let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
    pipeline.launch(recorder.clone()).unwrap();
    assert!(pipeline.on_observation(&obs(0.0)).is_err());
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    assert!(pipeline.current_policy().is_none());
    assert!(!recorder.wait_for(1, Duration::from_millis(100)));
    pipeline.shutdown();
    assert!(recorder.is_empty());
}

#[test]
fn target_update_from_another_thread_applies_on_next_observation() {
    let log = EventLog::new();
    let mut solver = ScriptedSolver::new(2, 2).with_log(log.clone());
    let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
    let handle = pipeline.handle();

    pipeline.on_observation(&obs(0.0)).unwrap();
    thread::spawn(move || handle.update_target(target(2.0)).unwrap())
        .join()
        .unwrap();
    assert_eq!(log.count("adopt_target"), 0);

    pipeline.on_observation(&obs(0.1)).unwrap();
    assert_eq!(log.count("adopt_target"), 1);
    let current = pipeline.current_policy().unwrap();
    assert_eq!(current.command.target, target(2.0));
}

#[test]
fn mode_schedules_from_hook_and_handle_are_adopted() {
    let initial = ModeSchedule::new(vec![0.5], vec![0, 1]).unwrap();
    let updated = ModeSchedule::new(vec![0.7], vec![1, 2]).unwrap();
    let mut solver = ScriptedSolver::new(2, 2);
    {
        let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default())
            .with_hooks(CountingHooks::new().with_initial_mode_schedule(initial.clone()));
        pipeline.on_observation(&obs(0.0)).unwrap();
        assert_eq!(
            pipeline.current_policy().unwrap().command.mode_schedule,
            initial
        );

        pipeline.handle().update_mode_schedule(updated.clone()).unwrap();
        pipeline.on_observation(&obs(0.1)).unwrap();
        assert_eq!(
            pipeline.current_policy().unwrap().solution.mode_schedule,
            updated
        );
    }
    assert_eq!(solver.mode_schedule(), &updated);
}

#[test]
fn feedforward_setting_publishes_open_loop_inputs() {
    let mut solver = ScriptedSolver::new(2, 2);
    let recorder = RecordingPublisher::new();
    let settings = PipelineSettings {
        use_feedback_policy: false,
        ..PipelineSettings::default()
    };
    let mut pipeline = PolicyPipeline::new(&mut solver, settings);
    pipeline.launch(recorder.clone()).unwrap();
    pipeline.on_observation(&obs(0.0)).unwrap();
    assert!(recorder.wait_for(1, TIMEOUT));
    let message = recorder.messages().remove(0);
    assert!(!message.primal_solution().unwrap().controller.is_feedback());
}

#[test]
fn handle_shutdown_stops_an_idle_publisher() {
    let mut solver = ScriptedSolver::new(2, 2);
    let recorder = RecordingPublisher::new();
    let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
    pipeline.launch(recorder.clone()).unwrap();
    let handle = pipeline.handle();

    thread::spawn(move || handle.shutdown()).join().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Shutdown);
    assert!(matches!(
        pipeline.on_observation(&obs(0.0)),
        Err(PipelineError::Shutdown)
    ));
    // Joins the publisher, which must already be on its way out.
    pipeline.shutdown();
    assert!(recorder.is_empty());
}

#[test]
fn concurrent_updates_during_a_solve_loop() {
    let mut solver = ScriptedSolver::new(2, 2).with_delay(Duration::from_millis(1));
    let recorder = RecordingPublisher::new();
    let mut pipeline = PolicyPipeline::new(&mut solver, PipelineSettings::default());
    pipeline.launch(recorder.clone()).unwrap();
    let handle = pipeline.handle();

    let updater = thread::spawn(move || {
        for i in 0..50 {
            handle.update_target(target(f64::from(i))).unwrap();
            if i % 10 == 0 {
                handle.request_reset(target(f64::from(i))).unwrap();
            }
            thread::sleep(Duration::from_micros(200));
        }
    });

    let steps = 40;
    for k in 0..steps {
        pipeline.on_observation(&obs(f64::from(k) * 0.01)).unwrap();
    }
    updater.join().unwrap();
    // Applies any reset that was still pending and commits a final policy.
    let last_time = 1.0;
    pipeline.on_observation(&obs(last_time)).unwrap();

    assert!(recorder.wait_until(
        |messages| messages
            .last()
            .is_some_and(|m| m.init_observation.time == last_time),
        TIMEOUT
    ));
    pipeline.shutdown();

    let messages = recorder.messages();
    assert!(!messages.is_empty());
    assert!(messages.len() <= 41);
    // A policy may be re-emitted, but never one older than the last.
    assert!(
        messages
            .windows(2)
            .all(|w| w[0].init_observation.time <= w[1].init_observation.time)
    );
}
