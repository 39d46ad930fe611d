//! State shared between the control loop, the publisher thread and handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use horizon_core::{CommandData, ModeSchedule, PrimalSolution, TargetTrajectories};
use tracing::info;

use crate::error::PipelineError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// PublishedPolicy
// ---------------------------------------------------------------------------

/// A solved policy together with the data it was computed from.
///
/// Immutable once committed; the publisher and handles share it by `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPolicy {
    /// Position of the solve in the pipeline's successful solves, from 1.
    pub sequence: u64,
    pub solution: PrimalSolution,
    pub command: CommandData,
}

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No policy has been published since launch or the last applied reset.
    Uninitialized,
    /// A policy is published.
    Active,
    /// A reset was requested and is applied on the next observation.
    ResetPending,
    Shutdown,
}

// ---------------------------------------------------------------------------
// PendingSlot
// ---------------------------------------------------------------------------

/// Latest value written by a producer, consumed at most once.
#[derive(Debug)]
pub(crate) struct PendingSlot<T> {
    value: Mutex<Option<T>>,
    dirty: AtomicBool,
}

impl<T> PendingSlot<T> {
    pub(crate) const fn new() -> Self {
        Self {
            value: Mutex::new(None),
            dirty: AtomicBool::new(false),
        }
    }

    pub(crate) fn store(&self, value: T) {
        *lock(&self.value) = Some(value);
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn take(&self) -> Option<T> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        lock(&self.value).take()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ResetFlags {
    requested: bool,
    occurred: bool,
}

#[derive(Debug)]
pub(crate) struct Shared {
    current: Mutex<Option<Arc<PublishedPolicy>>>,
    new_data: Mutex<bool>,
    wake: Condvar,
    terminate: AtomicBool,
    reset: Mutex<ResetFlags>,
    pub(crate) target: PendingSlot<TargetTrajectories>,
    pub(crate) mode_schedule: PendingSlot<ModeSchedule>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(None),
            new_data: Mutex::new(false),
            wake: Condvar::new(),
            terminate: AtomicBool::new(false),
            reset: Mutex::new(ResetFlags::default()),
            target: PendingSlot::new(),
            mode_schedule: PendingSlot::new(),
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<PublishedPolicy>> {
        lock(&self.current).clone()
    }

    /// Swap `policy` into "current" and wake the publisher.
    pub(crate) fn commit(&self, policy: Arc<PublishedPolicy>) {
        *lock(&self.current) = Some(policy);
        *lock(&self.new_data) = true;
        self.wake.notify_one();
    }

    /// Commit `policy` unless a reset is pending.
    ///
    /// The check and the swap happen under the reset lock, so a reset is
    /// either seen here or accepted after the policy is current.
    pub(crate) fn commit_unless_reset(&self, policy: Arc<PublishedPolicy>) -> bool {
        let flags = lock(&self.reset);
        if flags.requested {
            return false;
        }
        self.commit(policy);
        true
    }

    pub(crate) fn clear_current(&self) {
        *lock(&self.current) = None;
    }

    /// Block until new data is committed or shutdown is requested.
    ///
    /// Returns `false` on shutdown, even if new data is pending.
    pub(crate) fn wait_for_data(&self) -> bool {
        let guard = lock(&self.new_data);
        let mut ready = self
            .wake
            .wait_while(guard, |ready| !*ready && !self.is_terminated())
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_terminated() {
            return false;
        }
        *ready = false;
        true
    }

    pub(crate) fn has_new_data(&self) -> bool {
        *lock(&self.new_data)
    }

    pub(crate) fn terminate(&self) {
        self.terminate.store(true, Ordering::Release);
        // Taking the lock orders the flag before a waiter's predicate check.
        let _guard = lock(&self.new_data);
        self.wake.notify_all();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    pub(crate) fn request_reset(&self, target: TargetTrajectories) {
        let mut flags = lock(&self.reset);
        flags.requested = true;
        flags.occurred = true;
        self.target.store(target);
    }

    /// Consume a pending reset request.
    pub(crate) fn take_reset(&self) -> bool {
        std::mem::take(&mut lock(&self.reset).requested)
    }

    pub(crate) fn reset_requested(&self) -> bool {
        lock(&self.reset).requested
    }

    fn reset_occurred(&self) -> bool {
        lock(&self.reset).occurred
    }

    pub(crate) fn state(&self) -> PipelineState {
        if self.is_terminated() {
            PipelineState::Shutdown
        } else if self.reset_requested() {
            PipelineState::ResetPending
        } else if lock(&self.current).is_some() {
            PipelineState::Active
        } else {
            PipelineState::Uninitialized
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineHandle
// ---------------------------------------------------------------------------

/// Cloneable, thread-safe control surface of a running pipeline.
///
/// Requests made through a handle take effect at the start of the next
/// observation; none of them blocks on a solve.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    pub(crate) shared: Arc<Shared>,
}

impl PipelineHandle {
    /// Request a reset that adopts `target`.
    ///
    /// Requests made before the next observation collapse into one; the
    /// last target wins.
    pub fn request_reset(&self, target: TargetTrajectories) -> Result<(), PipelineError> {
        self.ensure_running()?;
        self.shared.request_reset(target);
        info!("Reset requested");
        Ok(())
    }

    /// Replace the tracked target from the next solve on.
    pub fn update_target(&self, target: TargetTrajectories) -> Result<(), PipelineError> {
        self.ensure_running()?;
        self.shared.target.store(target);
        Ok(())
    }

    pub fn update_mode_schedule(&self, mode_schedule: ModeSchedule) -> Result<(), PipelineError> {
        self.ensure_running()?;
        self.shared.mode_schedule.store(mode_schedule);
        Ok(())
    }

    /// Stop the publisher. Further observations fail with
    /// [`PipelineError::Shutdown`].
    pub fn shutdown(&self) {
        if !self.shared.is_terminated() {
            info!("Pipeline shutdown requested");
        }
        self.shared.terminate();
    }

    /// The last committed policy, if any.
    pub fn current_policy(&self) -> Option<Arc<PublishedPolicy>> {
        self.shared.current()
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Whether a reset has been requested at least once.
    pub fn reset_occurred(&self) -> bool {
        self.shared.reset_occurred()
    }

    pub fn target_update_pending(&self) -> bool {
        self.shared.target.is_dirty()
    }

    fn ensure_running(&self) -> Result<(), PipelineError> {
        if self.shared.is_terminated() {
            return Err(PipelineError::Shutdown);
        }
        Ok(())
    }
}
