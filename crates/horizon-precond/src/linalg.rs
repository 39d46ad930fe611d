//! Process-wide thread budget for dense linear algebra.
//!
//! Solvers consult [`parallel_enabled`] before splitting per-stage matrix
//! work across threads. Kernels that already run one stage per worker pin the
//! budget to a single thread with [`SingleThreadedLinalg`] so the two levels of
//! parallelism do not multiply.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// `0` means automatic.
static NUM_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Set the linear-algebra thread count. `0` restores automatic selection.
pub fn set_num_threads(num_threads: usize) {
    NUM_THREADS.store(num_threads, Ordering::SeqCst);
}

/// Current linear-algebra thread count, `0` when automatic.
pub fn num_threads() -> usize {
    NUM_THREADS.load(Ordering::SeqCst)
}

/// Whether linear-algebra routines may use more than one thread.
pub fn parallel_enabled() -> bool {
    num_threads() != 1
}

#[derive(Debug)]
struct Pins {
    active: usize,
    restore_to: usize,
}

static PINS: Mutex<Pins> = Mutex::new(Pins {
    active: 0,
    restore_to: 0,
});

fn pins() -> MutexGuard<'static, Pins> {
    PINS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pins linear algebra to one thread while any guard is alive.
///
/// Guards may nest or overlap across threads; the setting seen by the first
/// guard is restored when the last one drops.
#[derive(Debug)]
#[must_use = "the thread count is restored as soon as the guard is dropped"]
pub struct SingleThreadedLinalg {
    _private: (),
}

impl SingleThreadedLinalg {
    pub fn pin() -> Self {
        let mut pins = pins();
        if pins.active == 0 {
            pins.restore_to = num_threads();
            set_num_threads(1);
        }
        pins.active += 1;
        Self { _private: () }
    }
}

impl Drop for SingleThreadedLinalg {
    fn drop(&mut self) {
        let mut pins = pins();
        pins.active = pins.active.saturating_sub(1);
        if pins.active == 0 {
            set_num_threads(pins.restore_to);
        }
    }
}

/// Serializes tests that observe the process-wide setting.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
