//! Dynamic stage partitioning.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out stage indices `0..len` to concurrent workers, each index exactly
/// once.
///
/// Workers loop on [`claim`](Self::claim) until it returns `None`, so fast
/// workers naturally take more stages than slow ones.
#[derive(Debug)]
pub struct StageQueue {
    next: AtomicUsize,
    len: usize,
}

impl StageQueue {
    pub const fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
        }
    }

    /// Claim the next unprocessed stage.
    pub fn claim(&self) -> Option<usize> {
        let k = self.next.fetch_add(1, Ordering::Relaxed);
        (k < self.len).then_some(k)
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}
