//! Wall-clock statistics of repeated solves.

use std::time::{Duration, Instant};

/// Accumulates the duration of repeated intervals.
#[derive(Debug, Clone, Default)]
pub struct SolveTimer {
    started: Option<Instant>,
    num_intervals: u64,
    total: Duration,
    max: Duration,
    last: Duration,
}

impl SolveTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the running interval and return its length.
    ///
    /// Returns `None` without recording anything if no interval is running.
    pub fn end(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        self.record(elapsed);
        Some(elapsed)
    }

    fn record(&mut self, elapsed: Duration) {
        self.num_intervals += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
        self.last = elapsed;
    }

    pub const fn num_intervals(&self) -> u64 {
        self.num_intervals
    }

    pub const fn last(&self) -> Duration {
        self.last
    }

    pub const fn max(&self) -> Duration {
        self.max
    }

    pub fn average(&self) -> Duration {
        if self.num_intervals == 0 {
            return Duration::ZERO;
        }
        let n = u32::try_from(self.num_intervals).unwrap_or(u32::MAX);
        self.total / n
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_over_recorded_intervals() {
        let mut timer = SolveTimer::new();
        timer.record(Duration::from_millis(2));
        timer.record(Duration::from_millis(6));
        assert_eq!(timer.num_intervals(), 2);
        assert_eq!(timer.average(), Duration::from_millis(4));
        assert_eq!(timer.max(), Duration::from_millis(6));
        assert_eq!(timer.last(), Duration::from_millis(6));
    }

    #[test]
    fn end_without_start_records_nothing() {
        let mut timer = SolveTimer::new();
        assert_eq!(timer.end(), None);
        assert_eq!(timer.num_intervals(), 0);
        assert_eq!(timer.average(), Duration::ZERO);
    }

    #[test]
    fn start_end_records_one_interval() {
        let mut timer = SolveTimer::new();
        timer.start();
        let elapsed = timer.end().unwrap();
        assert_eq!(timer.num_intervals(), 1);
        assert_eq!(timer.last(), elapsed);
        timer.reset();
        assert_eq!(timer.num_intervals(), 0);
    }
}
