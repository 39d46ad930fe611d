//! Linear interpolation over time-indexed sequences.
//!
//! Queries outside the time range clamp to the first or last sample.

use std::ops::{Add, Mul};

/// Locate `t` in `times`: the index of the left sample and the blend factor
/// towards the right sample.
///
/// Returns `None` for an empty sequence.
pub fn locate(times: &[f64], t: f64) -> Option<(usize, f64)> {
    let last = times.len().checked_sub(1)?;
    if last == 0 || t <= times[0] {
        return Some((0, 0.0));
    }
    if t >= times[last] {
        return Some((last, 0.0));
    }
    // First index with times[i] > t; the left sample is the one before it.
    let right = times.partition_point(|&s| s <= t);
    let left = right - 1;
    let span = times[right] - times[left];
    let alpha = if span > 0.0 {
        (t - times[left]) / span
    } else {
        0.0
    };
    Some((left, alpha))
}

/// Interpolate `values` (sampled at `times`) at `t`.
pub fn interpolate<T>(times: &[f64], values: &[T], t: f64) -> Option<T>
where
    T: Clone,
    for<'a> &'a T: Mul<f64, Output = T>,
    T: Add<T, Output = T>,
{
    let (left, alpha) = locate(times, t)?;
    let left_value = values.get(left)?;
    if alpha == 0.0 {
        return Some(left_value.clone());
    }
    let right_value = values.get(left + 1)?;
    Some(left_value * (1.0 - alpha) + right_value * alpha)
}
