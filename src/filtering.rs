//! Signal conditioning: median filtering, finite-difference derivatives,
//! noise-floor estimation, and the quasistatic / step-voltage trims.

use crate::error::{Error, Result};
use crate::types::PreparedData;
use std::collections::VecDeque;

const VOLTAGE_EPSILON: f64 = 1e-4;

/// Replace each interior point's velocity with the median of its surrounding
/// window; the first and last `(window-1)/2` points are dropped, not padded.
pub fn apply_median_filter(sequence: &[PreparedData], window: usize) -> Result<Vec<PreparedData>> {
    if window < 3 || window.is_multiple_of(2) {
        return Err(Error::InsufficientData(format!(
            "median filter window must be odd and >= 3, got {window}"
        )));
    }
    if sequence.len() < window {
        return Err(Error::InsufficientData(format!(
            "median filter needs at least {window} samples, got {}",
            sequence.len()
        )));
    }

    let half = (window - 1) / 2;
    let mut out = Vec::with_capacity(sequence.len() - (window - 1));
    for i in half..sequence.len() - half {
        let mut velocities: Vec<f64> = sequence[i - half..=i + half]
            .iter()
            .map(|p| p.velocity)
            .collect();
        velocities.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut point = sequence[i];
        point.velocity = velocities[half];
        out.push(point);
    }
    Ok(out)
}

/// Average standard deviation of `accessor` over every full centered window
/// of size `window`. Windows without a full complement of points at either
/// edge contribute nothing, matching the acceleration estimator's `s =
/// window/2` convention elsewhere in the pipeline.
pub fn get_noise_floor(sequence: &[PreparedData], window: usize, accessor: impl Fn(&PreparedData) -> f64) -> f64 {
    let half = window / 2;
    if sequence.len() <= 2 * half {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in half..sequence.len() - half {
        let values: Vec<f64> = sequence[i - half..=i + half].iter().map(&accessor).collect();
        sum += population_stddev(&values);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn population_stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Central finite-difference estimate of acceleration, using the symmetric
/// two-point formula over the actual sampled timestamps (not a fixed `h`):
/// `a_i = (v[i+s] - v[i-s]) / (t[i+s] - t[i-s])`, `s = window/2`.
///
/// Drops the first/last `s` points (no full stencil) and any point whose
/// acceleration evaluates to exactly zero (encoder-quantization artifact).
pub fn estimate_acceleration(run: &[PreparedData], window: usize) -> Vec<PreparedData> {
    let s = window / 2;
    if run.len() <= 2 * s {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(run.len());
    for i in s..run.len() - s {
        let dv = run[i + s].velocity - run[i - s].velocity;
        let dt = run[i + s].t - run[i - s].t;
        let a = dv / dt;
        if a == 0.0 {
            continue;
        }
        let mut point = run[i];
        point.acceleration = a;
        out.push(point);
    }
    out
}

/// Erase every point with `|velocity| < motionThreshold` or `|voltage| < ε`.
/// Operates in place, preserving the order of surviving points.
pub fn trim_quasistatic_data(run: &mut Vec<PreparedData>, motion_threshold: f64) {
    run.retain(|p| p.velocity.abs() >= motion_threshold && p.voltage.abs() >= VOLTAGE_EPSILON);
}

/// Result of trimming one step-voltage run.
#[derive(Clone, Copy, Debug)]
pub struct StepTrimOutcome {
    pub step_test_duration: f64,
    pub min_time: f64,
}

/// Trim a step (dynamic) run down to its useful acceleration transient.
///
/// 1. Locate the first index whose `|acceleration|` exceeds the noise floor.
/// 2. Locate the index of maximum `|acceleration|` in the surviving prefix;
///    retain through that point.
/// 3. Further truncate to `t <= first.t + min(stepTestDuration, maxTime)` if
///    `stepTestDuration > 0`, else set it to the run's observed duration.
/// 4. Report `minTime <- min(minTime, duration)`.
pub fn trim_step_voltage_data(
    run: &mut Vec<PreparedData>,
    window: usize,
    step_test_duration: f64,
    min_time: f64,
    max_time: f64,
) -> Result<StepTrimOutcome> {
    if run.is_empty() {
        return Err(Error::InsufficientData("step run is empty".into()));
    }

    let floor = get_noise_floor(run, window, |p| p.acceleration);
    let start = run
        .iter()
        .position(|p| p.acceleration.abs() > floor)
        .ok_or_else(|| Error::InsufficientData("no point exceeds the noise floor".into()))?;
    run.drain(0..start);
    if run.is_empty() {
        return Err(Error::InsufficientData("step run emptied by noise-floor trim".into()));
    }

    let peak = run
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.acceleration.abs().partial_cmp(&b.acceleration.abs()).unwrap())
        .map(|(idx, _)| idx)
        .unwrap();
    run.truncate(peak + 1);
    if run.is_empty() {
        return Err(Error::InsufficientData("step run emptied by peak trim".into()));
    }

    let duration = if step_test_duration > 0.0 {
        let horizon = run[0].t + step_test_duration.min(max_time);
        run.retain(|p| p.t <= horizon);
        if run.is_empty() {
            return Err(Error::InsufficientData("step run emptied by duration trim".into()));
        }
        step_test_duration
    } else {
        run.last().unwrap().t - run[0].t
    };

    Ok(StepTrimOutcome {
        step_test_duration: duration,
        min_time: min_time.min(run.last().unwrap().t - run[0].t),
    })
}

/// Closed-form central-difference stencil weights for the `derivative`-th
/// derivative on `n` equally-spaced, centered nodes, computed via Fornberg's
/// algorithm for generating finite-difference coefficients on arbitrary
/// grids, specialized to a uniform grid centered at zero.
fn central_difference_weights(derivative: usize, n: usize) -> Vec<f64> {
    assert!(n % 2 == 1, "stencil length must be odd");
    assert!(derivative < n, "derivative order must be smaller than stencil length");

    let half = (n as isize - 1) / 2;
    let nodes: Vec<f64> = (-half..=half).map(|k| k as f64).collect();
    let z = 0.0;

    // c[i][k]: weight of nodes[i] for the k-th derivative, built incrementally
    // (Fornberg 1988, "Generation of Finite Difference Formulas on Arbitrarily
    // Spaced Grids").
    let m = derivative;
    let mut c = vec![vec![0.0f64; m + 1]; n];
    c[0][0] = 1.0;
    let mut c1 = 1.0f64;
    let mut c4 = nodes[0] - z;

    for i in 1..n {
        let mn = m.min(i);
        let mut c2 = 1.0f64;
        let c5 = c4;
        c4 = nodes[i] - z;
        for j in 0..i {
            let c3 = nodes[i] - nodes[j];
            c2 *= c3;
            if j == i - 1 {
                for k in (1..=mn).rev() {
                    c[i][k] = c1 * (k as f64 * c[i - 1][k - 1] - c5 * c[i - 1][k]) / c2;
                }
                c[i][0] = -c1 * c5 * c[i - 1][0] / c2;
            }
            for k in (1..=mn).rev() {
                c[j][k] = (c4 * c[j][k] - k as f64 * c[j][k - 1]) / c3;
            }
            c[j][0] = c4 * c[j][0] / c3;
        }
        c1 = c2;
    }

    c.into_iter().map(|row| row[m]).collect()
}

/// Stateful central finite-difference filter producing the `D`-th derivative
/// of a uniformly-sampled stream, using the symmetric `N`-point stencil.
/// `N` must be odd. Order of accuracy is `O(h^(N-D))`. Each output corresponds
/// to the sample at the center of the current window, i.e. time `(k -
/// (N-1)/2) * h` for the `k`-th input sample.
pub struct CentralFiniteDifference<const D: usize, const N: usize> {
    h: f64,
    weights: Vec<f64>,
    buffer: VecDeque<f64>,
}

impl<const D: usize, const N: usize> CentralFiniteDifference<D, N> {
    pub fn new(h: f64) -> Self {
        let weights = central_difference_weights(D, N)
            .into_iter()
            .map(|w| w / h.powi(D as i32))
            .collect();
        Self {
            h,
            weights,
            buffer: VecDeque::with_capacity(N),
        }
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    /// Push one more sample; returns the derivative centered on the window
    /// once `N` samples have accumulated.
    pub fn process(&mut self, sample: f64) -> Option<f64> {
        self.buffer.push_back(sample);
        if self.buffer.len() > N {
            self.buffer.pop_front();
        }
        if self.buffer.len() < N {
            return None;
        }
        Some(self.buffer.iter().zip(self.weights.iter()).map(|(s, w)| s * w).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PreparedData;

    fn point(t: f64, voltage: f64, position: f64, velocity: f64) -> PreparedData {
        PreparedData::new(t, voltage, position, velocity)
    }

    #[test]
    fn median_filter_matches_worked_example() {
        let velocities = [0.0, 1.0, 10.0, 5.0, 3.0, 0.0, 1000.0, 7.0, 6.0, 5.0];
        let sequence: Vec<PreparedData> = velocities
            .iter()
            .enumerate()
            .map(|(i, v)| point(i as f64, 1.0, 0.0, *v))
            .collect();

        let filtered = apply_median_filter(&sequence, 3).unwrap();
        let got: Vec<f64> = filtered.iter().map(|p| p.velocity).collect();
        assert_eq!(got, vec![1.0, 5.0, 5.0, 3.0, 3.0, 7.0, 7.0, 6.0]);
    }

    #[test]
    fn median_filter_rejects_even_window() {
        let sequence = vec![point(0.0, 1.0, 0.0, 0.0); 5];
        assert!(apply_median_filter(&sequence, 4).is_err());
    }

    #[test]
    fn median_filter_rejects_short_sequence() {
        let sequence = vec![point(0.0, 1.0, 0.0, 0.0); 2];
        assert!(apply_median_filter(&sequence, 3).is_err());
    }

    #[test]
    fn quasistatic_trim_keeps_only_moving_points() {
        let mut run = vec![
            point(0.0, 1.0, 0.0, 0.05),
            point(1.0, 1.0, 0.0, 0.5),
            point(2.0, 0.0, 0.0, 0.5),
            point(3.0, 1.0, 0.0, -0.3),
        ];
        trim_quasistatic_data(&mut run, 0.2);
        assert_eq!(run.len(), 2);
        assert!(run.iter().all(|p| p.velocity.abs() >= 0.2));
    }

    #[test]
    fn step_trim_locates_transient_and_reports_duration() {
        // A quiet prefix, a clean acceleration transient peaking at index 5, then decay.
        let accel = [0.0, 0.01, 0.02, 0.5, 2.0, 4.0, 3.0, 1.5, 0.5, 0.01];
        let mut run: Vec<PreparedData> = accel
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let mut p = point(i as f64, 1.0, 0.0, 1.0);
                p.acceleration = *a;
                p
            })
            .collect();

        let outcome = trim_step_voltage_data(&mut run, 2, 0.0, f64::INFINITY, 9.0).unwrap();
        let ts: Vec<f64> = run.iter().map(|p| p.t).collect();
        assert_eq!(ts, vec![4.0, 5.0]);
        // stepTestDuration always equals last.t - first.t of the trimmed run.
        assert_eq!(outcome.step_test_duration, 1.0);
        assert_eq!(outcome.min_time, 1.0);
    }

    #[test]
    fn step_trim_truncates_to_explicit_duration() {
        // Monotonically rising acceleration: the peak is the run's last point, so
        // an explicit stepTestDuration does the truncating, not the peak search.
        let accel = [0.0, 0.01, 0.02, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0];
        let mut run: Vec<PreparedData> = accel
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let mut p = point(i as f64, 1.0, 0.0, 1.0);
                p.acceleration = *a;
                p
            })
            .collect();

        let outcome = trim_step_voltage_data(&mut run, 2, 2.0, f64::INFINITY, 9.0).unwrap();
        let ts: Vec<f64> = run.iter().map(|p| p.t).collect();
        assert_eq!(ts, vec![3.0, 4.0, 5.0]);
        assert_eq!(outcome.step_test_duration, 2.0);
    }

    #[test]
    fn acceleration_estimate_drops_edges_and_zero_points() {
        let velocities = [0.0, 1.0, 2.0, 2.0, 2.0, 5.0, 6.0];
        let run: Vec<PreparedData> = velocities
            .iter()
            .enumerate()
            .map(|(i, v)| point(i as f64, 1.0, 0.0, *v))
            .collect();
        let out = estimate_acceleration(&run, 2);
        // window 2 -> s=1, drops index 0 and 6; zero-acceleration midpoints removed.
        assert!(out.iter().all(|p| p.acceleration != 0.0));
        assert!(out.iter().all(|p| p.t > 0.0 && p.t < 6.0));
    }

    #[test]
    fn central_difference_first_derivative_matches_quadratic() {
        let h = 0.005;
        let mut filter = CentralFiniteDifference::<1, 3>::new(h);
        let f = |x: f64| x * x;
        let mut x = -20.0;
        let mut last = None;
        while x <= 20.0 {
            last = filter.process(f(x));
            x += h;
        }
        // Once warmed up, the center of the window trails the stream by one step.
        let center_x = x - h - h;
        if let Some(d) = last {
            approx::assert_abs_diff_eq!(d, 2.0 * center_x, epsilon = h.powi(2) * 10.0);
        }
    }

    #[test]
    fn central_difference_weights_match_textbook_stencils() {
        assert_eq!(central_difference_weights(1, 3), vec![-0.5, 0.0, 0.5]);
        let second = central_difference_weights(2, 3);
        approx::assert_abs_diff_eq!(second.as_slice(), [1.0, -2.0, 1.0].as_slice(), epsilon = 1e-9);
    }
}
