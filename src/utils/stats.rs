// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Running statistics over a stream of samples.
//!
//! Used by the scheduler to estimate the time between steps, and by interfaces
//! that want to normalize a raw signal into the `-1..1` range.

/// Default cap on the effective sample count.
pub const DEFAULT_MAX_HORIZON: f64 = 10_000.0;

/// Count, mean and variance of a signal, updated one sample at a time.
///
/// Once `count` reaches `max_horizon` it stops growing, which turns the mean into
/// an exponential moving average that keeps adapting to drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    count: f64,
    mean: f64,
    variance: f64,
    max_horizon: f64,
}

impl RunningStats {
    pub fn new(max_horizon: f64) -> Self {
        Self {
            count: 0.0,
            mean: 0.0,
            variance: 0.0,
            max_horizon,
        }
    }

    /// Fold one sample in and return the updated mean.
    ///
    /// Non-finite results reset the estimate to zero.
    pub fn update(&mut self, value: f64) -> f64 {
        let n1 = self.count;
        let n2 = n1 + 1.0;
        let delta = value - self.mean;
        if n2 <= self.max_horizon {
            self.count = n2;
        }
        self.mean += delta / n2;
        self.variance = (self.variance * n1 + delta * (value - self.mean)) / n2;
        if !self.mean.is_finite() || !self.variance.is_finite() {
            self.count = 0.0;
            self.mean = 0.0;
            self.variance = 0.0;
        }
        self.mean
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn count(&self) -> f64 {
        self.count
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HORIZON)
    }
}

/// Rescale `value` so the signal has roughly `mean` and `stddev`, then clamp it to
/// `±max_magnitude`.
pub fn normalize(
    value: f64,
    stats: Option<&RunningStats>,
    mean: f64,
    stddev: f64,
    max_magnitude: f64,
) -> f64 {
    let value = match stats {
        Some(s) => {
            let spread = s.variance().max(0.0).sqrt().max(1e-6);
            (value - s.mean()) / spread * stddev + mean
        }
        None => value,
    };
    value.clamp(-max_magnitude, max_magnitude)
}
