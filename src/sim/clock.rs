//! Time grid for the simulation: timestamps, step durations, and integration.

use serde::Deserialize;

use super::error::SimError;
use super::types::CalendarFeatures;

/// Rule used to turn instantaneous rates into running integrals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integration {
    /// Trapezoids between consecutive samples; totals cover `[t0, t_i]`.
    #[default]
    Trapezoidal,
    /// Left rectangles of width `dt_i`; totals include step `i`'s interval.
    Rectangular,
}

/// A strictly increasing sequence of timestamps in hours.
///
/// # Examples
///
/// ```
/// use pv_dispatch::sim::clock::TimeGrid;
///
/// let grid = TimeGrid::uniform(4, 1);
/// assert_eq!(grid.len(), 4);
/// assert_eq!(grid.dt(0), 6.0);
/// assert_eq!(grid.time(3), 18.0);
/// ```
#[derive(Debug, Clone)]
pub struct TimeGrid {
    times: Vec<f64>,
    fallback_dt_hours: f64,
}

impl TimeGrid {
    /// Creates a grid from explicit timestamps.
    ///
    /// # Arguments
    ///
    /// * `times` - Timestamps in hours, strictly increasing
    /// * `fallback_dt_hours` - Duration of the only step of a single-sample grid
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InputValidation`] if the grid is empty, contains a
    /// non-finite value, or is not strictly increasing, and
    /// [`SimError::InvalidTimestep`] if `fallback_dt_hours` is not positive.
    pub fn new(times: Vec<f64>, fallback_dt_hours: f64) -> Result<Self, SimError> {
        if times.is_empty() {
            return Err(SimError::input(0, "time_hours", "must not be empty"));
        }
        if !(fallback_dt_hours.is_finite() && fallback_dt_hours > 0.0) {
            return Err(SimError::InvalidTimestep(fallback_dt_hours));
        }
        for (i, t) in times.iter().enumerate() {
            if !t.is_finite() {
                return Err(SimError::input(i, "time_hours", format!("must be finite, got {t}")));
            }
            if i > 0 && *t <= times[i - 1] {
                return Err(SimError::input(
                    i,
                    "time_hours",
                    format!("must be strictly increasing ({} -> {t})", times[i - 1]),
                ));
            }
        }
        Ok(Self {
            times,
            fallback_dt_hours,
        })
    }

    /// Uniform grid of `steps_per_day * days` samples starting at hour 0.
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_day` or `days` is zero.
    pub fn uniform(steps_per_day: usize, days: usize) -> Self {
        assert!(steps_per_day > 0, "steps_per_day must be > 0");
        assert!(days > 0, "days must be > 0");
        let dt = 24.0 / steps_per_day as f64;
        Self {
            times: (0..steps_per_day * days).map(|i| i as f64 * dt).collect(),
            fallback_dt_hours: dt,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Timestamp of step `i` (hours).
    pub fn time(&self, i: usize) -> f64 {
        self.times[i]
    }

    /// Duration of step `i`: the gap to the next sample, or the previous gap
    /// for the last step.
    pub fn dt(&self, i: usize) -> f64 {
        let n = self.times.len();
        if i + 1 < n {
            self.times[i + 1] - self.times[i]
        } else if n >= 2 {
            self.times[n - 1] - self.times[n - 2]
        } else {
            self.fallback_dt_hours
        }
    }

    /// Durations of every step.
    pub fn step_durations(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.dt(i)).collect()
    }

    /// Calendar features of step `i`.
    pub fn calendar(&self, i: usize, start_weekday: u8) -> CalendarFeatures {
        CalendarFeatures::at(self.times[i], start_weekday)
    }

    /// Integrates a per-step rate series over the grid.
    ///
    /// # Panics
    ///
    /// Panics if `values` is not the same length as the grid.
    pub fn integrate(&self, values: &[f64], rule: Integration) -> f64 {
        assert_eq!(values.len(), self.len(), "series length must match grid");
        match rule {
            Integration::Trapezoidal => self
                .times
                .windows(2)
                .zip(values.windows(2))
                .map(|(t, v)| 0.5 * (v[0] + v[1]) * (t[1] - t[0]))
                .sum(),
            Integration::Rectangular => values
                .iter()
                .enumerate()
                .map(|(i, v)| v * self.dt(i))
                .sum(),
        }
    }
}
