//! Time-aligned input signals for a simulation run.

pub mod synthetic;

pub use synthetic::{OutageWindow, SyntheticConfig, SyntheticSignals};

use crate::sim::clock::TimeGrid;
use crate::sim::error::SimError;

/// Generation, demand, price, and grid availability on a shared time grid.
///
/// All series must have the same length. `price` may hold any value at
/// steps where the grid is unavailable; it is treated as zero there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    /// Timestamps in hours, strictly increasing.
    pub time_hours: Vec<f64>,
    /// PV generation (kW, >= 0).
    pub solar_kw: Vec<f64>,
    /// Load demand (kW, >= 0).
    pub load_kw: Vec<f64>,
    /// Grid price per kWh (>= 0 where the grid is available).
    pub price: Vec<f64>,
    /// Grid availability.
    pub grid_available: Vec<bool>,
}

impl Signals {
    /// Signals on a uniform grid starting at hour 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use pv_dispatch::signals::Signals;
    ///
    /// let s = Signals::uniform(0.5, vec![0.0, 1.0], vec![2.0, 2.0], vec![10.0, 10.0], vec![true, true]);
    /// assert_eq!(s.time_hours, vec![0.0, 0.5]);
    /// assert!(s.validate().is_ok());
    /// ```
    pub fn uniform(
        dt_hours: f64,
        solar_kw: Vec<f64>,
        load_kw: Vec<f64>,
        price: Vec<f64>,
        grid_available: Vec<bool>,
    ) -> Self {
        let time_hours = (0..solar_kw.len()).map(|i| i as f64 * dt_hours).collect();
        Self {
            time_hours,
            solar_kw,
            load_kw,
            price,
            grid_available,
        }
    }

    pub fn len(&self) -> usize {
        self.time_hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_hours.is_empty()
    }

    /// Price seen by the policy and the settlement at step `i`.
    pub fn effective_price(&self, i: usize) -> f64 {
        if self.grid_available[i] {
            self.price[i]
        } else {
            0.0
        }
    }

    /// Checks every sample.
    ///
    /// # Errors
    ///
    /// Returns the first [`SimError::InputValidation`] found: empty or
    /// mismatched series, non-finite or negative power, a non-finite or
    /// negative price while the grid is available, or a time grid that is
    /// not strictly increasing.
    pub fn validate(&self) -> Result<(), SimError> {
        let n = self.len();
        if n == 0 {
            return Err(SimError::input(0, "time_hours", "must not be empty"));
        }
        for (field, len) in [
            ("solar_kw", self.solar_kw.len()),
            ("load_kw", self.load_kw.len()),
            ("price", self.price.len()),
            ("grid_available", self.grid_available.len()),
        ] {
            if len != n {
                return Err(SimError::input(
                    0,
                    field,
                    format!("has {len} samples, time grid has {n}"),
                ));
            }
        }

        for i in 0..n {
            check_power(i, "solar_kw", self.solar_kw[i])?;
            check_power(i, "load_kw", self.load_kw[i])?;
            let price = self.price[i];
            if self.grid_available[i] && !(price.is_finite() && price >= 0.0) {
                return Err(SimError::input(
                    i,
                    "price",
                    format!("must be finite and >= 0 while the grid is available, got {price}"),
                ));
            }
        }

        TimeGrid::new(self.time_hours.clone(), 1.0).map(|_| ())
    }

    /// Time grid of these signals.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InputValidation`] if the timestamps are invalid.
    pub fn time_grid(&self, fallback_dt_hours: f64) -> Result<TimeGrid, SimError> {
        TimeGrid::new(self.time_hours.clone(), fallback_dt_hours)
    }
}

fn check_power(step: usize, field: &'static str, value: f64) -> Result<(), SimError> {
    if !value.is_finite() {
        return Err(SimError::input(step, field, format!("must be finite, got {value}")));
    }
    if value < 0.0 {
        return Err(SimError::input(step, field, format!("must be >= 0, got {value}")));
    }
    Ok(())
}
