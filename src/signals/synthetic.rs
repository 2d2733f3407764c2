//! Seeded synthetic PV, load, and price profiles.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;

use super::Signals;
use crate::config::ConfigError;
use crate::sim::clock::TimeGrid;

/// Scheduled grid outage on one simulated day.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutageWindow {
    /// Day index (0 = first simulated day).
    pub day: usize,
    /// Start hour of day, inclusive.
    pub start_hour: f64,
    /// End hour of day, exclusive.
    pub end_hour: f64,
}

impl OutageWindow {
    fn contains(&self, day: usize, hour: f64) -> bool {
        day == self.day && hour >= self.start_hour && hour < self.end_hour
    }
}

/// Parameters of the synthetic profiles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticConfig {
    /// PV peak output under a clear sky (kW).
    pub pv_peak_kw: f64,
    pub sunrise_hour: f64,
    pub sunset_hour: f64,
    /// Multiplicative PV noise per step (fraction of output).
    pub pv_noise_std: f64,
    /// Per-day cloud attenuation spread (fraction of output).
    pub cloudiness_std: f64,
    /// Mean load (kW).
    pub load_base_kw: f64,
    /// Daily load swing (kW).
    pub load_amp_kw: f64,
    pub load_peak_hour: f64,
    /// Additive load noise (kW).
    pub load_noise_std: f64,
    /// Mean price per kWh.
    pub price_base: f64,
    /// Daily price swing.
    pub price_amp: f64,
    pub price_peak_hour: f64,
    /// Additive price noise.
    pub price_noise_std: f64,
    /// Price multiplier on Saturdays and Sundays.
    pub weekend_price_factor: f64,
    /// Grid outages.
    pub outages: Vec<OutageWindow>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            pv_peak_kw: 5.0,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            pv_noise_std: 0.05,
            cloudiness_std: 0.15,
            load_base_kw: 1.2,
            load_amp_kw: 0.6,
            load_peak_hour: 19.0,
            load_noise_std: 0.05,
            price_base: 12.0,
            price_amp: 10.0,
            price_peak_hour: 19.0,
            price_noise_std: 1.0,
            weekend_price_factor: 0.8,
            outages: Vec::new(),
        }
    }
}

impl SyntheticConfig {
    /// Validates all fields and returns a list of errors prefixed with `signals.`.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("signals.pv_peak_kw", self.pv_peak_kw),
            ("signals.pv_noise_std", self.pv_noise_std),
            ("signals.cloudiness_std", self.cloudiness_std),
            ("signals.load_base_kw", self.load_base_kw),
            ("signals.load_amp_kw", self.load_amp_kw),
            ("signals.load_noise_std", self.load_noise_std),
            ("signals.price_base", self.price_base),
            ("signals.price_amp", self.price_amp),
            ("signals.price_noise_std", self.price_noise_std),
            ("signals.weekend_price_factor", self.weekend_price_factor),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ConfigError::new(field, "must be finite and >= 0"));
            }
        }
        if !(0.0 <= self.sunrise_hour && self.sunrise_hour < self.sunset_hour && self.sunset_hour <= 24.0)
        {
            errors.push(ConfigError::new(
                "signals.sunrise_hour",
                "must satisfy 0 <= sunrise_hour < sunset_hour <= 24",
            ));
        }
        for (field, value) in [
            ("signals.load_peak_hour", self.load_peak_hour),
            ("signals.price_peak_hour", self.price_peak_hour),
        ] {
            if !(0.0..24.0).contains(&value) {
                errors.push(ConfigError::new(field, "must be in [0, 24)"));
            }
        }
        for (i, w) in self.outages.iter().enumerate() {
            if !(0.0 <= w.start_hour && w.start_hour < w.end_hour && w.end_hour <= 24.0) {
                errors.push(ConfigError::new(
                    format!("signals.outages[{i}]"),
                    "must satisfy 0 <= start_hour < end_hour <= 24",
                ));
            }
        }
        errors
    }
}

/// Seeded generator for [`Signals`].
///
/// The same configuration and seed always produce the same signals.
#[derive(Debug, Clone)]
pub struct SyntheticSignals {
    config: SyntheticConfig,
    seed: u64,
}

impl SyntheticSignals {
    pub fn new(config: SyntheticConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// Generates `steps_per_day * days` samples on a uniform grid.
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_day` or `days` is zero.
    pub fn generate(&self, steps_per_day: usize, days: usize, start_weekday: u8) -> Signals {
        let c = &self.config;
        let grid = TimeGrid::uniform(steps_per_day, days);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = grid.len();

        let mut signals = Signals {
            time_hours: grid.times().to_vec(),
            solar_kw: Vec::with_capacity(n),
            load_kw: Vec::with_capacity(n),
            price: Vec::with_capacity(n),
            grid_available: Vec::with_capacity(n),
        };

        let mut cloud = 1.0;
        for i in 0..n {
            let cal = grid.calendar(i, start_weekday);
            let hour = cal.hour_of_day;
            if i % steps_per_day == 0 {
                cloud = (1.0 - gaussian_noise(&mut rng, c.cloudiness_std).abs()).clamp(0.0, 1.0);
            }

            let pv = c.pv_peak_kw * daylight_frac(hour, c.sunrise_hour, c.sunset_hour) * cloud;
            let pv = (pv * (1.0 + gaussian_noise(&mut rng, c.pv_noise_std))).max(0.0);

            let load = c.load_base_kw
                + c.load_amp_kw * daily_cosine(hour, c.load_peak_hour)
                + gaussian_noise(&mut rng, c.load_noise_std);

            let weekend = if cal.is_weekend { c.weekend_price_factor } else { 1.0 };
            let price = (c.price_base + c.price_amp * daily_cosine(hour, c.price_peak_hour)) * weekend
                + gaussian_noise(&mut rng, c.price_noise_std);

            let available = !c.outages.iter().any(|w| w.contains(cal.day_index, hour));

            signals.solar_kw.push(pv);
            signals.load_kw.push(load.max(0.0));
            signals.price.push(price.max(0.0));
            signals.grid_available.push(available);
        }
        signals
    }
}

/// Half-sine daylight fraction: 0 outside `[sunrise, sunset)`, 1 at solar noon.
fn daylight_frac(hour: f64, sunrise: f64, sunset: f64) -> f64 {
    if hour < sunrise || hour >= sunset {
        return 0.0;
    }
    (PI * (hour - sunrise) / (sunset - sunrise)).sin()
}

/// Cosine over the day peaking at `peak_hour`, in `[-1, 1]`.
fn daily_cosine(hour: f64, peak_hour: f64) -> f64 {
    (2.0 * PI * (hour - peak_hour) / 24.0).cos()
}

/// Gaussian noise via the Box-Muller transform.
fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos() * std_dev
}
