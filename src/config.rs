//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::signals::{Signals, SyntheticConfig, SyntheticSignals};
use crate::sim::battery::{BatteryParams, BatterySimulator};
use crate::sim::clock::Integration;
use crate::sim::engine::{EngineConfig, SettlementConfig};
use crate::sim::error::SimError;
use crate::sim::policy::approximator::FeatureScales;
use crate::sim::policy::{PolicyKind, PolicyThresholds};

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the `day` preset. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation horizon, resolution and policy selection.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Battery physical parameters.
    #[serde(default)]
    pub battery: BatteryParams,
    /// Dispatch thresholds.
    #[serde(default)]
    pub policy: PolicyThresholds,
    /// Cost accounting.
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Synthetic signal generator parameters.
    #[serde(default)]
    pub signals: SyntheticConfig,
    /// Trained approximator parameters.
    #[serde(default)]
    pub approximator: ApproximatorConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of timesteps per simulated day (must be > 0).
    pub steps_per_day: usize,
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Weekday of hour 0 (0 = Monday ... 6 = Sunday).
    pub start_weekday: u8,
    /// Seed for the synthetic signal generator.
    pub seed: u64,
    /// Dispatch policy variant.
    pub policy: PolicyKind,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_day: 96,
            days: 1,
            start_weekday: 0,
            seed: 42,
            policy: PolicyKind::Rules,
        }
    }
}

impl SimulationConfig {
    /// Duration of one uniform timestep in hours.
    pub fn dt_hours(&self) -> f64 {
        24.0 / self.steps_per_day.max(1) as f64
    }

    /// Total number of simulation steps across all days.
    pub fn total_steps(&self) -> usize {
        self.steps_per_day * self.days
    }
}

/// Trained approximator parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApproximatorConfig {
    /// TOML file with the trained rule base; the built-in one when absent.
    pub model: Option<PathBuf>,
    /// Price mapped to feature value 1.0.
    pub price_scale: f64,
    /// Net demand magnitude mapped to the ends of the feature range (kW).
    pub net_demand_scale_kw: f64,
}

impl Default for ApproximatorConfig {
    fn default() -> Self {
        let scales = FeatureScales::default();
        Self {
            model: None,
            price_scale: scales.price_scale,
            net_demand_scale_kw: scales.net_demand_scale_kw,
        }
    }
}

impl ApproximatorConfig {
    pub fn feature_scales(&self) -> FeatureScales {
        FeatureScales {
            price_scale: self.price_scale,
            net_demand_scale_kw: self.net_demand_scale_kw,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"battery.min_soc"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// One day at 15-minute resolution.
    pub fn day() -> Self {
        Self::default()
    }

    /// One week at 15-minute resolution with a noisier price signal.
    pub fn week() -> Self {
        Self {
            simulation: SimulationConfig {
                days: 7,
                ..SimulationConfig::default()
            },
            signals: SyntheticConfig {
                price_noise_std: 2.0,
                ..SyntheticConfig::default()
            },
            ..Self::default()
        }
    }

    /// Thirty days at 5-minute resolution with a larger battery.
    pub fn month() -> Self {
        Self {
            simulation: SimulationConfig {
                steps_per_day: 288,
                days: 30,
                ..SimulationConfig::default()
            },
            battery: BatteryParams {
                capacity_kwh: 13.5,
                max_charge_rate_kw: 5.0,
                max_discharge_rate_kw: 5.0,
                ..BatteryParams::default()
            },
            signals: SyntheticConfig {
                pv_peak_kw: 6.0,
                ..SyntheticConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["day", "week", "month"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "day" => Ok(Self::day()),
            "week" => Ok(Self::week()),
            "month" => Ok(Self::month()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// A relative `approximator.model` path is resolved against the directory
    /// holding the scenario file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let (Some(model), Some(dir)) = (cfg.approximator.model.as_mut(), path.parent()) {
            if model.is_relative() {
                *model = dir.join(&*model);
            }
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.steps_per_day == 0 {
            errors.push(ConfigError::new("simulation.steps_per_day", "must be > 0"));
        }
        if s.days == 0 {
            errors.push(ConfigError::new("simulation.days", "must be > 0"));
        }
        if s.start_weekday > 6 {
            errors.push(ConfigError::new(
                "simulation.start_weekday",
                "must be in 0..=6 (0 = Monday)",
            ));
        }

        errors.extend(self.battery.validate());
        errors.extend(self.policy.validate());
        errors.extend(self.settlement.validate());
        errors.extend(self.signals.validate());

        let a = &self.approximator;
        if !(a.price_scale.is_finite() && a.price_scale > 0.0) {
            errors.push(ConfigError::new("approximator.price_scale", "must be > 0"));
        }
        if !(a.net_demand_scale_kw.is_finite() && a.net_demand_scale_kw > 0.0) {
            errors.push(ConfigError::new(
                "approximator.net_demand_scale_kw",
                "must be > 0",
            ));
        }

        errors
    }

    /// Returns `self` if valid, otherwise every violation at once.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Configuration`] when [`validate`](Self::validate) finds problems.
    pub fn validated(self) -> Result<Self, SimError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(SimError::Configuration(errors))
        }
    }

    /// Driver settings derived from this scenario.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            settlement: self.settlement.clone(),
            start_weekday: self.simulation.start_weekday,
            fallback_dt_hours: self.simulation.dt_hours(),
        }
    }

    /// Battery simulator for this scenario.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Configuration`] if the battery parameters are invalid.
    pub fn battery_simulator(&self) -> Result<BatterySimulator, SimError> {
        BatterySimulator::new(self.battery.clone())
    }

    /// Synthetic signals over this scenario's horizon, seeded from `simulation.seed`.
    pub fn synthetic_signals(&self) -> Signals {
        SyntheticSignals::new(self.signals.clone(), self.simulation.seed).generate(
            self.simulation.steps_per_day,
            self.simulation.days,
            self.simulation.start_weekday,
        )
    }

    /// Integration rule used for the running totals.
    pub fn integration(&self) -> Integration {
        self.settlement.integration
    }
}
