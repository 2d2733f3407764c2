//! Simulation driver: folds the dispatch policy and battery simulator over
//! the time grid and accumulates the trajectory.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::config::ConfigError;
use crate::signals::Signals;

use super::battery::{BatterySimulator, BatteryState};
use super::clock::{Integration, TimeGrid};
use super::error::SimError;
use super::policy::DispatchPolicy;
use super::power_balance::settle;
use super::trajectory::{FlowRates, Integrator, Trajectory};
use super::types::{Observation, StepRecord};

/// Cost and energy accounting settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettlementConfig {
    /// Fraction of the import price paid for exported energy, in `[0, 1]`.
    pub export_income_fraction: f64,
    /// Whether exports earn income at all.
    pub feed_in: bool,
    /// Integration rule for the running totals.
    pub integration: Integration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            export_income_fraction: 0.5,
            feed_in: true,
            integration: Integration::Trapezoidal,
        }
    }
}

impl SettlementConfig {
    /// Validates all fields and returns a list of errors prefixed with `settlement.`.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.export_income_fraction) {
            errors.push(ConfigError::new(
                "settlement.export_income_fraction",
                "must be in [0.0, 1.0]",
            ));
        }
        errors
    }
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub settlement: SettlementConfig,
    /// Weekday of hour 0 (0 = Monday).
    pub start_weekday: u8,
    /// Step duration used when the signals hold a single sample (hours).
    pub fallback_dt_hours: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settlement: SettlementConfig::default(),
            start_weekday: 0,
            fallback_dt_hours: 0.25,
        }
    }
}

/// Simulation driver.
///
/// Generic over `P: DispatchPolicy` for static dispatch. The engine itself
/// holds no run state: each call to [`run`](Self::run) owns its battery
/// state and returns a fresh [`Trajectory`].
#[derive(Debug, Clone)]
pub struct Engine<P: DispatchPolicy> {
    config: EngineConfig,
    battery: BatterySimulator,
    policy: P,
}

impl<P: DispatchPolicy> Engine<P> {
    /// Creates a new engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Driver configuration
    /// * `battery` - Battery simulator (parameters already validated)
    /// * `policy` - Dispatch policy
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Configuration`] if the settlement settings are
    /// invalid, or [`SimError::InvalidTimestep`] for a bad fallback duration.
    pub fn new(config: EngineConfig, battery: BatterySimulator, policy: P) -> Result<Self, SimError> {
        let errors = config.settlement.validate();
        if !errors.is_empty() {
            return Err(SimError::Configuration(errors));
        }
        if !(config.fallback_dt_hours.is_finite() && config.fallback_dt_hours > 0.0) {
            return Err(SimError::InvalidTimestep(config.fallback_dt_hours));
        }
        Ok(Self {
            config,
            battery,
            policy,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn battery(&self) -> &BatterySimulator {
        &self.battery
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Runs the whole horizon.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InputValidation`] before the first step if any
    /// signal is malformed. No partial trajectory is ever returned.
    pub fn run(&self, signals: &Signals, initial: BatteryState) -> Result<Trajectory, SimError> {
        self.run_cancellable(signals, initial, &AtomicBool::new(false))
    }

    /// Like [`run`](Self::run), checking `cancel` between steps.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Cancelled`] with the step index at which the flag
    /// was observed, in addition to the errors of [`run`](Self::run).
    pub fn run_cancellable(
        &self,
        signals: &Signals,
        initial: BatteryState,
        cancel: &AtomicBool,
    ) -> Result<Trajectory, SimError> {
        signals.validate()?;
        let grid = signals.time_grid(self.config.fallback_dt_hours)?;

        info!(
            policy = self.policy.name(),
            steps = grid.len(),
            hours = grid.time(grid.len() - 1) - grid.time(0) + grid.dt(grid.len() - 1),
            soc = initial.soc(),
            "starting simulation"
        );

        let initial_capacity_kwh = initial.capacity_kwh();
        let initial_soc = initial.soc();
        let mut state = initial;
        let mut integrator = Integrator::new(self.config.settlement.integration);
        let mut records = Vec::with_capacity(grid.len());

        for i in 0..grid.len() {
            if cancel.load(Ordering::Relaxed) {
                info!(step = i, "simulation cancelled");
                return Err(SimError::Cancelled(i));
            }
            records.push(self.step(i, &grid, signals, &mut state, &mut integrator)?);
        }

        let totals = integrator.totals();
        let trajectory = Trajectory::new(
            records,
            totals,
            self.policy.name(),
            initial_capacity_kwh,
            initial_soc,
        );
        info!(
            steps = trajectory.len(),
            final_soc = state.soc(),
            imported_kwh = totals.imported_kwh,
            exported_kwh = totals.exported_kwh,
            cost = totals.cost,
            truncations = trajectory.truncation_count(),
            fallbacks = trajectory.fallback_count(),
            "simulation finished"
        );
        Ok(trajectory)
    }

    fn step(
        &self,
        i: usize,
        grid: &TimeGrid,
        signals: &Signals,
        state: &mut BatteryState,
        integrator: &mut Integrator,
    ) -> Result<StepRecord, SimError> {
        let params = self.battery.params();
        let dt_hours = grid.dt(i);
        let time_hours = grid.time(i);
        let solar_kw = signals.solar_kw[i];
        let load_kw = signals.load_kw[i];
        let grid_available = signals.grid_available[i];
        let price = signals.effective_price(i);
        let calendar = grid.calendar(i, self.config.start_weekday);

        // (a) observation with the limits the battery can honor this step
        let limits = self.battery.feasible_limits(state, dt_hours);
        let obs = Observation {
            step: i,
            time_hours,
            solar_kw,
            load_kw,
            price,
            grid_available,
            battery_soc: state.soc(),
            min_soc: params.min_soc,
            max_soc: params.max_soc,
            max_charge_kw: limits.max_charge_kw,
            max_discharge_kw: limits.max_discharge_kw,
            calendar,
        };
        let soc_before = state.soc();

        // (b) policy
        let decision = self.policy.decide(&obs);

        // (c) battery
        let outcome = self.battery.step(state, decision.battery_action_kw, dt_hours)?;

        // (d) realized grid flow from the actual battery power
        let flows = settle(load_kw, solar_kw, outcome.actual_kw, grid_available);

        // (e) instantaneous cost and export income
        let settlement = &self.config.settlement;
        let instant_cost = (flows.import_kw * price).max(0.0);
        let instant_export_income = if settlement.feed_in {
            (flows.export_kw * price * settlement.export_income_fraction).max(0.0)
        } else {
            0.0
        };

        // (f) running integrals
        let totals = integrator.push(
            time_hours,
            dt_hours,
            FlowRates {
                generated_kw: solar_kw,
                consumed_kw: load_kw,
                charged_kw: outcome.actual_kw.max(0.0),
                discharged_kw: (-outcome.actual_kw).max(0.0),
                imported_kw: flows.import_kw,
                exported_kw: flows.export_kw,
                unserved_kw: flows.unserved_kw,
                curtailed_kw: flows.curtailed_kw,
                cost_rate: instant_cost,
                export_income_rate: instant_export_income,
            },
        );

        // (g) record
        let record = StepRecord {
            step: i,
            time_hours,
            dt_hours,
            calendar,
            solar_kw,
            load_kw,
            price,
            grid_available,
            soc_before,
            requested_battery_kw: decision.battery_action_kw,
            requested_grid_kw: decision.grid_action_kw,
            reason: decision.reason,
            explanation: decision.explanation,
            source: decision.source,
            signals: decision.signals,
            load_shift: decision.load_shift,
            grid_usage: decision.grid_usage,
            battery_kw: outcome.actual_kw,
            shortfall_kw: outcome.shortfall_kw,
            grid_import_kw: flows.import_kw,
            grid_export_kw: flows.export_kw,
            unserved_kw: flows.unserved_kw,
            curtailed_kw: flows.curtailed_kw,
            soc: state.soc(),
            capacity_kwh: state.capacity_kwh(),
            efficiency: state.efficiency(),
            voltage_v: state.voltage_v(),
            current_a: state.current_a(),
            instant_cost,
            instant_export_income,
            totals,
        };

        if record.truncated() {
            debug!(
                step = i,
                requested_kw = outcome.requested_kw,
                actual_kw = outcome.actual_kw,
                shortfall_kw = outcome.shortfall_kw,
                "battery request truncated"
            );
        }
        trace!(
            step = i,
            soc = record.soc,
            battery_kw = record.battery_kw,
            import_kw = record.grid_import_kw,
            export_kw = record.grid_export_kw,
            reason = %record.reason,
            "step"
        );

        Ok(record)
    }
}
