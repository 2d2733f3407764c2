//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use pv_dispatch::config::ScenarioConfig;
use pv_dispatch::signals::Signals;
use pv_dispatch::sim::battery::{BatteryParams, BatterySimulator};
use pv_dispatch::sim::engine::{Engine, EngineConfig};
use pv_dispatch::sim::policy::{FeatureScales, Policy, PolicyKind, PolicyThresholds};
use pv_dispatch::sim::trajectory::Trajectory;
use pv_dispatch::sim::types::StepRecord;

/// Default battery (10 kWh, 50% SOC, 0.1..0.95, 3 kW both ways, 95% efficiency).
pub fn default_battery() -> BatteryParams {
    BatteryParams::default()
}

/// Engine with the given battery and policy variant and default thresholds.
pub fn engine(params: BatteryParams, kind: PolicyKind) -> Engine<Policy> {
    let policy = Policy::from_kind(
        kind,
        PolicyThresholds::default(),
        None,
        FeatureScales::default(),
    );
    Engine::new(
        EngineConfig::default(),
        BatterySimulator::new(params).expect("valid battery"),
        policy,
    )
    .expect("valid engine")
}

/// `n` identical samples at 15-minute resolution.
pub fn constant_signals(n: usize, solar_kw: f64, load_kw: f64, price: f64) -> Signals {
    Signals::uniform(
        0.25,
        vec![solar_kw; n],
        vec![load_kw; n],
        vec![price; n],
        vec![true; n],
    )
}

/// Runs a single rule-policy step from an explicit SOC.
pub fn single_step(
    params: BatteryParams,
    soc: f64,
    solar_kw: f64,
    load_kw: f64,
    price: f64,
) -> StepRecord {
    let engine = engine(params, PolicyKind::Rules);
    let initial = engine.battery().state_at_soc(soc);
    let trajectory = engine
        .run(&constant_signals(1, solar_kw, load_kw, price), initial)
        .expect("run");
    trajectory.records()[0].clone()
}

/// Runs a scenario end to end with its synthetic signals.
pub fn run_scenario(cfg: &ScenarioConfig) -> Trajectory {
    let cfg = cfg.clone().validated().expect("valid scenario");
    let policy = Policy::from_kind(
        cfg.simulation.policy,
        cfg.policy.clone(),
        None,
        cfg.approximator.feature_scales(),
    );
    let engine = Engine::new(
        cfg.engine_config(),
        cfg.battery_simulator().expect("valid battery"),
        policy,
    )
    .expect("valid engine");
    engine
        .run(&cfg.synthetic_signals(), engine.battery().initial_state())
        .expect("run")
}

/// Week preset with a grid outage on the third day.
pub fn week_with_outage(kind: PolicyKind) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::week();
    cfg.simulation.policy = kind;
    cfg.signals.outages = vec![pv_dispatch::signals::OutageWindow {
        day: 2,
        start_hour: 17.0,
        end_hour: 21.0,
    }];
    cfg
}
