//! pv-dispatch entry point: CLI wiring and config-driven engine construction.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pv_dispatch::cli::Args;
use pv_dispatch::config::ScenarioConfig;
use pv_dispatch::io::export::export_csv;
use pv_dispatch::io::signals::read_signals_csv;
use pv_dispatch::signals::Signals;
use pv_dispatch::sim::engine::Engine;
use pv_dispatch::sim::kpi::KpiReport;
use pv_dispatch::sim::policy::{FuzzyModel, Policy, PolicyKind};

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let scenario = args
        .scenario_config()
        .context("failed to load scenario")?
        .validated()?;

    let signals = load_signals(&args, &scenario)?;
    let policy = build_policy(&scenario)?;

    let engine = Engine::new(scenario.engine_config(), scenario.battery_simulator()?, policy)?;
    let trajectory = engine.run(&signals, engine.battery().initial_state())?;

    if !args.quiet {
        for r in trajectory.records() {
            println!("{r}");
        }
    }
    println!("\n{}", KpiReport::from_trajectory(&trajectory));

    if let Some(path) = &args.telemetry_out {
        export_csv(&trajectory, path)
            .with_context(|| format!("failed to write CSV to {}", path.display()))?;
        info!(path = %path.display(), "telemetry written");
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_signals(args: &Args, scenario: &ScenarioConfig) -> Result<Signals> {
    match &args.signals {
        Some(path) => {
            let signals = read_signals_csv(path)
                .with_context(|| format!("failed to read signals from {}", path.display()))?;
            info!(path = %path.display(), steps = signals.len(), "signals loaded");
            Ok(signals)
        }
        None => Ok(scenario.synthetic_signals()),
    }
}

fn build_policy(scenario: &ScenarioConfig) -> Result<Policy> {
    let kind = scenario.simulation.policy;
    let model = match (&scenario.approximator.model, kind) {
        (Some(path), PolicyKind::Approximator) => Some(
            FuzzyModel::from_toml_file(path)
                .with_context(|| format!("failed to load model {}", path.display()))?,
        ),
        _ => None,
    };
    Ok(Policy::from_kind(
        kind,
        scenario.policy.clone(),
        model,
        scenario.approximator.feature_scales(),
    ))
}
