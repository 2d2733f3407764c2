//! Command-line options.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, ScenarioConfig};
use crate::sim::policy::PolicyKind;

/// PV + battery dispatch simulator.
///
/// Without `--scenario` or `--preset` the `day` preset is used. Signals are
/// generated from the scenario unless `--signals` points at a CSV file.
#[derive(Debug, Parser)]
#[command(name = "pv-dispatch", version, about)]
pub struct Args {
    /// Load the scenario from a TOML file.
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (day, week, month).
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Read signals from a CSV file instead of generating them.
    #[arg(long, value_name = "PATH")]
    pub signals: Option<PathBuf>,

    /// Override the synthetic signal seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the dispatch policy.
    #[arg(long, value_enum)]
    pub policy: Option<PolicyKind>,

    /// Approximator rule base (TOML).
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Export the trajectory to CSV.
    #[arg(long, value_name = "PATH")]
    pub telemetry_out: Option<PathBuf>,

    /// Do not print per-step rows.
    #[arg(long, short)]
    pub quiet: bool,
}

impl Args {
    /// Loads the selected scenario and applies command-line overrides.
    ///
    /// The result is not validated yet.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the scenario file or preset cannot be loaded.
    pub fn scenario_config(&self) -> Result<ScenarioConfig, ConfigError> {
        let mut cfg = if let Some(path) = &self.scenario {
            ScenarioConfig::from_toml_file(path)?
        } else if let Some(name) = &self.preset {
            ScenarioConfig::from_preset(name)?
        } else {
            ScenarioConfig::day()
        };

        if let Some(seed) = self.seed {
            cfg.simulation.seed = seed;
        }
        if let Some(policy) = self.policy {
            cfg.simulation.policy = policy;
        }
        if let Some(model) = &self.model {
            cfg.approximator.model = Some(model.clone());
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("pv-dispatch").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_to_day_preset() {
        let args = parse(&[]).expect("parse");
        let cfg = args.scenario_config().expect("config");
        assert_eq!(cfg.simulation.days, 1);
        assert!(!args.quiet);
    }

    #[test]
    fn supports_preset_and_overrides() {
        let args = parse(&[
            "--preset",
            "week",
            "--seed",
            "7",
            "--policy",
            "approximator",
            "--model",
            "rules.toml",
            "-q",
        ])
        .expect("parse");
        let cfg = args.scenario_config().expect("config");
        assert_eq!(cfg.simulation.days, 7);
        assert_eq!(cfg.simulation.seed, 7);
        assert_eq!(cfg.simulation.policy, PolicyKind::Approximator);
        assert_eq!(cfg.approximator.model, Some(PathBuf::from("rules.toml")));
        assert!(args.quiet);
    }

    #[test]
    fn scenario_conflicts_with_preset() {
        assert!(parse(&["--scenario", "a.toml", "--preset", "day"]).is_err());
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(parse(&["--policy", "greedy"]).is_err());
    }

    #[test]
    fn unknown_preset_is_config_error() {
        let args = parse(&["--preset", "year"]).expect("parse");
        let err = args.scenario_config().expect_err("must fail");
        assert_eq!(err.field, "preset");
    }

    #[test]
    fn supports_output_paths() {
        let args = parse(&["--signals", "in.csv", "--telemetry-out", "out.csv"]).expect("parse");
        assert_eq!(args.signals, Some(PathBuf::from("in.csv")));
        assert_eq!(args.telemetry_out, Some(PathBuf::from("out.csv")));
    }
}
