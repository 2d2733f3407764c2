//! Error taxonomy for the dispatch simulator.

use thiserror::Error;

use crate::config::ConfigError;

/// Fatal errors raised by the simulation core.
///
/// Step-local conditions (approximator fallback, rate/headroom truncation)
/// are not errors; they are recorded on each [`StepRecord`](super::types::StepRecord).
#[derive(Debug, Error)]
pub enum SimError {
    /// A signal value or the time grid is malformed.
    #[error("invalid input at step {step}: {field} {message}")]
    InputValidation {
        /// Offending step index (0 for whole-series problems).
        step: usize,
        /// Signal or field name.
        field: &'static str,
        /// Human-readable constraint description.
        message: String,
    },

    /// One or more configuration values are outside admissible ranges.
    #[error("invalid configuration: {}", join_config_errors(.0))]
    Configuration(Vec<ConfigError>),

    /// The battery was stepped with a non-positive or non-finite duration.
    #[error("timestep must be finite and > 0 hours, got {0}")]
    InvalidTimestep(f64),

    /// The run was cancelled between steps.
    #[error("simulation cancelled at step {0}")]
    Cancelled(usize),

    /// The approximator model could not be loaded.
    #[error("approximator model error: {0}")]
    Model(String),
}

impl SimError {
    pub(crate) fn input(step: usize, field: &'static str, message: impl Into<String>) -> Self {
        Self::InputValidation {
            step,
            field,
            message: message.into(),
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(vec![err])
    }
}

fn join_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
