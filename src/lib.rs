//! Grid-tied PV + battery energy-dispatch simulator.

pub mod cli;
pub mod config;
/// CSV signal import and trajectory export.
pub mod io;
pub mod signals;
/// Dispatch policies, battery model, and the simulation driver.
pub mod sim;
