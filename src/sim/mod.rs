/// Battery state of charge, degradation, and rate limiting.
pub mod battery;
/// Time grid and integration rules.
pub mod clock;
pub mod engine;
pub mod error;
pub mod kpi;
/// Dispatch policies.
pub mod policy;
pub mod power_balance;
pub mod trajectory;
pub mod types;
