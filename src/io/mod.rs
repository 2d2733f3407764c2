//! CSV boundary: signal import and trajectory export.

pub mod export;
pub mod signals;
