//! Background workers.

pub mod sweep;

pub use sweep::{RetrySweep, SweepConfig, SweepHandle, SweepStats};
