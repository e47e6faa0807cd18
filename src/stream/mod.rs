//! Fixed-cadence media streaming

pub mod pump;

pub use pump::{PumpHandle, MAX_CONSECUTIVE_FAILURES};
