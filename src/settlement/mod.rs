//! Settlement module - the barrier that gates the draw and the result fan-out.
//!
//! Provides:
//! - [`SettlementBarrier`] - counts agency arrivals and computes winners once
//! - [`ConnectionRegistry`] - agency id → live connection, used to dispatch results
//! - [`ResultSlot`] - per-connection receiver for its own winning documents

mod barrier;
mod registry;

pub use barrier::{compute_winners, Arrival, SettlementBarrier};
pub use registry::{ConnectionRegistry, DispatchReport, ResultSlot};
