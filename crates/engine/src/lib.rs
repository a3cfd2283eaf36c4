//! # Engine Crate
//!
//! The long-lived loops of the system: one `RunController` per mode and the
//! `RunScheduler`. They share no in-process state and coordinate only through the
//! `RunStore`.
//!
//! ## Architectural Principles
//!
//! - **One State Machine:** Paper and live trading are the same controller driven by a
//!   different `LegExecutor`.
//! - **Store as Truth:** A controller can always be rebuilt from persisted rows. Any tick
//!   that fails drops the in-memory projection and re-attaches on the next tick.
//! - **Atomic Ticks:** Everything a tick decides is written as one `WriteBatch`.
//! - **Loops Never Die:** Errors are logged and retried on the next interval.
//!
//! ## Public API
//!
//! - `RunController`, `Phase`: The per-mode run lifecycle.
//! - `RunScheduler`: Daily run creation and command relay.
//! - `reconcile`: Aligns the leg book with an executor observation.
//! - `EngineError`: The specific error types that can be returned from this crate.

pub mod controller;
pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod util;

#[cfg(test)]
mod test_support;

pub use controller::{Phase, RunController};
pub use error::EngineError;
pub use reconciler::{ExternalClose, Reconciliation, price_map, reconcile};
pub use scheduler::{RunScheduler, SCHEDULER_CONSUMER, SchedulerReport};
