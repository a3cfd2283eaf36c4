//! # Executor Crate
//!
//! This crate provides the leg-execution strategies and the in-memory projection of a
//! run's open legs. It defines a generic `LegExecutor` trait with a `SimulatedExecutor`
//! for paper runs and a `LiveExecutor` for real orders, plus the `LegBook`.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** Executors report what happened to an order and never
//!   touch the book. The `LegBook` is the state that the controller updates with the
//!   results of an execution. This separation is key for testability and clarity.
//! - **Execution Abstraction:** The `LegExecutor` trait lets a single run controller be
//!   completely agnostic about whether it trades against a simulation or the exchange.
//!
//! ## Public API
//!
//! - `LegExecutor`: The core trait for all execution strategies.
//! - `SimulatedExecutor`, `LiveExecutor`: The paper and live implementations.
//! - `LegBook`, `TrackedLeg`: The in-memory state of a run's open legs.
//! - `ExecutorError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod book;
pub mod error;
pub mod exchange;

// Re-export the key components to provide a clean, public-facing API.
pub use book::{LegBook, TrackedLeg};
pub use error::ExecutorError;
pub use exchange::{Fill, LegExecutor, LiveExecutor, Observation, PositionSource, SimulatedExecutor};
