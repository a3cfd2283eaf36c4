//! # Database Crate
//!
//! This crate is the persistence layer the controllers and the scheduler coordinate
//! through. It is the system's "permanent archive" and the only shared state between
//! the long-lived loops.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** All SQL lives here. The rest of the application talks to the
//!   `RunStore` trait and never sees a query.
//! - **Atomic Ticks:** Every write a tick produces goes into one `WriteBatch`, which a
//!   store applies in a single transaction.
//! - **Store-Enforced Invariants:** "One unfinished run per mode" is a partial unique
//!   index, not an in-process lock, so separate processes cannot race past it.
//!
//! ## Public API
//!
//! - `connect`, `run_migrations`: Pool setup and embedded migrations.
//! - `RunStore`: The persistence interface.
//! - `DbRepository`: The PostgreSQL implementation.
//! - `MemoryStore`: The in-memory implementation with the same invariants.
//! - `WriteBatch`, `StoreWrite`: One tick's writes.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod batch;
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use batch::{StoreWrite, WriteBatch};
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::MemoryStore;
pub use repository::DbRepository;
pub use store::RunStore;
