//! # Events
//!
//! The vocabulary of the audit trail. Every state transition a controller or the
//! scheduler makes is described by a [`NewEvent`] and written in the same transaction
//! as the rows it explains, so the trail can be read back as the history of a run.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{EventLevel, EventRecord, EventType, NewEvent};
