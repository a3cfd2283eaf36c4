pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{
    CommandKind, ExitReason, LegStatus, OrderAction, OrderSide, OrderStatus, RunMode, RunStatus,
    StrategyTag,
};
pub use error::CoreError;
pub use structs::{
    short_pnl, Command, ContractSpec, ExchangePosition, ExitDecision, Leg, LegPlan, OrderRecord,
    Run, Snapshot, Ticker,
};
