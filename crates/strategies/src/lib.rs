//! # Decision Engine
//!
//! Pure functions that turn a market snapshot and a parameter set into a leg plan, and
//! a leg's or a portfolio's pnl into an exit decision.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of databases,
//!   APIs, or execution. It depends only on `core-types` and `configuration`.
//! - **Determinism:** Identical inputs always produce an identical, identically ordered
//!   plan. Nothing here reads the clock or keeps state between calls.
//!
//! ## Public API
//!
//! - `DecisionEngine`: bundles a validated `DecisionParams` with the operations below.
//! - `select_universe`, `rank_top_n`, `size_leg`, `build_leg_plan`: entry selection.
//! - `evaluate_leg_exit`, `evaluate_portfolio_exit`: exit rules.

// Declare all the modules that constitute this crate.
pub mod error;
pub mod exits;
pub mod params;
pub mod plan;
pub mod sizing;
pub mod universe;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use exits::{evaluate_leg_exit, evaluate_portfolio_exit};
pub use params::DecisionParams;
pub use plan::{build_leg_plan, candidate_symbols};
pub use sizing::size_leg;
pub use universe::{rank_top_n, select_universe};

use core_types::{ContractSpec, ExitDecision, LegPlan, StrategyTag, Ticker};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A validated parameter set and the decisions made with it.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    params: DecisionParams,
}

impl DecisionEngine {
    pub fn new(params: DecisionParams) -> Result<Self, StrategyError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &DecisionParams {
        &self.params
    }

    pub fn candidate_symbols(&self, tickers: &[Ticker]) -> Vec<String> {
        candidate_symbols(tickers, &self.params)
    }

    pub fn build_leg_plan(
        &self,
        tickers: &[Ticker],
        contract_specs: &HashMap<String, ContractSpec>,
    ) -> Result<Vec<LegPlan>, StrategyError> {
        build_leg_plan(tickers, contract_specs, &self.params)
    }

    pub fn evaluate_leg_exit(
        &self,
        leg_pnl_pct: Decimal,
        max_leg_pnl_pct_ever: Decimal,
        strategy_tag: &StrategyTag,
    ) -> ExitDecision {
        evaluate_leg_exit(leg_pnl_pct, max_leg_pnl_pct_ever, strategy_tag)
    }

    pub fn evaluate_portfolio_exit(
        &self,
        portfolio_pnl_pct: Decimal,
        hours_elapsed: Decimal,
        strategy_tag: &StrategyTag,
    ) -> ExitDecision {
        evaluate_portfolio_exit(
            portfolio_pnl_pct,
            hours_elapsed,
            strategy_tag,
            self.params.global_kill_dd_pct,
            self.params.hold_hours,
        )
    }
}
