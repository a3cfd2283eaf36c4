use crate::error::StrategyError;
use crate::params::DecisionParams;
use crate::sizing::size_leg;
use crate::universe::{rank_top_n, select_universe};
use core_types::{ContractSpec, LegPlan, Ticker};
use std::collections::HashMap;

/// The symbols `build_leg_plan` would consider, in rank order. Used to fetch only the
/// contract specs the plan needs.
pub fn candidate_symbols(tickers: &[Ticker], params: &DecisionParams) -> Vec<String> {
    rank_top_n(select_universe(tickers, params.max_pump_pct), params.num_legs)
        .into_iter()
        .map(|t| t.symbol)
        .collect()
}

/// Builds the basket to open: filter, rank, then size each candidate.
///
/// Candidates that size to zero are dropped rather than replaced, so the plan may hold
/// fewer than `num_legs` legs. A symbol without a contract spec cannot be sized and is
/// dropped too.
pub fn build_leg_plan(
    tickers: &[Ticker],
    contract_specs: &HashMap<String, ContractSpec>,
    params: &DecisionParams,
) -> Result<Vec<LegPlan>, StrategyError> {
    params.validate()?;

    let candidates = rank_top_n(select_universe(tickers, params.max_pump_pct), params.num_legs);
    let mut plan = Vec::with_capacity(candidates.len());

    for ticker in candidates {
        let Some(spec) = contract_specs.get(&ticker.symbol) else {
            tracing::warn!(symbol = %ticker.symbol, "No contract spec; dropping leg.");
            continue;
        };
        let size = size_leg(
            &ticker.symbol,
            ticker.last_price,
            params.margin_per_leg_usdt,
            params.leverage,
            spec,
        );
        if size.is_zero() {
            tracing::info!(symbol = %ticker.symbol, "Dropping leg that sizes to zero.");
            continue;
        }
        plan.push(LegPlan {
            reference_price: ticker.reference_price(),
            symbol: ticker.symbol,
            change_24h: ticker.change_24h,
            size,
            margin_usdt: params.margin_per_leg_usdt,
            leverage: params.leverage,
        });
    }

    Ok(plan)
}
