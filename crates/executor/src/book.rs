use crate::error::ExecutorError;
use chrono::{DateTime, Utc};
use core_types::{ExchangePosition, Leg, LegStatus, short_pnl};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The in-memory projection of one open short leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedLeg {
    pub symbol: String,
    pub entry_price: Decimal,
    pub entry_ts: DateTime<Utc>,
    pub qty: Decimal,
    pub margin_usdt: Decimal,
    pub leverage: Decimal,
    pub max_favorable_pnl_usdt: Decimal,
    pub max_adverse_pnl_usdt: Decimal,
    pub max_pnl_pct: Decimal,
}

impl TrackedLeg {
    pub fn new(
        symbol: impl Into<String>,
        entry_price: Decimal,
        entry_ts: DateTime<Utc>,
        qty: Decimal,
        margin_usdt: Decimal,
        leverage: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            entry_price,
            entry_ts,
            qty,
            margin_usdt,
            leverage,
            max_favorable_pnl_usdt: Decimal::ZERO,
            max_adverse_pnl_usdt: Decimal::ZERO,
            max_pnl_pct: Decimal::ZERO,
        }
    }

    /// Rebuilds the projection of an open leg row, high-water marks included.
    pub fn from_row(leg: &Leg, leverage: Decimal) -> Self {
        Self {
            symbol: leg.symbol.clone(),
            entry_price: leg.entry_price,
            entry_ts: leg.entry_ts,
            qty: leg.qty,
            margin_usdt: leg.margin_usdt,
            leverage,
            max_favorable_pnl_usdt: leg.max_favorable_pnl_usdt,
            max_adverse_pnl_usdt: leg.max_adverse_pnl_usdt,
            max_pnl_pct: leg.max_pnl_pct,
        }
    }

    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        short_pnl(self.entry_price, mark_price, self.qty)
    }

    /// Return on margin, 1.0 meaning +100%. Zero when the margin is unknown.
    pub fn pnl_pct(&self, pnl: Decimal) -> Decimal {
        if self.margin_usdt > Decimal::ZERO {
            pnl / self.margin_usdt
        } else {
            Decimal::ZERO
        }
    }

    /// Folds one observed pnl into the high-water marks. Returns whether any moved.
    pub fn observe(&mut self, pnl: Decimal) -> bool {
        let mut changed = false;
        if pnl > self.max_favorable_pnl_usdt {
            self.max_favorable_pnl_usdt = pnl;
            changed = true;
        }
        if pnl < self.max_adverse_pnl_usdt {
            self.max_adverse_pnl_usdt = pnl;
            changed = true;
        }
        let pct = self.pnl_pct(pnl);
        if pct > self.max_pnl_pct {
            self.max_pnl_pct = pct;
            changed = true;
        }
        changed
    }
}

/// All open legs of the run a controller holds, plus the realized pnl of the ones
/// already closed. Iteration is ordered by symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegBook {
    legs: BTreeMap<String, TrackedLeg>,
    realized_pnl: Decimal,
}

impl LegBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs the book entirely from persisted leg rows.
    pub fn from_rows(rows: &[Leg], leverage: Decimal) -> Self {
        let mut book = Self::new();
        for row in rows {
            match row.status {
                LegStatus::Open => {
                    book.legs.insert(row.symbol.clone(), TrackedLeg::from_row(row, leverage));
                }
                LegStatus::Closed => book.realized_pnl += row.realized_pnl(),
            }
        }
        book
    }

    pub fn open(&mut self, leg: TrackedLeg) -> Result<(), ExecutorError> {
        if self.legs.contains_key(&leg.symbol) {
            return Err(ExecutorError::LegAlreadyTracked(leg.symbol));
        }
        self.legs.insert(leg.symbol.clone(), leg);
        Ok(())
    }

    /// Removes a leg and books its realized pnl at `exit_price`.
    pub fn close(&mut self, symbol: &str, exit_price: Decimal) -> Result<TrackedLeg, ExecutorError> {
        let leg = self
            .legs
            .remove(symbol)
            .ok_or_else(|| ExecutorError::LegNotTracked(symbol.to_string()))?;
        self.realized_pnl += leg.unrealized_pnl(exit_price);
        Ok(leg)
    }

    /// Replaces the projected entry, quantity and margin with the exchange's figures.
    /// An unreadable entry keeps the projected one.
    pub fn sync_with_exchange(&mut self, position: &ExchangePosition) -> Result<(), ExecutorError> {
        let leg = self
            .legs
            .get_mut(&position.symbol)
            .ok_or_else(|| ExecutorError::LegNotTracked(position.symbol.clone()))?;
        if let Some(entry) = position.entry_price {
            leg.entry_price = entry;
        }
        leg.qty = position.qty;
        if position.margin > Decimal::ZERO {
            leg.margin_usdt = position.margin;
        }
        if position.leverage > Decimal::ZERO {
            leg.leverage = position.leverage;
        }
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&TrackedLeg> {
        self.legs.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut TrackedLeg> {
        self.legs.get_mut(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.legs.contains_key(symbol)
    }

    pub fn legs(&self) -> impl Iterator<Item = &TrackedLeg> {
        self.legs.values()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.legs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }
}
