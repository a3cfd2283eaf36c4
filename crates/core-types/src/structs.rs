use crate::enums::{
    CommandKind, ExitReason, LegStatus, OrderAction, OrderStatus, RunMode, RunStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unrealized (or realized, given an exit price) pnl of a short position.
pub fn short_pnl(entry_price: Decimal, mark_price: Decimal, qty: Decimal) -> Decimal {
    (entry_price - mark_price) * qty
}

/// One row of the exchange's 24h ticker snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: Decimal,
    pub mark_price: Option<Decimal>,
    /// 24h change as a fraction, 0.15 meaning +15%.
    pub change_24h: Decimal,
}

impl Ticker {
    /// The price a simulated fill or mark-to-market uses: mark price when positive,
    /// otherwise the last traded price.
    pub fn reference_price(&self) -> Decimal {
        match self.mark_price {
            Some(mark) if mark > Decimal::ZERO => mark,
            _ => self.last_price,
        }
    }
}

/// Exchange sizing constraints for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub min_size: Decimal,
    pub size_step: Decimal,
}

/// An open short position as reported by the exchange. Authoritative in live mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    /// `None` when the exchange reported an unreadable average entry.
    pub entry_price: Option<Decimal>,
    pub qty: Decimal,
    pub margin: Decimal,
    pub leverage: Decimal,
    /// `None` when the exchange reported an unreadable mark.
    pub mark_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
}

/// One leg of the basket the decision engine wants to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPlan {
    pub symbol: String,
    pub change_24h: Decimal,
    pub size: Decimal,
    pub margin_usdt: Decimal,
    pub leverage: Decimal,
    /// Price the size was computed from; paper fills are booked at this price.
    pub reference_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitDecision {
    Hold,
    Exit(ExitReason),
}

impl ExitDecision {
    pub fn is_exit(&self) -> bool {
        matches!(self, ExitDecision::Exit(_))
    }

    pub fn reason(&self) -> Option<ExitReason> {
        match self {
            ExitDecision::Hold => None,
            ExitDecision::Exit(reason) => Some(*reason),
        }
    }
}

/// A persisted run: one basket-trade lifecycle from entry to full close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub exchange: String,
    pub mode: RunMode,
    pub entry_time_utc: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub num_legs: i32,
    pub margin_per_leg_usdt: Decimal,
    pub leverage: Decimal,
    pub max_pump_pct: Decimal,
    pub global_kill_dd_pct: Decimal,
    pub strategy_tag: String,
    pub initial_balance: Option<Decimal>,
    pub current_balance: Option<Decimal>,
    /// Set just before the opening orders are sent. A run with this set and no legs
    /// was interrupted mid-open and must not be opened again.
    pub opening_ts: Option<DateTime<Utc>>,
}

impl Run {
    /// Active means it holds the mode's slot: running or paused, and never ended.
    pub fn is_active(&self) -> bool {
        self.status.is_active() && self.end_ts.is_none()
    }

    pub fn hours_elapsed(&self, now: DateTime<Utc>) -> Decimal {
        let seconds = (now - self.start_ts).num_seconds().max(0);
        Decimal::from(seconds) / Decimal::from(3600)
    }
}

/// A persisted short leg, unique per (run, symbol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub run_id: Uuid,
    pub symbol: String,
    pub entry_price: Decimal,
    pub entry_ts: DateTime<Utc>,
    pub qty: Decimal,
    pub margin_usdt: Decimal,
    pub status: LegStatus,
    pub exit_price: Option<Decimal>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub max_favorable_pnl_usdt: Decimal,
    pub max_adverse_pnl_usdt: Decimal,
    /// Best return on margin ever observed, 1.0 meaning +100%.
    pub max_pnl_pct: Decimal,
}

impl Leg {
    /// Realized pnl of a closed leg; zero while open or when the exit price is unknown.
    pub fn realized_pnl(&self) -> Decimal {
        match (self.status, self.exit_price) {
            (LegStatus::Closed, Some(exit)) => short_pnl(self.entry_price, exit, self.qty),
            _ => Decimal::ZERO,
        }
    }
}

/// Append-only audit record of one order action on a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub run_id: Uuid,
    pub symbol: String,
    pub action: OrderAction,
    pub intent_price: Decimal,
    pub fill_price: Option<Decimal>,
    pub qty: Decimal,
    pub status: OrderStatus,
    pub ts: DateTime<Utc>,
}

/// Per-tick mark-to-market row for one open leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: DateTime<Utc>,
    pub run_id: Uuid,
    pub exchange: String,
    pub symbol: String,
    pub price: Decimal,
    pub unrealized_pnl_usdt: Decimal,
    pub entry_price: Decimal,
    pub position_size: Decimal,
    pub margin_usdt: Decimal,
    pub leverage: Decimal,
}

/// An operator command waiting in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: i64,
    pub kind: CommandKind,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
}
