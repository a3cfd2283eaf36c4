use chrono::{DateTime, Utc};
use core_types::{Leg, OrderRecord, RunStatus, Snapshot};
use events::NewEvent;
use rust_decimal::Decimal;
use uuid::Uuid;

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    UpdateRunStatus {
        run_id: Uuid,
        status: RunStatus,
    },
    UpdateRunBalance {
        run_id: Uuid,
        initial_balance: Option<Decimal>,
        current_balance: Decimal,
    },
    /// Terminates a run. Only takes effect while `end_ts` is still null.
    EndRun {
        run_id: Uuid,
        status: RunStatus,
        end_ts: DateTime<Utc>,
    },
    /// Records that opening orders are about to be sent. Keeps the first timestamp.
    MarkRunOpening {
        run_id: Uuid,
        ts: DateTime<Utc>,
    },
    /// Inserts an open leg, or re-opens an existing (run, symbol) row.
    UpsertLeg(Leg),
    /// Raises the favorable marks and lowers the adverse mark. Never moves them back.
    UpdateLegHighWaterMarks {
        run_id: Uuid,
        symbol: String,
        max_favorable_pnl_usdt: Decimal,
        max_adverse_pnl_usdt: Decimal,
        max_pnl_pct: Decimal,
    },
    CloseLeg {
        run_id: Uuid,
        symbol: String,
        exit_price: Decimal,
        exit_ts: DateTime<Utc>,
        exit_reason: String,
    },
    InsertOrder(OrderRecord),
    InsertSnapshot(Snapshot),
    InsertEvent(NewEvent),
}

/// Every store write of one tick. A store applies a batch in a single transaction:
/// either all of it becomes visible or none of it does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<StoreWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: StoreWrite) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn update_run_status(&mut self, run_id: Uuid, status: RunStatus) -> &mut Self {
        self.push(StoreWrite::UpdateRunStatus { run_id, status })
    }

    pub fn update_run_balance(
        &mut self,
        run_id: Uuid,
        initial_balance: Option<Decimal>,
        current_balance: Decimal,
    ) -> &mut Self {
        self.push(StoreWrite::UpdateRunBalance { run_id, initial_balance, current_balance })
    }

    pub fn end_run(&mut self, run_id: Uuid, status: RunStatus, end_ts: DateTime<Utc>) -> &mut Self {
        self.push(StoreWrite::EndRun { run_id, status, end_ts })
    }

    pub fn mark_run_opening(&mut self, run_id: Uuid, ts: DateTime<Utc>) -> &mut Self {
        self.push(StoreWrite::MarkRunOpening { run_id, ts })
    }

    pub fn upsert_leg(&mut self, leg: Leg) -> &mut Self {
        self.push(StoreWrite::UpsertLeg(leg))
    }

    pub fn update_leg_high_water_marks(
        &mut self,
        run_id: Uuid,
        symbol: impl Into<String>,
        max_favorable_pnl_usdt: Decimal,
        max_adverse_pnl_usdt: Decimal,
        max_pnl_pct: Decimal,
    ) -> &mut Self {
        self.push(StoreWrite::UpdateLegHighWaterMarks {
            run_id,
            symbol: symbol.into(),
            max_favorable_pnl_usdt,
            max_adverse_pnl_usdt,
            max_pnl_pct,
        })
    }

    pub fn close_leg(
        &mut self,
        run_id: Uuid,
        symbol: impl Into<String>,
        exit_price: Decimal,
        exit_ts: DateTime<Utc>,
        exit_reason: impl Into<String>,
    ) -> &mut Self {
        self.push(StoreWrite::CloseLeg {
            run_id,
            symbol: symbol.into(),
            exit_price,
            exit_ts,
            exit_reason: exit_reason.into(),
        })
    }

    pub fn insert_order(&mut self, order: OrderRecord) -> &mut Self {
        self.push(StoreWrite::InsertOrder(order))
    }

    pub fn insert_snapshot(&mut self, snapshot: Snapshot) -> &mut Self {
        self.push(StoreWrite::InsertSnapshot(snapshot))
    }

    pub fn insert_event(&mut self, event: NewEvent) -> &mut Self {
        self.push(StoreWrite::InsertEvent(event))
    }

    /// Appends all of `other`'s writes after this batch's.
    pub fn extend(&mut self, other: WriteBatch) -> &mut Self {
        self.writes.extend(other.writes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn writes(&self) -> &[StoreWrite] {
        &self.writes
    }
}
