use crate::batch::{StoreWrite, WriteBatch};
use crate::error::DbError;
use crate::store::RunStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Command, CommandKind, Leg, LegStatus, OrderRecord, Run, RunMode, Snapshot};
use events::{EventRecord, NewEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    runs: Vec<Run>,
    legs: BTreeMap<(Uuid, String), Leg>,
    orders: Vec<OrderRecord>,
    snapshots: Vec<Snapshot>,
    events: Vec<EventRecord>,
    commands: Vec<Command>,
    cursors: HashMap<String, i64>,
    overrides: HashMap<RunMode, HashMap<String, String>>,
    /// Transactions left to succeed before one is failed on purpose.
    fail_after: Option<usize>,
}

/// Prior values of whatever a transaction touched, enough to put the state back.
///
/// Append-only tables are rolled back by length; rows changed in place keep their
/// first pre-image.
#[derive(Debug)]
struct Undo {
    runs_len: usize,
    orders_len: usize,
    snapshots_len: usize,
    events_len: usize,
    runs: Vec<(usize, Run)>,
    legs: Vec<((Uuid, String), Option<Leg>)>,
    cursors: Vec<(String, Option<i64>)>,
}

impl Undo {
    fn begin(state: &MemoryState) -> Self {
        Self {
            runs_len: state.runs.len(),
            orders_len: state.orders.len(),
            snapshots_len: state.snapshots.len(),
            events_len: state.events.len(),
            runs: Vec::new(),
            legs: Vec::new(),
            cursors: Vec::new(),
        }
    }

    fn rollback(self, state: &mut MemoryState) {
        state.runs.truncate(self.runs_len);
        state.orders.truncate(self.orders_len);
        state.snapshots.truncate(self.snapshots_len);
        state.events.truncate(self.events_len);
        for (index, run) in self.runs.into_iter().rev() {
            if let Some(slot) = state.runs.get_mut(index) {
                *slot = run;
            }
        }
        for (key, leg) in self.legs.into_iter().rev() {
            match leg {
                Some(leg) => {
                    state.legs.insert(key, leg);
                }
                None => {
                    state.legs.remove(&key);
                }
            }
        }
        for (consumer, cursor) in self.cursors.into_iter().rev() {
            match cursor {
                Some(cursor) => {
                    state.cursors.insert(consumer, cursor);
                }
                None => {
                    state.cursors.remove(&consumer);
                }
            }
        }
    }
}

impl MemoryState {
    /// The unfinished run `run_id`, journaled before the caller changes it.
    fn unfinished_run_mut(&mut self, run_id: Uuid, undo: &mut Undo) -> Option<&mut Run> {
        let index = self
            .runs
            .iter()
            .position(|r| r.run_id == run_id && r.end_ts.is_none())?;
        undo.runs.push((index, self.runs[index].clone()));
        self.runs.get_mut(index)
    }

    fn run_mut(&mut self, run_id: Uuid, undo: &mut Undo) -> Option<&mut Run> {
        let index = self.runs.iter().position(|r| r.run_id == run_id)?;
        undo.runs.push((index, self.runs[index].clone()));
        self.runs.get_mut(index)
    }

    fn leg_mut(&mut self, key: (Uuid, String), undo: &mut Undo) -> Option<&mut Leg> {
        let before = self.legs.get(&key).cloned();
        before.as_ref()?;
        undo.legs.push((key.clone(), before));
        self.legs.get_mut(&key)
    }

    fn require_run(&self, run_id: Uuid) -> Result<(), DbError> {
        if self.runs.iter().any(|r| r.run_id == run_id) {
            Ok(())
        } else {
            Err(DbError::NotFound)
        }
    }

    fn push_event(&mut self, event: &NewEvent) {
        let id = self.events.len() as i64 + 1;
        self.events.push(EventRecord {
            id,
            ts: event.ts,
            level: event.level,
            event_type: event.event_type.as_str().to_string(),
            message: event.message.clone(),
            run_id: event.run_id,
        });
    }

    fn advance_cursor(&mut self, consumer: &str, command_id: i64, undo: &mut Undo) {
        let before = self.cursors.get(consumer).copied();
        undo.cursors.push((consumer.to_string(), before));
        self.cursors
            .insert(consumer.to_string(), before.unwrap_or(0).max(command_id));
    }

    fn apply_write(&mut self, write: &StoreWrite, undo: &mut Undo) -> Result<(), DbError> {
        match write {
            StoreWrite::UpdateRunStatus { run_id, status } => {
                if let Some(run) = self.unfinished_run_mut(*run_id, undo) {
                    run.status = *status;
                }
            }
            StoreWrite::UpdateRunBalance { run_id, initial_balance, current_balance } => {
                if let Some(run) = self.run_mut(*run_id, undo) {
                    if initial_balance.is_some() {
                        run.initial_balance = *initial_balance;
                    }
                    run.current_balance = Some(*current_balance);
                }
            }
            StoreWrite::EndRun { run_id, status, end_ts } => {
                if let Some(run) = self.unfinished_run_mut(*run_id, undo) {
                    run.status = *status;
                    run.end_ts = Some(*end_ts);
                }
            }
            StoreWrite::MarkRunOpening { run_id, ts } => {
                if let Some(run) = self.run_mut(*run_id, undo) {
                    run.opening_ts = run.opening_ts.or(Some(*ts));
                }
            }
            StoreWrite::UpsertLeg(leg) => {
                self.require_run(leg.run_id)?;
                let key = (leg.run_id, leg.symbol.clone());
                match self.leg_mut(key.clone(), undo) {
                    Some(existing) => {
                        let reopened = existing.status == LegStatus::Closed;
                        existing.entry_price = leg.entry_price;
                        existing.qty = leg.qty;
                        existing.margin_usdt = leg.margin_usdt;
                        existing.status = LegStatus::Open;
                        existing.exit_price = None;
                        existing.exit_ts = None;
                        existing.exit_reason = None;
                        if reopened {
                            existing.entry_ts = leg.entry_ts;
                            existing.max_favorable_pnl_usdt = Default::default();
                            existing.max_adverse_pnl_usdt = Default::default();
                            existing.max_pnl_pct = Default::default();
                        }
                    }
                    None => {
                        let mut fresh = leg.clone();
                        fresh.status = LegStatus::Open;
                        fresh.exit_price = None;
                        fresh.exit_ts = None;
                        fresh.exit_reason = None;
                        fresh.max_favorable_pnl_usdt = Default::default();
                        fresh.max_adverse_pnl_usdt = Default::default();
                        fresh.max_pnl_pct = Default::default();
                        undo.legs.push((key.clone(), None));
                        self.legs.insert(key, fresh);
                    }
                }
            }
            StoreWrite::UpdateLegHighWaterMarks {
                run_id,
                symbol,
                max_favorable_pnl_usdt,
                max_adverse_pnl_usdt,
                max_pnl_pct,
            } => {
                if let Some(leg) = self.leg_mut((*run_id, symbol.clone()), undo) {
                    leg.max_favorable_pnl_usdt = leg.max_favorable_pnl_usdt.max(*max_favorable_pnl_usdt);
                    leg.max_adverse_pnl_usdt = leg.max_adverse_pnl_usdt.min(*max_adverse_pnl_usdt);
                    leg.max_pnl_pct = leg.max_pnl_pct.max(*max_pnl_pct);
                }
            }
            StoreWrite::CloseLeg { run_id, symbol, exit_price, exit_ts, exit_reason } => {
                if let Some(leg) = self
                    .leg_mut((*run_id, symbol.clone()), undo)
                    .filter(|l| l.status == LegStatus::Open)
                {
                    leg.status = LegStatus::Closed;
                    leg.exit_price = Some(*exit_price);
                    leg.exit_ts = Some(*exit_ts);
                    leg.exit_reason = Some(exit_reason.clone());
                }
            }
            StoreWrite::InsertOrder(order) => {
                self.require_run(order.run_id)?;
                self.orders.push(order.clone());
            }
            StoreWrite::InsertSnapshot(snapshot) => {
                self.require_run(snapshot.run_id)?;
                self.snapshots.push(snapshot.clone());
            }
            StoreWrite::InsertEvent(event) => self.push_event(event),
        }
        Ok(())
    }

    fn apply_batch(&mut self, batch: &WriteBatch, undo: &mut Undo) -> Result<(), DbError> {
        for write in batch.writes() {
            self.apply_write(write, undo)?;
        }
        Ok(())
    }
}

/// A `RunStore` held entirely in memory.
///
/// It enforces the same invariants as the Postgres store: one unfinished run per mode,
/// idempotent leg upserts, end timestamps set once and all-or-nothing batches. Used by
/// tests and by paper runs started without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // Writes never panic mid-batch, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` in place and undoes everything it touched if it fails.
    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut MemoryState, &mut Undo) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut guard = self.lock();
        match guard.fail_after {
            Some(0) => {
                guard.fail_after = None;
                return Err(DbError::Corrupt("injected write failure".to_string()));
            }
            Some(n) => guard.fail_after = Some(n - 1),
            None => {}
        }
        let mut undo = Undo::begin(&guard);
        let result = f(&mut guard, &mut undo);
        if result.is_err() {
            undo.rollback(&mut guard);
        }
        result
    }

    /// Makes the next transactional write fail, as an unreachable database would.
    pub fn fail_next_apply(&self) {
        self.fail_apply_after(0);
    }

    /// Lets `successes` transactions through, then fails the one after them.
    pub fn fail_apply_after(&self, successes: usize) {
        self.lock().fail_after = Some(successes);
    }

    pub fn set_runtime_override(&self, mode: RunMode, key: &str, value: &str) {
        self.lock()
            .overrides
            .entry(mode)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn runs(&self) -> Vec<Run> {
        self.lock().runs.clone()
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.lock().orders.clone()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.lock().snapshots.clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.lock().events.clone()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, run: &Run, batch: WriteBatch) -> Result<(), DbError> {
        self.transaction(|state, undo| {
            if run.end_ts.is_none()
                && state.runs.iter().any(|r| r.mode == run.mode && r.end_ts.is_none())
            {
                return Err(DbError::ActiveRunExists(run.mode));
            }
            state.runs.push(run.clone());
            state.apply_batch(&batch, undo)
        })
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, DbError> {
        Ok(self.lock().runs.iter().find(|r| r.run_id == run_id).cloned())
    }

    async fn get_active_run(&self, mode: RunMode) -> Result<Option<Run>, DbError> {
        Ok(self
            .lock()
            .runs
            .iter()
            .find(|r| r.mode == mode && r.is_active())
            .cloned())
    }

    async fn get_unfinished_run(&self, mode: RunMode) -> Result<Option<Run>, DbError> {
        Ok(self
            .lock()
            .runs
            .iter()
            .find(|r| r.mode == mode && r.end_ts.is_none())
            .cloned())
    }

    async fn get_latest_run(&self, mode: RunMode) -> Result<Option<Run>, DbError> {
        Ok(self
            .lock()
            .runs
            .iter()
            .filter(|r| r.mode == mode)
            .max_by_key(|r| r.start_ts)
            .cloned())
    }

    async fn get_legs(&self, run_id: Uuid) -> Result<Vec<Leg>, DbError> {
        Ok(self
            .lock()
            .legs
            .values()
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), DbError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.transaction(|state, undo| state.apply_batch(&batch, undo))
    }

    async fn read_unacknowledged_command(
        &self,
        consumer: &str,
    ) -> Result<Option<Command>, DbError> {
        let state = self.lock();
        let cursor = state.cursors.get(consumer).copied().unwrap_or(0);
        Ok(state
            .commands
            .iter()
            .filter(|c| c.id > cursor)
            .min_by_key(|c| c.id)
            .cloned())
    }

    async fn acknowledge_command(
        &self,
        consumer: &str,
        command_id: i64,
        batch: WriteBatch,
    ) -> Result<(), DbError> {
        self.transaction(|state, undo| {
            state.advance_cursor(consumer, command_id, undo);
            state.apply_batch(&batch, undo)
        })
    }

    async fn enqueue_command(
        &self,
        kind: CommandKind,
        payload: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let mut state = self.lock();
        let id = state.commands.len() as i64 + 1;
        state.commands.push(Command { id, kind, payload, created_at });
        Ok(id)
    }

    async fn get_runtime_overrides(
        &self,
        mode: RunMode,
    ) -> Result<HashMap<String, String>, DbError> {
        Ok(self.lock().overrides.get(&mode).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::RunStatus;
    use events::EventType;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn run(mode: RunMode) -> Run {
        Run {
            run_id: Uuid::new_v4(),
            exchange: "bitget".into(),
            mode,
            entry_time_utc: "04:00".into(),
            start_ts: Utc::now(),
            end_ts: None,
            status: RunStatus::Running,
            num_legs: 10,
            margin_per_leg_usdt: dec!(100),
            leverage: dec!(3),
            max_pump_pct: dec!(0.15),
            global_kill_dd_pct: dec!(0.30),
            strategy_tag: "S1".into(),
            initial_balance: Some(dec!(1000)),
            current_balance: Some(dec!(1000)),
            opening_ts: None,
        }
    }

    fn leg(run_id: Uuid, symbol: &str) -> Leg {
        Leg {
            run_id,
            symbol: symbol.into(),
            entry_price: dec!(10),
            entry_ts: Utc::now(),
            qty: dec!(30),
            margin_usdt: dec!(100),
            status: LegStatus::Open,
            exit_price: None,
            exit_ts: None,
            exit_reason: None,
            max_favorable_pnl_usdt: Decimal::ZERO,
            max_adverse_pnl_usdt: Decimal::ZERO,
            max_pnl_pct: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn only_one_unfinished_run_per_mode() {
        let store = MemoryStore::new();
        let first = run(RunMode::Paper);
        store.create_run(&first, WriteBatch::new()).await.unwrap();

        let second = run(RunMode::Paper);
        let err = store.create_run(&second, WriteBatch::new()).await.unwrap_err();
        assert!(matches!(err, DbError::ActiveRunExists(RunMode::Paper)));

        // Other mode is independent.
        store.create_run(&run(RunMode::Live), WriteBatch::new()).await.unwrap();

        let mut end = WriteBatch::new();
        end.end_run(first.run_id, RunStatus::Completed, Utc::now());
        store.apply(end).await.unwrap();
        store.create_run(&second, WriteBatch::new()).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_creation_admits_exactly_one() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_run(&run(RunMode::Live), WriteBatch::new()).await.is_ok()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert!(store.get_active_run(RunMode::Live).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn end_run_sets_end_timestamp_once() {
        let store = MemoryStore::new();
        let r = run(RunMode::Paper);
        store.create_run(&r, WriteBatch::new()).await.unwrap();

        let first_end = Utc::now();
        let mut batch = WriteBatch::new();
        batch.end_run(r.run_id, RunStatus::Completed, first_end);
        store.apply(batch).await.unwrap();

        let mut again = WriteBatch::new();
        again.end_run(r.run_id, RunStatus::Stopped, first_end + chrono::Duration::hours(1));
        store.apply(again).await.unwrap();

        let stored = store.get_run(r.run_id).await.unwrap().unwrap();
        assert_eq!(stored.end_ts, Some(first_end));
        assert_eq!(stored.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let r = run(RunMode::Paper);
        store.create_run(&r, WriteBatch::new()).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.upsert_leg(leg(r.run_id, "AUSDT"));
        // Unknown run: the whole batch must roll back.
        batch.upsert_leg(leg(Uuid::new_v4(), "BUSDT"));
        assert!(store.apply(batch).await.is_err());
        assert!(store.get_legs(r.run_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopening_a_closed_leg_resets_exit_and_marks() {
        let store = MemoryStore::new();
        let r = run(RunMode::Live);
        let mut batch = WriteBatch::new();
        batch.upsert_leg(leg(r.run_id, "AUSDT"));
        batch.update_leg_high_water_marks(r.run_id, "AUSDT", dec!(50), dec!(-5), dec!(0.5));
        batch.close_leg(r.run_id, "AUSDT", dec!(9), Utc::now(), "manual");
        store.create_run(&r, batch).await.unwrap();

        let closed = &store.get_legs(r.run_id).await.unwrap()[0];
        assert_eq!(closed.status, LegStatus::Closed);
        assert_eq!(closed.max_favorable_pnl_usdt, dec!(50));

        let mut reopen = WriteBatch::new();
        reopen.upsert_leg(leg(r.run_id, "AUSDT"));
        store.apply(reopen).await.unwrap();

        let reopened = &store.get_legs(r.run_id).await.unwrap()[0];
        assert_eq!(reopened.status, LegStatus::Open);
        assert_eq!(reopened.exit_reason, None);
        assert_eq!(reopened.max_favorable_pnl_usdt, Decimal::ZERO);
        assert_eq!(reopened.max_pnl_pct, Decimal::ZERO);
    }

    #[tokio::test]
    async fn high_water_marks_never_move_back() {
        let store = MemoryStore::new();
        let r = run(RunMode::Paper);
        let mut batch = WriteBatch::new();
        batch.upsert_leg(leg(r.run_id, "AUSDT"));
        batch.update_leg_high_water_marks(r.run_id, "AUSDT", dec!(50), dec!(-5), dec!(0.5));
        batch.update_leg_high_water_marks(r.run_id, "AUSDT", dec!(20), dec!(-2), dec!(0.2));
        store.create_run(&r, batch).await.unwrap();

        let stored = &store.get_legs(r.run_id).await.unwrap()[0];
        assert_eq!(stored.max_favorable_pnl_usdt, dec!(50));
        assert_eq!(stored.max_adverse_pnl_usdt, dec!(-5));
        assert_eq!(stored.max_pnl_pct, dec!(0.5));
    }

    #[tokio::test]
    async fn command_cursor_is_per_consumer() {
        let store = MemoryStore::new();
        let first = store.enqueue_command(CommandKind::Pause, None, Utc::now()).await.unwrap();
        let second = store.enqueue_command(CommandKind::Resume, None, Utc::now()).await.unwrap();

        let next = store.read_unacknowledged_command("scheduler").await.unwrap().unwrap();
        assert_eq!(next.id, first);

        let mut ack = WriteBatch::new();
        ack.insert_event(NewEvent::info(Utc::now(), EventType::CommandAck, "pause"));
        store.acknowledge_command("scheduler", first, ack).await.unwrap();

        let next = store.read_unacknowledged_command("scheduler").await.unwrap().unwrap();
        assert_eq!(next.id, second);
        // A second consumer still starts from the beginning.
        let other = store.read_unacknowledged_command("audit").await.unwrap().unwrap();
        assert_eq!(other.id, first);
        assert!(store.events().iter().any(|e| e.is(EventType::CommandAck)));
    }

    #[tokio::test]
    async fn injected_failure_rolls_back_acknowledgement() {
        let store = MemoryStore::new();
        let id = store.enqueue_command(CommandKind::CloseAll, None, Utc::now()).await.unwrap();
        store.fail_next_apply();
        assert!(store.acknowledge_command("scheduler", id, WriteBatch::new()).await.is_err());
        let still_pending = store.read_unacknowledged_command("scheduler").await.unwrap();
        assert_eq!(still_pending.map(|c| c.id), Some(id));
    }

    #[tokio::test]
    async fn failed_batch_restores_rows_changed_in_place() {
        let store = MemoryStore::new();
        let r = run(RunMode::Paper);
        let mut open = WriteBatch::new();
        open.upsert_leg(leg(r.run_id, "AUSDT"));
        store.create_run(&r, open).await.unwrap();
        let events_before = store.events().len();

        let mut batch = WriteBatch::new();
        batch
            .close_leg(r.run_id, "AUSDT", dec!(9), Utc::now(), "kill_switch")
            .update_run_status(r.run_id, RunStatus::Paused)
            .mark_run_opening(r.run_id, Utc::now())
            .insert_event(NewEvent::info(Utc::now(), EventType::LegClosed, "AUSDT"))
            .upsert_leg(leg(Uuid::new_v4(), "BUSDT"));
        assert!(store.apply(batch).await.is_err());

        let stored = store.get_run(r.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert_eq!(stored.opening_ts, None);
        assert_eq!(store.get_legs(r.run_id).await.unwrap()[0].status, LegStatus::Open);
        assert_eq!(store.events().len(), events_before);
    }

    #[tokio::test]
    async fn opening_mark_keeps_the_first_timestamp() {
        let store = MemoryStore::new();
        let r = run(RunMode::Live);
        let first = Utc::now();
        let mut batch = WriteBatch::new();
        batch.mark_run_opening(r.run_id, first);
        store.create_run(&r, batch).await.unwrap();

        let mut again = WriteBatch::new();
        again.mark_run_opening(r.run_id, first + chrono::Duration::minutes(5));
        store.apply(again).await.unwrap();
        assert_eq!(store.get_run(r.run_id).await.unwrap().unwrap().opening_ts, Some(first));
    }

    #[tokio::test]
    async fn injected_failure_can_skip_earlier_writes() {
        let store = MemoryStore::new();
        let r = run(RunMode::Paper);
        store.fail_apply_after(1);
        store.create_run(&r, WriteBatch::new()).await.unwrap();
        assert!(store.insert_event(NewEvent::info(Utc::now(), EventType::RunStarted, "x")).await.is_err());
        store.insert_event(NewEvent::info(Utc::now(), EventType::RunStarted, "x")).await.unwrap();
        assert_eq!(store.events().len(), 1);
    }
}
