use crate::batch::{StoreWrite, WriteBatch};
use crate::error::DbError;
use crate::store::RunStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Command, CommandKind, Leg, LegStatus, Run, RunMode};
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::{Row, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

const RUN_COLUMNS: &str = "run_id, exchange, mode, entry_time_utc, start_ts, end_ts, status, \
     num_legs, margin_per_leg_usdt, leverage, max_pump_pct, global_kill_dd_pct, strategy_tag, \
     initial_balance, current_balance, opening_ts";

const LEG_COLUMNS: &str = "run_id, symbol, entry_price, entry_ts, qty, margin_usdt, status, \
     exit_price, exit_ts, exit_reason, max_favorable_pnl_usdt, max_adverse_pnl_usdt, max_pnl_pct";

/// The `DbRepository` is the PostgreSQL implementation of [`RunStore`]. It encapsulates
/// all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T, DbError>
where
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| DbError::Corrupt(format!("{}='{}': {}", column, raw, e)))
}

fn run_from_row(row: &PgRow) -> Result<Run, DbError> {
    Ok(Run {
        run_id: row.try_get("run_id")?,
        exchange: row.try_get("exchange")?,
        mode: parse_column(row, "mode")?,
        entry_time_utc: row.try_get("entry_time_utc")?,
        start_ts: row.try_get("start_ts")?,
        end_ts: row.try_get("end_ts")?,
        status: parse_column(row, "status")?,
        num_legs: row.try_get("num_legs")?,
        margin_per_leg_usdt: row.try_get("margin_per_leg_usdt")?,
        leverage: row.try_get("leverage")?,
        max_pump_pct: row.try_get("max_pump_pct")?,
        global_kill_dd_pct: row.try_get("global_kill_dd_pct")?,
        strategy_tag: row.try_get("strategy_tag")?,
        initial_balance: row.try_get("initial_balance")?,
        current_balance: row.try_get("current_balance")?,
        opening_ts: row.try_get("opening_ts")?,
    })
}

fn leg_from_row(row: &PgRow) -> Result<Leg, DbError> {
    Ok(Leg {
        run_id: row.try_get("run_id")?,
        symbol: row.try_get("symbol")?,
        entry_price: row.try_get("entry_price")?,
        entry_ts: row.try_get("entry_ts")?,
        qty: row.try_get("qty")?,
        margin_usdt: row.try_get("margin_usdt")?,
        status: parse_column::<LegStatus>(row, "status")?,
        exit_price: row.try_get("exit_price")?,
        exit_ts: row.try_get("exit_ts")?,
        exit_reason: row.try_get("exit_reason")?,
        max_favorable_pnl_usdt: row.try_get("max_favorable_pnl_usdt")?,
        max_adverse_pnl_usdt: row.try_get("max_adverse_pnl_usdt")?,
        max_pnl_pct: row.try_get("max_pnl_pct")?,
    })
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_run(&self, sql: &str, mode: RunMode) -> Result<Option<Run>, DbError> {
        let row = sqlx::query(sql)
            .bind(mode.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    /// Executes one write on the open transaction.
    async fn execute_write(
        tx: &mut Transaction<'_, Postgres>,
        write: &StoreWrite,
    ) -> Result<(), DbError> {
        match write {
            StoreWrite::UpdateRunStatus { run_id, status } => {
                sqlx::query("UPDATE runs SET status = $1 WHERE run_id = $2 AND end_ts IS NULL")
                    .bind(status.as_str())
                    .bind(run_id)
                    .execute(&mut **tx)
                    .await?;
            }
            StoreWrite::UpdateRunBalance { run_id, initial_balance, current_balance } => {
                sqlx::query(
                    "UPDATE runs SET initial_balance = COALESCE($1, initial_balance), \
                     current_balance = $2 WHERE run_id = $3",
                )
                .bind(initial_balance)
                .bind(current_balance)
                .bind(run_id)
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::EndRun { run_id, status, end_ts } => {
                sqlx::query(
                    "UPDATE runs SET status = $1, end_ts = $2 WHERE run_id = $3 AND end_ts IS NULL",
                )
                .bind(status.as_str())
                .bind(end_ts)
                .bind(run_id)
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::MarkRunOpening { run_id, ts } => {
                sqlx::query("UPDATE runs SET opening_ts = COALESCE(opening_ts, $1) WHERE run_id = $2")
                    .bind(ts)
                    .bind(run_id)
                    .execute(&mut **tx)
                    .await?;
            }
            StoreWrite::UpsertLeg(leg) => {
                sqlx::query(
                    r#"
                    INSERT INTO legs (run_id, symbol, side, entry_price, entry_ts, qty, margin_usdt, status)
                    VALUES ($1, $2, 'short', $3, $4, $5, $6, 'open')
                    ON CONFLICT (run_id, symbol) DO UPDATE SET
                        entry_price = EXCLUDED.entry_price,
                        qty = EXCLUDED.qty,
                        margin_usdt = EXCLUDED.margin_usdt,
                        status = 'open',
                        exit_price = NULL,
                        exit_ts = NULL,
                        exit_reason = NULL,
                        entry_ts = CASE WHEN legs.status = 'closed' THEN EXCLUDED.entry_ts ELSE legs.entry_ts END,
                        max_favorable_pnl_usdt = CASE WHEN legs.status = 'closed' THEN 0 ELSE legs.max_favorable_pnl_usdt END,
                        max_adverse_pnl_usdt = CASE WHEN legs.status = 'closed' THEN 0 ELSE legs.max_adverse_pnl_usdt END,
                        max_pnl_pct = CASE WHEN legs.status = 'closed' THEN 0 ELSE legs.max_pnl_pct END
                    "#,
                )
                .bind(leg.run_id)
                .bind(&leg.symbol)
                .bind(leg.entry_price)
                .bind(leg.entry_ts)
                .bind(leg.qty)
                .bind(leg.margin_usdt)
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::UpdateLegHighWaterMarks {
                run_id,
                symbol,
                max_favorable_pnl_usdt,
                max_adverse_pnl_usdt,
                max_pnl_pct,
            } => {
                sqlx::query(
                    r#"
                    UPDATE legs SET
                        max_favorable_pnl_usdt = GREATEST(max_favorable_pnl_usdt, $1),
                        max_adverse_pnl_usdt = LEAST(max_adverse_pnl_usdt, $2),
                        max_pnl_pct = GREATEST(max_pnl_pct, $3)
                    WHERE run_id = $4 AND symbol = $5
                    "#,
                )
                .bind(max_favorable_pnl_usdt)
                .bind(max_adverse_pnl_usdt)
                .bind(max_pnl_pct)
                .bind(run_id)
                .bind(symbol)
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::CloseLeg { run_id, symbol, exit_price, exit_ts, exit_reason } => {
                sqlx::query(
                    "UPDATE legs SET status = 'closed', exit_price = $1, exit_ts = $2, exit_reason = $3 \
                     WHERE run_id = $4 AND symbol = $5 AND status = 'open'",
                )
                .bind(exit_price)
                .bind(exit_ts)
                .bind(exit_reason)
                .bind(run_id)
                .bind(symbol)
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::InsertOrder(order) => {
                sqlx::query(
                    r#"
                    INSERT INTO orders (run_id, symbol, side, action, intent_price, fill_price, qty, status, ts)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(order.run_id)
                .bind(&order.symbol)
                .bind(order.action.side().as_str())
                .bind(order.action.as_str())
                .bind(order.intent_price)
                .bind(order.fill_price)
                .bind(order.qty)
                .bind(order.status.as_str())
                .bind(order.ts)
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::InsertSnapshot(snapshot) => {
                sqlx::query(
                    r#"
                    INSERT INTO snapshots (
                        ts, run_id, exchange, symbol, price, unrealized_pnl_usdt,
                        entry_price, position_size, margin_usdt, leverage
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(snapshot.ts)
                .bind(snapshot.run_id)
                .bind(&snapshot.exchange)
                .bind(&snapshot.symbol)
                .bind(snapshot.price)
                .bind(snapshot.unrealized_pnl_usdt)
                .bind(snapshot.entry_price)
                .bind(snapshot.position_size)
                .bind(snapshot.margin_usdt)
                .bind(snapshot.leverage)
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::InsertEvent(event) => {
                sqlx::query(
                    "INSERT INTO events (ts, level, event_type, message, run_id) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(event.ts)
                .bind(event.level.as_str())
                .bind(event.event_type.as_str())
                .bind(&event.message)
                .bind(event.run_id)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }

    async fn execute_batch(
        tx: &mut Transaction<'_, Postgres>,
        batch: &WriteBatch,
    ) -> Result<(), DbError> {
        for write in batch.writes() {
            Self::execute_write(tx, write).await?;
        }
        Ok(())
    }

    /// Writes a `key -> value` runtime override for a mode.
    pub async fn set_runtime_override(
        &self,
        mode: RunMode,
        key: &str,
        value: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO runtime_settings (mode, key, value, updated_at) VALUES ($1, $2, $3, now())
            ON CONFLICT (mode, key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(mode.as_str())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for DbRepository {
    async fn create_run(&self, run: &Run, batch: WriteBatch) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO runs ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            RUN_COLUMNS
        ))
        .bind(run.run_id)
        .bind(&run.exchange)
        .bind(run.mode.as_str())
        .bind(&run.entry_time_utc)
        .bind(run.start_ts)
        .bind(run.end_ts)
        .bind(run.status.as_str())
        .bind(run.num_legs)
        .bind(run.margin_per_leg_usdt)
        .bind(run.leverage)
        .bind(run.max_pump_pct)
        .bind(run.global_kill_dd_pct)
        .bind(&run.strategy_tag)
        .bind(run.initial_balance)
        .bind(run.current_balance)
        .bind(run.opening_ts)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if DbError::is_unique_violation(&e) => {
                return Err(DbError::ActiveRunExists(run.mode));
            }
            Err(e) => return Err(e.into()),
        }

        Self::execute_batch(&mut tx, &batch).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, DbError> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE run_id = $1", RUN_COLUMNS))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn get_active_run(&self, mode: RunMode) -> Result<Option<Run>, DbError> {
        let sql = format!(
            "SELECT {} FROM runs WHERE mode = $1 AND status IN ('running', 'paused') \
             AND end_ts IS NULL ORDER BY start_ts DESC LIMIT 1",
            RUN_COLUMNS
        );
        self.fetch_run(&sql, mode).await
    }

    async fn get_unfinished_run(&self, mode: RunMode) -> Result<Option<Run>, DbError> {
        let sql = format!(
            "SELECT {} FROM runs WHERE mode = $1 AND end_ts IS NULL ORDER BY start_ts DESC LIMIT 1",
            RUN_COLUMNS
        );
        self.fetch_run(&sql, mode).await
    }

    async fn get_latest_run(&self, mode: RunMode) -> Result<Option<Run>, DbError> {
        let sql = format!(
            "SELECT {} FROM runs WHERE mode = $1 ORDER BY start_ts DESC LIMIT 1",
            RUN_COLUMNS
        );
        self.fetch_run(&sql, mode).await
    }

    async fn get_legs(&self, run_id: Uuid) -> Result<Vec<Leg>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM legs WHERE run_id = $1 ORDER BY symbol",
            LEG_COLUMNS
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(leg_from_row).collect()
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), DbError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        Self::execute_batch(&mut tx, &batch).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn read_unacknowledged_command(
        &self,
        consumer: &str,
    ) -> Result<Option<Command>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, payload, created_at FROM commands
            WHERE id > COALESCE((SELECT last_command_id FROM command_cursors WHERE consumer = $1), 0)
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(consumer)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(Command {
                id: row.try_get("id")?,
                kind: parse_column::<CommandKind>(&row, "kind")?,
                payload: row.try_get("payload")?,
                created_at: row.try_get("created_at")?,
            })),
        }
    }

    async fn acknowledge_command(
        &self,
        consumer: &str,
        command_id: i64,
        batch: WriteBatch,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO command_cursors (consumer, last_command_id) VALUES ($1, $2)
            ON CONFLICT (consumer) DO UPDATE
                SET last_command_id = GREATEST(command_cursors.last_command_id, EXCLUDED.last_command_id)
            "#,
        )
        .bind(consumer)
        .bind(command_id)
        .execute(&mut *tx)
        .await?;
        Self::execute_batch(&mut tx, &batch).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn enqueue_command(
        &self,
        kind: CommandKind,
        payload: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let row = sqlx::query(
            "INSERT INTO commands (kind, payload, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(kind.as_str())
        .bind(payload)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn get_runtime_overrides(
        &self,
        mode: RunMode,
    ) -> Result<HashMap<String, String>, DbError> {
        let rows = sqlx::query("SELECT key, value FROM runtime_settings WHERE mode = $1")
            .bind(mode.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<(String, String), DbError> {
                Ok((row.try_get("key")?, row.try_get("value")?))
            })
            .collect()
    }
}
