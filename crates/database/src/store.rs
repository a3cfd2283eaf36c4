use crate::batch::WriteBatch;
use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Command, CommandKind, Leg, Run, RunMode};
use events::NewEvent;
use std::collections::HashMap;
use uuid::Uuid;

/// The persistence interface the controllers and the scheduler coordinate through.
///
/// Implementations must enforce "at most one unfinished run per mode" themselves and
/// apply every [`WriteBatch`] atomically.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Claims the mode's slot for `run` and applies `batch` in the same transaction.
    /// Fails with [`DbError::ActiveRunExists`] when the slot is taken.
    async fn create_run(&self, run: &Run, batch: WriteBatch) -> Result<(), DbError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, DbError>;

    /// The run in `running` or `paused` with no end timestamp.
    async fn get_active_run(&self, mode: RunMode) -> Result<Option<Run>, DbError>;

    /// The run with no end timestamp, whatever its status.
    async fn get_unfinished_run(&self, mode: RunMode) -> Result<Option<Run>, DbError>;

    /// The most recently started run of the mode.
    async fn get_latest_run(&self, mode: RunMode) -> Result<Option<Run>, DbError>;

    /// All legs of a run, ordered by symbol.
    async fn get_legs(&self, run_id: Uuid) -> Result<Vec<Leg>, DbError>;

    /// Applies every write of the batch in one transaction.
    async fn apply(&self, batch: WriteBatch) -> Result<(), DbError>;

    async fn insert_event(&self, event: NewEvent) -> Result<(), DbError> {
        let mut batch = WriteBatch::new();
        batch.insert_event(event);
        self.apply(batch).await
    }

    /// The oldest command past `consumer`'s cursor.
    async fn read_unacknowledged_command(&self, consumer: &str)
    -> Result<Option<Command>, DbError>;

    /// Advances `consumer`'s cursor to `command_id` and applies `batch` in one transaction.
    async fn acknowledge_command(
        &self,
        consumer: &str,
        command_id: i64,
        batch: WriteBatch,
    ) -> Result<(), DbError>;

    async fn enqueue_command(
        &self,
        kind: CommandKind,
        payload: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<i64, DbError>;

    /// `key -> value` overrides for the mode's runtime settings.
    async fn get_runtime_overrides(&self, mode: RunMode) -> Result<HashMap<String, String>, DbError>;
}
