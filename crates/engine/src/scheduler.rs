use crate::error::EngineError;
use crate::util::{entry_time_reached, is_trading_day, new_run, started_today};
use chrono::{DateTime, Utc};
use configuration::RuntimeSettings;
use core_types::{Command, Run, RunMode, RunStatus};
use database::{DbError, RunStore, WriteBatch};
use events::{EventType, NewEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The consumer name the scheduler acknowledges commands under.
pub const SCHEDULER_CONSUMER: &str = "scheduler";

/// What one scheduler cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerReport {
    pub command: Option<Command>,
    pub created: Vec<RunMode>,
}

/// Starts runs on a fixed cadence and relays operator commands to active runs.
///
/// The scheduler never touches legs. It only creates empty run rows, which the mode's
/// controller attaches to and materializes, and flips run statuses.
pub struct RunScheduler {
    store: Arc<dyn RunStore>,
    modes: Vec<RuntimeSettings>,
    interval: Duration,
}

impl RunScheduler {
    pub fn new(store: Arc<dyn RunStore>, modes: Vec<RuntimeSettings>, interval: Duration) -> Self {
        Self { store, modes, interval }
    }

    pub async fn run(self) {
        info!(modes = self.modes.len(), interval_secs = self.interval.as_secs(), "Run scheduler started.");
        loop {
            match self.tick(Utc::now()).await {
                Ok(report) => debug!(?report, "Scheduler cycle complete."),
                Err(e) => error!(error = %e, "Scheduler cycle failed; retrying next interval."),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received. Stopping scheduler.");
                    break;
                }
            }
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<SchedulerReport, EngineError> {
        let mut report = SchedulerReport::default();

        let mut active = Vec::new();
        for settings in &self.modes {
            if let Some(run) = self.store.get_active_run(settings.mode).await? {
                active.push(run);
            }
        }

        // Commands wait in the queue while nothing is active to receive them.
        if !active.is_empty() {
            report.command = self.relay_command(&active, now).await?;
        }

        for settings in &self.modes {
            let settings = self.resolve(settings).await;
            if self.maybe_create_run(&settings, now).await? {
                report.created.push(settings.mode);
            }
        }

        Ok(report)
    }

    async fn resolve(&self, base: &RuntimeSettings) -> RuntimeSettings {
        match self.store.get_runtime_overrides(base.mode).await {
            Ok(overrides) => base.with_overrides(&overrides).unwrap_or_else(|e| {
                warn!(mode = %base.mode, error = %e, "Runtime overrides rejected; using file settings.");
                base.clone()
            }),
            Err(e) => {
                warn!(mode = %base.mode, error = %e, "Could not read runtime overrides; using file settings.");
                base.clone()
            }
        }
    }

    /// Applies the oldest unacknowledged command to every active run and acknowledges
    /// it in the same transaction.
    async fn relay_command(&self, active: &[Run], now: DateTime<Utc>) -> Result<Option<Command>, EngineError> {
        let Some(command) = self.store.read_unacknowledged_command(SCHEDULER_CONSUMER).await? else {
            return Ok(None);
        };

        let mut batch = WriteBatch::new();
        match command.kind.target_status() {
            Some(target) => {
                for run in active {
                    if !transition_allowed(run.status, target) {
                        continue;
                    }
                    info!(mode = %run.mode, run_id = %run.run_id, command = %command.kind, "Applying command.");
                    batch.update_run_status(run.run_id, target).insert_event(
                        NewEvent::info(
                            now,
                            EventType::CommandAck,
                            format!("{} (command {}): {} -> {}", command.kind, command.id, run.status, target),
                        )
                        .for_run(run.run_id),
                    );
                }
                if batch.is_empty() {
                    batch.insert_event(NewEvent::info(
                        now,
                        EventType::CommandAck,
                        format!("{} (command {}): no run needed a change", command.kind, command.id),
                    ));
                }
            }
            None => {
                debug!(command = %command.kind, "Command recorded but not acted on.");
                let payload = command.payload.as_deref().unwrap_or("");
                batch.insert_event(NewEvent::info(
                    now,
                    EventType::CommandIgnored,
                    format!("{} (command {}) {}", command.kind, command.id, payload).trim_end().to_string(),
                ));
            }
        }

        self.store.acknowledge_command(SCHEDULER_CONSUMER, command.id, batch).await?;
        Ok(Some(command))
    }

    /// Creates the day's run for one mode when every gate passes. Returns whether a
    /// run was created.
    async fn maybe_create_run(&self, settings: &RuntimeSettings, now: DateTime<Utc>) -> Result<bool, EngineError> {
        let mode = settings.mode;
        if !settings.enabled {
            return Ok(false);
        }
        // A stopped run still holds the slot until its controller closes the legs.
        if self.store.get_unfinished_run(mode).await?.is_some() {
            return Ok(false);
        }

        let trading_day = is_trading_day(now, settings);
        let time_reached = entry_time_reached(now, settings);
        let latest = self.store.get_latest_run(mode).await?;
        let fresh_day = !started_today(latest.as_ref(), now);
        if !(trading_day && time_reached && fresh_day) {
            return Ok(false);
        }

        if mode == RunMode::Live && settings.initial_balance.is_none() {
            error!(%mode, "No initial balance configured; not scheduling a live run.");
            self.store
                .insert_event(NewEvent::error(
                    now,
                    EventType::InitialBalanceRequired,
                    "live.initial_balance must be set before a live run can be scheduled",
                ))
                .await?;
            return Ok(false);
        }

        let run = new_run(settings, now);
        let mut batch = WriteBatch::new();
        batch.insert_event(
            NewEvent::info(now, EventType::RunCreated, format!("{} run scheduled for {}", mode, settings.entry_time_utc))
                .for_run(run.run_id),
        );
        match self.store.create_run(&run, batch).await {
            Ok(()) => {
                info!(%mode, run_id = %run.run_id, "Scheduled new run.");
                Ok(true)
            }
            Err(DbError::ActiveRunExists(_)) => {
                debug!(%mode, "Slot claimed by another process.");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn transition_allowed(from: RunStatus, to: RunStatus) -> bool {
    matches!(
        (from, to),
        (RunStatus::Running, RunStatus::Paused)
            | (RunStatus::Paused, RunStatus::Running)
            | (RunStatus::Running | RunStatus::Paused, RunStatus::Stopped)
    )
}
