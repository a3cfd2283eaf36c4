use crate::error::EngineError;
use crate::reconciler::{Reconciliation, price_map, reconcile};
use crate::util::{current_window_start, in_entry_window, new_run, run_params, started_since};
use api_client::Gateway;
use chrono::{DateTime, Utc};
use configuration::RuntimeSettings;
use core_types::{
    ExitReason, Leg, LegPlan, LegStatus, OrderAction, OrderRecord, Run, RunMode, RunStatus,
    Snapshot,
};
use database::{DbError, RunStore, WriteBatch};
use events::{EventType, NewEvent};
use executor::{ExecutorError, Fill, LegBook, LegExecutor, TrackedLeg};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use strategies::{DecisionEngine, DecisionParams};
use tracing::{debug, error, info, warn};

/// Where a controller is in a run's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No run held.
    Idle,
    /// Holding a run whose legs have not been opened yet.
    Opening,
    /// Tracking open legs.
    Live,
    /// The held run ended this tick. The next tick starts from idle.
    Closed,
}

struct HeldRun {
    run: Run,
    book: LegBook,
    /// False until the run's plan has been submitted and its legs persisted.
    materialized: bool,
    /// Set once a portfolio exit fired; remaining legs keep closing under it.
    pending_exit: Option<ExitReason>,
}

type Submission = (LegPlan, Result<Fill, ExecutorError>);

/// Writes that record orders already sent but could not be stored. They are retried
/// before anything else so the orders are never sent twice.
struct Unsaved {
    batch: WriteBatch,
    held: Option<HeldRun>,
    phase: Phase,
}

/// The unified run state machine. One instance runs per mode; paper and live differ
/// only in the `LegExecutor` they are given.
///
/// The controller keeps no state the store cannot rebuild: the held run and its leg
/// book are reconstructed from persisted rows whenever it starts or a tick fails.
pub struct RunController {
    mode: RunMode,
    base_settings: RuntimeSettings,
    gateway: Arc<dyn Gateway>,
    executor: Arc<dyn LegExecutor>,
    store: Arc<dyn RunStore>,
    held: Option<HeldRun>,
    unsaved: Option<Unsaved>,
    phase: Phase,
    poll_interval: Duration,
    reported_untracked: HashSet<String>,
    last_override_error: Option<String>,
}

impl RunController {
    pub fn new(
        settings: RuntimeSettings,
        gateway: Arc<dyn Gateway>,
        executor: Arc<dyn LegExecutor>,
        store: Arc<dyn RunStore>,
    ) -> Result<Self, EngineError> {
        if executor.mode() != settings.mode {
            return Err(EngineError::Configuration(format!(
                "{} executor cannot drive {} settings",
                executor.mode(),
                settings.mode
            )));
        }
        Ok(Self {
            mode: settings.mode,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            base_settings: settings,
            gateway,
            executor,
            store,
            held: None,
            unsaved: None,
            phase: Phase::Idle,
            reported_untracked: HashSet::new(),
            last_override_error: None,
        })
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn held_run(&self) -> Option<&Run> {
        self.held.as_ref().map(|h| &h.run)
    }

    pub fn book(&self) -> Option<&LegBook> {
        self.held.as_ref().map(|h| &h.book)
    }

    /// The main loop. Each tick runs to completion, including its store transaction,
    /// before the controller sleeps or honours a shutdown signal.
    pub async fn run(mut self) {
        info!(mode = %self.mode, "Run controller started.");
        loop {
            match self.tick(Utc::now()).await {
                Ok(phase) => debug!(mode = %self.mode, ?phase, "Tick complete."),
                Err(e) => error!(mode = %self.mode, error = %e, "Tick failed; retrying next interval."),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!(mode = %self.mode, "Shutdown signal received. Stopping controller.");
                    break;
                }
            }
        }
    }

    /// One poll → decide → reconcile → persist cycle.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Phase, EngineError> {
        let settings = self.current_settings(now).await;
        self.poll_interval = Duration::from_secs(settings.poll_interval_secs);

        if let Some(unsaved) = self.unsaved.take() {
            return self.retry_unsaved(unsaved).await;
        }

        match self.step(now, &settings).await {
            Ok(phase) => {
                self.phase = phase;
                Ok(phase)
            }
            Err(e) => {
                // Whatever this tick changed in memory may not be in the store.
                self.held = None;
                self.phase = Phase::Idle;
                Err(e)
            }
        }
    }

    async fn retry_unsaved(&mut self, unsaved: Unsaved) -> Result<Phase, EngineError> {
        if let Err(e) = self.store.apply(unsaved.batch.clone()).await {
            self.unsaved = Some(unsaved);
            return Err(e.into());
        }
        info!(mode = %self.mode, writes = unsaved.batch.len(), "Stored writes held back by a failed tick.");
        self.held = unsaved.held;
        self.phase = unsaved.phase;
        Ok(unsaved.phase)
    }

    /// Stores a batch that records orders already sent. On failure the batch and the
    /// projection it belongs to are parked for [`Self::retry_unsaved`].
    async fn commit(&mut self, batch: WriteBatch, held: Option<HeldRun>, phase: Phase) -> Result<Phase, EngineError> {
        match self.store.apply(batch.clone()).await {
            Ok(()) => {
                self.held = held;
                Ok(phase)
            }
            Err(e) => {
                error!(mode = %self.mode, error = %e, "Failed to store sent orders; retrying next tick.");
                self.unsaved = Some(Unsaved { batch, held, phase });
                Err(e.into())
            }
        }
    }

    async fn step(&mut self, now: DateTime<Utc>, settings: &RuntimeSettings) -> Result<Phase, EngineError> {
        if self.held.is_none() {
            if let Some(run) = self.store.get_unfinished_run(self.mode).await? {
                self.attach(run, now).await?;
            }
        }

        match self.held.take() {
            None => self.idle(now, settings).await,
            Some(held) => self.drive(held, now, settings).await,
        }
    }

    /// The settings snapshot for this tick: file settings with the store's overrides.
    /// A bad override set is rejected as a whole and the file settings are used.
    async fn current_settings(&mut self, now: DateTime<Utc>) -> RuntimeSettings {
        let overrides = match self.store.get_runtime_overrides(self.mode).await {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!(mode = %self.mode, error = %e, "Could not read runtime overrides; using file settings.");
                return self.base_settings.clone();
            }
        };

        match self.base_settings.with_overrides(&overrides) {
            Ok(settings) => {
                self.last_override_error = None;
                settings
            }
            Err(e) => {
                let message = e.to_string();
                if self.last_override_error.as_deref() != Some(message.as_str()) {
                    warn!(mode = %self.mode, error = %message, "Runtime overrides rejected; using file settings.");
                    let event = NewEvent::warn(now, EventType::OverridesRejected, format!("[{}] {}", self.mode, message));
                    if let Err(e) = self.store.insert_event(event).await {
                        warn!(mode = %self.mode, error = %e, "Failed to record rejected overrides.");
                    }
                    self.last_override_error = Some(message);
                }
                self.base_settings.clone()
            }
        }
    }

    /// Rebuilds the in-memory projection of an unfinished run from its rows.
    async fn attach(&mut self, run: Run, now: DateTime<Utc>) -> Result<(), EngineError> {
        let rows = self.store.get_legs(run.run_id).await?;
        let book = LegBook::from_rows(&rows, run.leverage);
        info!(
            mode = %self.mode,
            run_id = %run.run_id,
            open_legs = book.len(),
            realized_pnl = %book.realized_pnl(),
            "Attached to unfinished run."
        );
        self.store
            .insert_event(
                NewEvent::info(
                    now,
                    EventType::RunAttached,
                    format!("attached with {} open legs", book.len()),
                )
                .for_run(run.run_id),
            )
            .await?;
        self.held = Some(HeldRun { materialized: !rows.is_empty(), run, book, pending_exit: None });
        Ok(())
    }

    // --- Idle ---------------------------------------------------------------

    async fn idle(&mut self, now: DateTime<Utc>, settings: &RuntimeSettings) -> Result<Phase, EngineError> {
        if !settings.enabled {
            return Ok(Phase::Idle);
        }
        let Some(window_start) = current_window_start(now, settings) else {
            return Ok(Phase::Idle);
        };
        let latest = self.store.get_latest_run(self.mode).await?;
        if started_since(latest.as_ref(), window_start) {
            debug!(mode = %self.mode, "A run already started in this entry window; staying idle.");
            return Ok(Phase::Idle);
        }
        if self.refuse_without_balance(settings.initial_balance, None, now).await? {
            return Ok(Phase::Idle);
        }

        let plan = self.build_plan(&DecisionParams::from(settings)).await?;
        if plan.is_empty() {
            warn!(mode = %self.mode, "Leg plan is empty; no run created.");
            self.store
                .insert_event(NewEvent::warn(now, EventType::NoLegs, "no eligible legs; run not created"))
                .await?;
            return Ok(Phase::Idle);
        }

        // The run row exists before any order is sent.
        let mut run = new_run(settings, now);
        run.opening_ts = Some(now);
        let mut create = WriteBatch::new();
        create.insert_event(
            NewEvent::info(now, EventType::RunCreated, format!("{} run created", self.mode)).for_run(run.run_id),
        );
        match self.store.create_run(&run, create).await {
            Ok(()) => {}
            Err(DbError::ActiveRunExists(_)) => {
                warn!(mode = %self.mode, "Slot claimed concurrently; attaching next tick.");
                return Ok(Phase::Idle);
            }
            Err(e) => return Err(e.into()),
        }

        info!(mode = %self.mode, run_id = %run.run_id, legs = plan.len(), "Opening new run.");
        let held = HeldRun { run, book: LegBook::new(), materialized: false, pending_exit: None };
        self.materialize(held, &plan, now).await
    }

    /// Emits the recurring diagnostic when a live run has no initial balance to report
    /// against. Returns whether opening must be refused.
    async fn refuse_without_balance(
        &self,
        configured: Option<Decimal>,
        run_id: Option<uuid::Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        if self.mode != RunMode::Live || configured.is_some() {
            return Ok(false);
        }
        error!(mode = %self.mode, "No initial balance configured; refusing to open a live run.");
        let mut event = NewEvent::error(
            now,
            EventType::InitialBalanceRequired,
            "live.initial_balance must be set before a live run can open",
        );
        if let Some(run_id) = run_id {
            event = event.for_run(run_id);
        }
        self.store.insert_event(event).await?;
        Ok(true)
    }

    async fn build_plan(&self, params: &DecisionParams) -> Result<Vec<LegPlan>, EngineError> {
        let engine = DecisionEngine::new(params.clone())?;
        let tickers = self.gateway.get_tickers().await?;
        let candidates = engine.candidate_symbols(&tickers);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let specs = self.gateway.get_contract_specs(&candidates).await?;
        Ok(engine.build_leg_plan(&tickers, &specs)?)
    }

    async fn submit_plan(&self, plan: &[LegPlan]) -> Vec<Submission> {
        let mut submissions = Vec::with_capacity(plan.len());
        for leg in plan {
            let result = self.executor.open_leg(leg).await;
            if let Err(e) = &result {
                warn!(mode = %self.mode, symbol = %leg.symbol, error = %e, "Open failed; leg dropped.");
            }
            submissions.push((leg.clone(), result));
        }
        submissions
    }

    /// Turns open submissions into leg, order and event writes for `run`.
    fn record_opens(&self, run: &Run, submissions: &[Submission], now: DateTime<Utc>) -> (WriteBatch, LegBook) {
        let mut batch = WriteBatch::new();
        let mut book = LegBook::new();

        for (plan, result) in submissions {
            let fill = match result {
                Ok(fill) => fill,
                Err(e) => {
                    batch.insert_event(
                        NewEvent::warn(now, EventType::OrderRejected, format!("{} open failed: {}", plan.symbol, e))
                            .for_run(run.run_id),
                    );
                    continue;
                }
            };

            if let Some(warning) = &fill.leverage_warning {
                batch.insert_event(
                    NewEvent::warn(now, EventType::SetLeverageFailed, format!("{}: {}", plan.symbol, warning))
                        .for_run(run.run_id),
                );
            }
            batch.insert_order(OrderRecord {
                run_id: run.run_id,
                symbol: plan.symbol.clone(),
                action: OrderAction::Open,
                intent_price: plan.reference_price,
                fill_price: (!fill.is_rejected()).then_some(fill.price),
                qty: plan.size,
                status: fill.status,
                ts: now,
            });

            if fill.is_rejected() {
                let reason = fill.message.as_deref().unwrap_or("no reason given");
                warn!(mode = %self.mode, symbol = %plan.symbol, reason, "Open rejected.");
                batch.insert_event(
                    NewEvent::warn(now, EventType::OrderRejected, format!("{} open rejected: {}", plan.symbol, reason))
                        .for_run(run.run_id),
                );
                continue;
            }

            let leg = TrackedLeg::new(
                plan.symbol.clone(),
                fill.price,
                now,
                plan.size,
                plan.margin_usdt,
                plan.leverage,
            );
            batch.upsert_leg(leg_row(run.run_id, &leg));
            batch.insert_event(
                NewEvent::info(
                    now,
                    EventType::LegOpened,
                    format!("{} short {} @ {}", leg.symbol, leg.qty, leg.entry_price),
                )
                .for_run(run.run_id),
            );
            if let Err(e) = book.open(leg) {
                warn!(mode = %self.mode, error = %e, "Duplicate symbol in plan.");
            }
        }

        (batch, book)
    }

    // --- Held run -----------------------------------------------------------

    async fn drive(&mut self, mut held: HeldRun, now: DateTime<Utc>, settings: &RuntimeSettings) -> Result<Phase, EngineError> {
        // Status changes (pause, resume, close-all) arrive through the store.
        match self.store.get_run(held.run.run_id).await? {
            Some(run) if run.end_ts.is_none() => held.run = run,
            _ => {
                info!(mode = %self.mode, run_id = %held.run.run_id, "Run ended elsewhere; releasing it.");
                return Ok(Phase::Idle);
            }
        }

        if held.materialized {
            self.track(held, now, settings).await
        } else {
            self.open_held(held, now, settings).await
        }
    }

    /// Materializes a run that was created without legs, typically by the scheduler.
    async fn open_held(&mut self, mut held: HeldRun, now: DateTime<Utc>, settings: &RuntimeSettings) -> Result<Phase, EngineError> {
        let run_id = held.run.run_id;
        match held.run.status {
            RunStatus::Stopped => {
                let mut batch = WriteBatch::new();
                batch.end_run(run_id, RunStatus::Stopped, now).insert_event(
                    NewEvent::info(now, EventType::RunStopped, "stopped before any leg opened").for_run(run_id),
                );
                self.store.apply(batch).await?;
                return Ok(Phase::Closed);
            }
            RunStatus::Paused => {
                self.held = Some(held);
                return Ok(Phase::Opening);
            }
            _ => {}
        }

        if let Some(opening_ts) = held.run.opening_ts {
            error!(mode = %self.mode, %run_id, %opening_ts, "Run was interrupted while opening; not opening again.");
            let mut batch = WriteBatch::new();
            batch.end_run(run_id, RunStatus::Stopped, now).insert_event(
                NewEvent::error(
                    now,
                    EventType::OpenInterrupted,
                    format!("opening orders may have been sent at {} without being recorded; check the exchange", opening_ts),
                )
                .for_run(run_id),
            );
            self.store.apply(batch).await?;
            return Ok(Phase::Closed);
        }

        if !in_entry_window(now, settings) {
            warn!(mode = %self.mode, %run_id, "Entry window passed with no legs; expiring run.");
            let mut batch = WriteBatch::new();
            batch.end_run(run_id, RunStatus::Stopped, now).insert_event(
                NewEvent::warn(now, EventType::RunExpired, "entry window passed before any leg opened").for_run(run_id),
            );
            self.store.apply(batch).await?;
            return Ok(Phase::Closed);
        }

        let initial_balance = held.run.initial_balance.or(settings.initial_balance);
        if self.refuse_without_balance(initial_balance, Some(run_id), now).await? {
            self.held = Some(held);
            return Ok(Phase::Opening);
        }

        let plan = self.build_plan(&run_params(&held.run, settings)).await?;
        if plan.is_empty() {
            warn!(mode = %self.mode, %run_id, "Leg plan is empty; retrying next tick.");
            self.store
                .insert_event(NewEvent::warn(now, EventType::NoLegs, "no eligible legs this tick").for_run(run_id))
                .await?;
            self.held = Some(held);
            return Ok(Phase::Opening);
        }

        let mut marker = WriteBatch::new();
        marker.mark_run_opening(run_id, now);
        if held.run.initial_balance.is_none() {
            if let Some(balance) = initial_balance {
                marker.update_run_balance(run_id, Some(balance), balance);
            }
        }
        self.store.apply(marker).await?;
        held.run.opening_ts = Some(now);
        held.run.initial_balance = initial_balance;

        self.materialize(held, &plan, now).await
    }

    /// Sends the opening orders for a stored run and records the fills.
    async fn materialize(&mut self, mut held: HeldRun, plan: &[LegPlan], now: DateTime<Utc>) -> Result<Phase, EngineError> {
        let run_id = held.run.run_id;
        let submissions = self.submit_plan(plan).await;
        let (mut batch, book) = self.record_opens(&held.run, &submissions, now);

        if book.is_empty() {
            warn!(mode = %self.mode, %run_id, "Every open was rejected; run stopped.");
            batch.end_run(run_id, RunStatus::Stopped, now).insert_event(
                NewEvent::warn(now, EventType::NoLegs, "every open was rejected; run stopped").for_run(run_id),
            );
            return self.commit(batch, None, Phase::Closed).await;
        }

        batch.insert_event(
            NewEvent::info(now, EventType::RunStarted, format!("run started with {} legs", book.len())).for_run(run_id),
        );
        info!(mode = %self.mode, %run_id, legs = book.len(), "Run materialized.");
        held.book = book;
        held.materialized = true;
        self.commit(batch, Some(held), Phase::Live).await
    }

    /// The live → live tick: reconcile, mark, evaluate exits, persist.
    async fn track(&mut self, mut held: HeldRun, now: DateTime<Utc>, settings: &RuntimeSettings) -> Result<Phase, EngineError> {
        let engine = DecisionEngine::new(run_params(&held.run, settings))?;
        let tag = engine.params().strategy_tag.clone();
        let run_id = held.run.run_id;

        let observation = self.executor.observe().await?;
        let tickers = self.gateway.get_tickers().await?;
        let recon = reconcile(&mut held.book, &observation, &price_map(&tickers));

        let mut batch = WriteBatch::new();
        self.apply_reconciliation(&mut held, &recon, now, &mut batch)?;

        if held.run.status == RunStatus::Stopped {
            self.close_remaining(&mut held, &recon.marks, ExitReason::CloseAll, now, &mut batch).await;
            if held.book.is_empty() {
                info!(mode = %self.mode, %run_id, "All legs closed on request; run stopped.");
                self.record_balance(&held, observation.account_equity, Decimal::ZERO, &mut batch);
                batch.end_run(run_id, RunStatus::Stopped, now).insert_event(
                    NewEvent::info(now, EventType::RunStopped, ExitReason::CloseAll.as_str()).for_run(run_id),
                );
                return self.commit(batch, None, Phase::Closed).await;
            }
            let (unrealized, _) = mark_to_market(&held.book, &recon.marks);
            self.record_balance(&held, observation.account_equity, unrealized, &mut batch);
            return self.commit(batch, Some(held), Phase::Live).await;
        }

        let running = held.run.status == RunStatus::Running;
        let mut leg_exits = Vec::new();
        for symbol in held.book.symbols() {
            let Some(mark) = recon.marks.get(&symbol).copied() else {
                continue;
            };
            let Some(leg) = held.book.get_mut(&symbol) else {
                continue;
            };
            let pnl = leg.unrealized_pnl(mark);
            if leg.observe(pnl) {
                batch.update_leg_high_water_marks(
                    run_id,
                    symbol.as_str(),
                    leg.max_favorable_pnl_usdt,
                    leg.max_adverse_pnl_usdt,
                    leg.max_pnl_pct,
                );
            }
            batch.insert_snapshot(snapshot(&held.run, leg, mark, now));

            if running && engine.evaluate_leg_exit(leg.pnl_pct(pnl), leg.max_pnl_pct, &tag).is_exit() {
                leg_exits.push((symbol, mark));
            }
        }

        if !running {
            // Paused: observe only.
            let (unrealized, _) = mark_to_market(&held.book, &recon.marks);
            self.record_balance(&held, observation.account_equity, unrealized, &mut batch);
            return self.commit(batch, Some(held), Phase::Live).await;
        }

        for (symbol, mark) in leg_exits {
            self.close_one(&mut held, &symbol, mark, ExitReason::LegTrailingSl, now, &mut batch).await;
        }

        if held.book.is_empty() {
            return self.complete(held, ExitReason::AllLegsClosed, observation.account_equity, now, batch).await;
        }

        let exit = match held.pending_exit {
            Some(reason) => Some(reason),
            None => {
                let (unrealized, margin) = mark_to_market(&held.book, &recon.marks);
                let pnl_pct = if margin > Decimal::ZERO { unrealized / margin } else { Decimal::ZERO };
                engine
                    .evaluate_portfolio_exit(pnl_pct, held.run.hours_elapsed(now), &tag)
                    .reason()
            }
        };

        if let Some(reason) = exit {
            info!(mode = %self.mode, %run_id, reason = %reason, "Portfolio exit triggered.");
            held.pending_exit = Some(reason);
            self.close_remaining(&mut held, &recon.marks, reason, now, &mut batch).await;
            if held.book.is_empty() {
                return self.complete(held, reason, observation.account_equity, now, batch).await;
            }
        }

        let (unrealized, _) = mark_to_market(&held.book, &recon.marks);
        self.record_balance(&held, observation.account_equity, unrealized, &mut batch);
        self.commit(batch, Some(held), Phase::Live).await
    }

    fn apply_reconciliation(
        &mut self,
        held: &mut HeldRun,
        recon: &Reconciliation,
        now: DateTime<Utc>,
        batch: &mut WriteBatch,
    ) -> Result<(), EngineError> {
        let run_id = held.run.run_id;

        for symbol in &recon.untracked {
            if self.reported_untracked.insert(symbol.clone()) {
                warn!(mode = %self.mode, %symbol, "Exchange reports a short this run does not track.");
                batch.insert_event(
                    NewEvent::warn(now, EventType::UntrackedPosition, format!("{} is open on the exchange but not tracked", symbol))
                        .for_run(run_id),
                );
            }
        }
        for symbol in &recon.unpriced {
            warn!(mode = %self.mode, %symbol, "No price this tick; leg skipped.");
        }
        for symbol in &recon.resynced {
            if let Some(leg) = held.book.get(symbol) {
                debug!(mode = %self.mode, %symbol, qty = %leg.qty, "Leg resynced from exchange.");
                batch.upsert_leg(leg_row(run_id, leg));
            }
        }
        for close in &recon.external_closes {
            let leg = held.book.close(&close.symbol, close.exit_price)?;
            info!(mode = %self.mode, symbol = %close.symbol, price = %close.exit_price, "Leg closed outside the controller.");
            batch
                .insert_snapshot(snapshot(&held.run, &leg, close.exit_price, now))
                .close_leg(run_id, close.symbol.as_str(), close.exit_price, now, ExitReason::External.as_str())
                .insert_event(
                    NewEvent::info(
                        now,
                        EventType::LegClosedExternal,
                        format!("{} closed externally @ {}", close.symbol, close.exit_price),
                    )
                    .for_run(run_id),
                );
        }
        Ok(())
    }

    async fn close_remaining(
        &self,
        held: &mut HeldRun,
        marks: &BTreeMap<String, Decimal>,
        reason: ExitReason,
        now: DateTime<Utc>,
        batch: &mut WriteBatch,
    ) {
        for symbol in held.book.symbols() {
            let mark = marks
                .get(&symbol)
                .copied()
                .or_else(|| held.book.get(&symbol).map(|leg| leg.entry_price))
                .unwrap_or(Decimal::ZERO);
            self.close_one(held, &symbol, mark, reason, now, batch).await;
        }
    }

    /// Submits one close. A failed or rejected close leaves the leg open for the next tick.
    async fn close_one(
        &self,
        held: &mut HeldRun,
        symbol: &str,
        mark: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
        batch: &mut WriteBatch,
    ) {
        let run_id = held.run.run_id;
        let Some(qty) = held.book.get(symbol).map(|leg| leg.qty) else {
            return;
        };

        let fill = match self.executor.close_leg(symbol, qty, mark).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!(mode = %self.mode, symbol, error = %e, "Close failed; retrying next tick.");
                batch.insert_event(
                    NewEvent::warn(now, EventType::OrderRejected, format!("{} close failed: {}", symbol, e)).for_run(run_id),
                );
                return;
            }
        };

        batch.insert_order(OrderRecord {
            run_id,
            symbol: symbol.to_string(),
            action: OrderAction::Close,
            intent_price: mark,
            fill_price: (!fill.is_rejected()).then_some(fill.price),
            qty,
            status: fill.status,
            ts: now,
        });
        if fill.is_rejected() {
            let message = fill.message.as_deref().unwrap_or("no reason given");
            warn!(mode = %self.mode, symbol, reason = message, "Close rejected.");
            batch.insert_event(
                NewEvent::warn(now, EventType::OrderRejected, format!("{} close rejected: {}", symbol, message)).for_run(run_id),
            );
            return;
        }

        match held.book.close(symbol, fill.price) {
            Ok(leg) => {
                let pnl = leg.unrealized_pnl(fill.price);
                info!(mode = %self.mode, symbol, price = %fill.price, %pnl, reason = %reason, "Leg closed.");
                batch.close_leg(run_id, symbol, fill.price, now, reason.as_str()).insert_event(
                    NewEvent::info(
                        now,
                        EventType::LegClosed,
                        format!("{} closed @ {} ({}), pnl {}", symbol, fill.price, reason, pnl),
                    )
                    .for_run(run_id),
                );
            }
            Err(e) => warn!(mode = %self.mode, symbol, error = %e, "Closed leg was not in the book."),
        }
    }

    /// Ends the run as completed in the same transaction as the tick's other writes.
    async fn complete(
        &mut self,
        held: HeldRun,
        reason: ExitReason,
        equity: Option<Decimal>,
        now: DateTime<Utc>,
        mut batch: WriteBatch,
    ) -> Result<Phase, EngineError> {
        let run_id = held.run.run_id;
        self.record_balance(&held, equity, Decimal::ZERO, &mut batch);
        batch.end_run(run_id, RunStatus::Completed, now).insert_event(
            NewEvent::info(
                now,
                EventType::RunCompleted,
                format!("{}; realized pnl {}", reason, held.book.realized_pnl()),
            )
            .for_run(run_id),
        );
        info!(mode = %self.mode, %run_id, reason = %reason, realized_pnl = %held.book.realized_pnl(), "Run completed.");
        self.commit(batch, None, Phase::Closed).await
    }

    /// Live runs report exchange equity. Paper runs report initial + realized + unrealized.
    fn record_balance(&self, held: &HeldRun, equity: Option<Decimal>, unrealized: Decimal, batch: &mut WriteBatch) {
        let run_id = held.run.run_id;
        match self.mode {
            RunMode::Live => {
                if let Some(equity) = equity {
                    batch.update_run_balance(run_id, None, equity);
                }
            }
            RunMode::Paper => {
                if let Some(initial) = held.run.initial_balance {
                    batch.update_run_balance(run_id, None, initial + held.book.realized_pnl() + unrealized);
                }
            }
        }
    }
}

/// Unrealized pnl and margin across the priced legs.
fn mark_to_market(book: &LegBook, marks: &BTreeMap<String, Decimal>) -> (Decimal, Decimal) {
    book.legs()
        .filter_map(|leg| marks.get(&leg.symbol).map(|mark| (leg.unrealized_pnl(*mark), leg.margin_usdt)))
        .fold((Decimal::ZERO, Decimal::ZERO), |(pnl, margin), (p, m)| (pnl + p, margin + m))
}

fn leg_row(run_id: uuid::Uuid, leg: &TrackedLeg) -> Leg {
    Leg {
        run_id,
        symbol: leg.symbol.clone(),
        entry_price: leg.entry_price,
        entry_ts: leg.entry_ts,
        qty: leg.qty,
        margin_usdt: leg.margin_usdt,
        status: LegStatus::Open,
        exit_price: None,
        exit_ts: None,
        exit_reason: None,
        max_favorable_pnl_usdt: leg.max_favorable_pnl_usdt,
        max_adverse_pnl_usdt: leg.max_adverse_pnl_usdt,
        max_pnl_pct: leg.max_pnl_pct,
    }
}

fn snapshot(run: &Run, leg: &TrackedLeg, price: Decimal, now: DateTime<Utc>) -> Snapshot {
    Snapshot {
        ts: now,
        run_id: run.run_id,
        exchange: run.exchange.clone(),
        symbol: leg.symbol.clone(),
        price,
        unrealized_pnl_usdt: leg.unrealized_pnl(price),
        entry_price: leg.entry_price,
        position_size: leg.qty,
        margin_usdt: leg.margin_usdt,
        leverage: leg.leverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use core_types::StrategyTag;
    use database::MemoryStore;
    use rust_decimal_macros::dec;

    async fn active_run(store: &MemoryStore, mode: RunMode) -> Run {
        store.get_active_run(mode).await.unwrap().expect("active run")
    }

    fn count(store: &MemoryStore, event_type: EventType) -> usize {
        store.events().iter().filter(|e| e.is(event_type)).count()
    }

    #[tokio::test]
    async fn paper_run_opens_only_inside_entry_window() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = paper_controller(&store, &gateway, paper_settings());

        assert_eq!(controller.tick(at(3, 30)).await.unwrap(), Phase::Idle);
        assert!(store.runs().is_empty());

        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Live);
        let run = active_run(&store, RunMode::Paper).await;
        let legs = store.get_legs(run.run_id).await.unwrap();
        let symbols: Vec<&str> = legs.iter().map(|l| l.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["CUSDT", "L1USDT", "L2USDT", "L3USDT", "L4USDT", "L5USDT"]);
        assert!(legs.iter().all(|l| l.qty == dec!(30) && l.status == LegStatus::Open));
        assert_eq!(store.orders().len(), 6);
        assert_eq!(count(&store, EventType::RunCreated), 1);
        assert_eq!(count(&store, EventType::RunStarted), 1);
    }

    #[tokio::test]
    async fn empty_plan_warns_and_creates_no_run() {
        let store = Arc::new(MemoryStore::new());
        let pumped = vec![ticker("AUSDT", dec!(0.20), dec!(10)), ticker("BUSDT", dec!(0.15), dec!(10))];
        let gateway = Arc::new(FakeGateway::with_tickers(pumped));
        let mut controller = paper_controller(&store, &gateway, paper_settings());

        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Idle);
        assert!(store.runs().is_empty());
        assert_eq!(count(&store, EventType::NoLegs), 1);
    }

    #[tokio::test]
    async fn restart_reproduces_legs_marks_and_realized_pnl() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut settings = paper_settings();
        settings.strategy_tag = StrategyTag::S3;
        let mut controller = paper_controller(&store, &gateway, settings.clone());

        controller.tick(at(4, 5)).await.unwrap();
        // +102 on 100 margin: the trailing stop arms.
        gateway.set_price("CUSDT", dec!(6.6));
        assert_eq!(controller.tick(at(4, 10)).await.unwrap(), Phase::Live);
        // Retraced to +84, more than 5 points below the high-water mark.
        gateway.set_price("CUSDT", dec!(7.2));
        assert_eq!(controller.tick(at(4, 15)).await.unwrap(), Phase::Live);

        let before = controller.book().cloned().unwrap();
        assert_eq!(before.len(), 5);
        assert_eq!(before.realized_pnl(), dec!(84));

        let run = active_run(&store, RunMode::Paper).await;
        let closed = store.get_legs(run.run_id).await.unwrap().into_iter().find(|l| l.symbol == "CUSDT").unwrap();
        assert_eq!(closed.exit_reason.as_deref(), Some("leg_trailing_sl"));
        assert_eq!(closed.max_pnl_pct, dec!(1.02));

        let mut restarted = paper_controller(&store, &gateway, settings);
        assert_eq!(restarted.tick(at(4, 20)).await.unwrap(), Phase::Live);
        assert_eq!(restarted.book().unwrap(), &before);
        assert_eq!(restarted.held_run().map(|r| r.run_id), Some(run.run_id));
    }

    #[tokio::test]
    async fn kill_switch_closes_every_leg_and_completes_once() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = paper_controller(&store, &gateway, paper_settings());
        controller.tick(at(4, 5)).await.unwrap();
        let run_id = active_run(&store, RunMode::Paper).await.run_id;

        // -36 per leg on 100 margin.
        gateway.set_all_prices(dec!(11.2));
        assert_eq!(controller.tick(at(4, 10)).await.unwrap(), Phase::Closed);

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.end_ts, Some(at(4, 10)));
        assert_eq!(run.current_balance, Some(dec!(784)));
        let legs = store.get_legs(run_id).await.unwrap();
        assert!(legs.iter().all(|l| l.exit_reason.as_deref() == Some("kill_switch")));
        assert_eq!(count(&store, EventType::RunCompleted), 1);

        // Same window, same day: no second run.
        gateway.set_all_prices(dec!(10));
        assert_eq!(controller.tick(at(4, 15)).await.unwrap(), Phase::Idle);
        assert_eq!(store.runs().len(), 1);
    }

    #[tokio::test]
    async fn hold_limit_completes_the_run() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = paper_controller(&store, &gateway, paper_settings());
        controller.tick(at(4, 5)).await.unwrap();
        let run_id = active_run(&store, RunMode::Paper).await.run_id;

        assert_eq!(controller.tick(on(5, 4, 6)).await.unwrap(), Phase::Closed);
        let legs = store.get_legs(run_id).await.unwrap();
        assert!(legs.iter().all(|l| l.exit_reason.as_deref() == Some("24h")));
    }

    #[tokio::test]
    async fn paused_run_observes_without_trading() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = paper_controller(&store, &gateway, paper_settings());
        controller.tick(at(4, 5)).await.unwrap();
        let run_id = active_run(&store, RunMode::Paper).await.run_id;

        let mut pause = WriteBatch::new();
        pause.update_run_status(run_id, RunStatus::Paused);
        store.apply(pause).await.unwrap();

        gateway.set_all_prices(dec!(11.2));
        assert_eq!(controller.tick(at(4, 10)).await.unwrap(), Phase::Live);
        let legs = store.get_legs(run_id).await.unwrap();
        assert!(legs.iter().all(|l| l.status == LegStatus::Open));
        assert_eq!(legs[0].max_adverse_pnl_usdt, dec!(-36));
        assert_eq!(store.snapshots().len(), 6);
        assert_eq!(store.orders().len(), 6);

        let mut resume = WriteBatch::new();
        resume.update_run_status(run_id, RunStatus::Running);
        store.apply(resume).await.unwrap();
        assert_eq!(controller.tick(at(4, 15)).await.unwrap(), Phase::Closed);
    }

    #[tokio::test]
    async fn stopped_run_closes_all_legs() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = paper_controller(&store, &gateway, paper_settings());
        controller.tick(at(4, 5)).await.unwrap();
        let run_id = active_run(&store, RunMode::Paper).await.run_id;

        let mut stop = WriteBatch::new();
        stop.update_run_status(run_id, RunStatus::Stopped);
        store.apply(stop).await.unwrap();

        assert_eq!(controller.tick(at(4, 10)).await.unwrap(), Phase::Closed);
        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Stopped);
        assert!(run.end_ts.is_some());
        let legs = store.get_legs(run_id).await.unwrap();
        assert!(legs.iter().all(|l| l.exit_reason.as_deref() == Some("close_all")));
        assert!(store.get_unfinished_run(RunMode::Paper).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_leg_closed_on_the_exchange_is_recorded_as_manual() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        gateway.set_equity(dec!(1010));
        let mut controller = live_controller(&store, &gateway, live_settings(Some(dec!(1000))));

        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Live);
        assert_eq!(gateway.position_symbols().len(), 6);

        gateway.drop_position("CUSDT");
        gateway.set_price("CUSDT", dec!(9));
        assert_eq!(controller.tick(at(4, 10)).await.unwrap(), Phase::Live);

        let run = active_run(&store, RunMode::Live).await;
        let leg = store.get_legs(run.run_id).await.unwrap().into_iter().find(|l| l.symbol == "CUSDT").unwrap();
        assert_eq!(leg.status, LegStatus::Closed);
        assert_eq!(leg.exit_reason.as_deref(), Some("manual"));
        assert_eq!(leg.exit_price, Some(dec!(9)));
        assert_eq!(count(&store, EventType::LegClosedExternal), 1);
        assert!(store.snapshots().iter().any(|s| s.symbol == "CUSDT" && s.price == dec!(9)));
        assert_eq!(run.current_balance, Some(dec!(1010)));
        assert_eq!(controller.book().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn live_run_without_initial_balance_is_refused_every_tick() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = live_controller(&store, &gateway, live_settings(None));

        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Idle);
        assert_eq!(controller.tick(at(4, 6)).await.unwrap(), Phase::Idle);
        assert_eq!(count(&store, EventType::InitialBalanceRequired), 2);
        assert!(store.runs().is_empty());
        assert!(gateway.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_opens_are_audited_and_dropped() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        gateway.reject("CUSDT");
        let mut controller = live_controller(&store, &gateway, live_settings(Some(dec!(1000))));

        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Live);
        let run = active_run(&store, RunMode::Live).await;
        assert_eq!(store.get_legs(run.run_id).await.unwrap().len(), 5);
        let rejected: Vec<_> = store.orders().into_iter().filter(|o| o.status == core_types::OrderStatus::Rejected).collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].symbol, "CUSDT");
        assert_eq!(count(&store, EventType::OrderRejected), 1);
    }

    #[tokio::test]
    async fn scheduled_run_is_materialized_inside_the_window() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let settings = paper_settings();
        let scheduled = new_run(&settings, at(4, 0));
        store.create_run(&scheduled, WriteBatch::new()).await.unwrap();

        let mut controller = paper_controller(&store, &gateway, settings);
        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Live);
        assert_eq!(store.runs().len(), 1);
        assert_eq!(store.get_legs(scheduled.run_id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn scheduled_run_expires_once_the_window_passes() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let settings = paper_settings();
        let scheduled = new_run(&settings, at(4, 0));
        store.create_run(&scheduled, WriteBatch::new()).await.unwrap();

        let mut controller = paper_controller(&store, &gateway, settings);
        assert_eq!(controller.tick(at(5, 30)).await.unwrap(), Phase::Closed);
        let run = store.get_run(scheduled.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Stopped);
        assert_eq!(run.end_ts, Some(at(5, 30)));
        assert_eq!(count(&store, EventType::RunExpired), 1);
        assert!(gateway.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_aborts_the_tick_and_recovers_from_rows() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = paper_controller(&store, &gateway, paper_settings());
        controller.tick(at(4, 5)).await.unwrap();

        gateway.fail_tickers(true);
        assert!(controller.tick(at(4, 10)).await.is_err());
        assert!(store.snapshots().is_empty());

        gateway.fail_tickers(false);
        assert_eq!(controller.tick(at(4, 15)).await.unwrap(), Phase::Live);
        assert_eq!(controller.book().unwrap().len(), 6);
        assert_eq!(count(&store, EventType::RunAttached), 1);
    }

    #[tokio::test]
    async fn failed_store_write_rolls_back_the_whole_tick() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = paper_controller(&store, &gateway, paper_settings());
        controller.tick(at(4, 5)).await.unwrap();
        let run_id = active_run(&store, RunMode::Paper).await.run_id;

        gateway.set_all_prices(dec!(11.2));
        store.fail_next_apply();
        assert!(controller.tick(at(4, 10)).await.is_err());
        let legs = store.get_legs(run_id).await.unwrap();
        assert!(legs.iter().all(|l| l.status == LegStatus::Open));
        assert!(store.snapshots().is_empty());

        assert_eq!(controller.tick(at(4, 15)).await.unwrap(), Phase::Closed);
        assert_eq!(store.get_run(run_id).await.unwrap().unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn run_row_is_saved_before_any_order_is_sent() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = live_controller(&store, &gateway, live_settings(Some(dec!(1000))));

        store.fail_next_apply();
        assert!(controller.tick(at(4, 5)).await.is_err());
        assert!(store.runs().is_empty());
        assert!(gateway.orders.lock().unwrap().is_empty());

        assert_eq!(controller.tick(at(4, 6)).await.unwrap(), Phase::Live);
        assert_eq!(gateway.orders.lock().unwrap().len(), 6);
        assert_eq!(gateway.position_symbols().len(), 6);
        assert_eq!(store.runs().len(), 1);
    }

    #[tokio::test]
    async fn fills_that_fail_to_save_are_retried_without_reopening() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut controller = live_controller(&store, &gateway, live_settings(Some(dec!(1000))));

        // The run row lands, the batch recording the fills does not.
        store.fail_apply_after(1);
        assert!(controller.tick(at(4, 5)).await.is_err());
        assert_eq!(gateway.position_symbols().len(), 6);
        let run = active_run(&store, RunMode::Live).await;
        assert_eq!(run.opening_ts, Some(at(4, 5)));
        assert!(store.get_legs(run.run_id).await.unwrap().is_empty());

        assert_eq!(controller.tick(at(4, 6)).await.unwrap(), Phase::Live);
        assert_eq!(store.get_legs(run.run_id).await.unwrap().len(), 6);
        assert_eq!(count(&store, EventType::RunStarted), 1);

        assert_eq!(controller.tick(at(4, 7)).await.unwrap(), Phase::Live);
        assert_eq!(gateway.orders.lock().unwrap().len(), 6);
        assert_eq!(gateway.position_symbols().len(), 6);
        assert_eq!(store.runs().len(), 1);
    }

    #[tokio::test]
    async fn run_interrupted_while_opening_is_stopped_not_reopened() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let settings = live_settings(Some(dec!(1000)));
        let mut interrupted = new_run(&settings, at(4, 0));
        interrupted.opening_ts = Some(at(4, 1));
        store.create_run(&interrupted, WriteBatch::new()).await.unwrap();

        let mut controller = live_controller(&store, &gateway, settings);
        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Closed);
        let run = store.get_run(interrupted.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Stopped);
        assert_eq!(count(&store, EventType::OpenInterrupted), 1);
        assert!(gateway.orders.lock().unwrap().is_empty());

        assert_eq!(controller.tick(at(4, 6)).await.unwrap(), Phase::Idle);
        assert_eq!(store.runs().len(), 1);
        assert!(gateway.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn window_past_midnight_opens_one_run() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut settings = paper_settings();
        settings.entry_time = chrono::NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        settings.entry_time_utc = "23:30".to_string();
        let mut controller = paper_controller(&store, &gateway, settings);

        assert_eq!(controller.tick(on(4, 23, 35)).await.unwrap(), Phase::Live);
        gateway.set_all_prices(dec!(11.2));
        assert_eq!(controller.tick(on(5, 0, 10)).await.unwrap(), Phase::Closed);

        gateway.set_all_prices(dec!(10));
        assert_eq!(controller.tick(on(5, 0, 15)).await.unwrap(), Phase::Idle);
        assert_eq!(store.runs().len(), 1);

        assert_eq!(controller.tick(on(5, 23, 35)).await.unwrap(), Phase::Live);
        assert_eq!(store.runs().len(), 2);
    }

    #[tokio::test]
    async fn runtime_overrides_apply_per_tick_and_bad_ones_fall_back() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        store.set_runtime_override(RunMode::Paper, "leverage", "three");
        let mut controller = paper_controller(&store, &gateway, paper_settings());

        assert_eq!(controller.tick(at(3, 0)).await.unwrap(), Phase::Idle);
        assert_eq!(controller.tick(at(3, 1)).await.unwrap(), Phase::Idle);
        assert_eq!(count(&store, EventType::OverridesRejected), 1);

        store.set_runtime_override(RunMode::Paper, "leverage", "6");
        store.set_runtime_override(RunMode::Paper, "num_legs", "2");
        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Live);
        let run = active_run(&store, RunMode::Paper).await;
        assert_eq!(run.leverage, dec!(6));
        let legs = store.get_legs(run.run_id).await.unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs.iter().all(|l| l.qty == dec!(60)));
    }

    #[tokio::test]
    async fn disabled_mode_never_opens() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::with_tickers(basket()));
        let mut settings = paper_settings();
        settings.enabled = false;
        let mut controller = paper_controller(&store, &gateway, settings);
        assert_eq!(controller.tick(at(4, 5)).await.unwrap(), Phase::Idle);
        assert!(store.runs().is_empty());
    }
}
