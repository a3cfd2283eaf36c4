use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use configuration::RuntimeSettings;
use core_types::{Run, RunStatus, StrategyTag};
use strategies::DecisionParams;
use uuid::Uuid;

/// The UTC instant the entry window opens on `date`.
pub fn entry_window_start(date: NaiveDate, settings: &RuntimeSettings) -> DateTime<Utc> {
    date.and_time(settings.entry_time).and_utc()
}

/// The start of the entry window `now` lies in, if any. A window that starts late in
/// the day may run past midnight, so yesterday's window is checked too.
pub fn current_window_start(now: DateTime<Utc>, settings: &RuntimeSettings) -> Option<DateTime<Utc>> {
    let width = Duration::try_minutes(settings.entry_window_minutes)?;
    let today = now.date_naive();
    [Some(today), today.pred_opt()]
        .into_iter()
        .flatten()
        .map(|date| entry_window_start(date, settings))
        .find(|start| now >= *start && start.checked_add_signed(width).is_some_and(|end| now < end))
}

pub fn in_entry_window(now: DateTime<Utc>, settings: &RuntimeSettings) -> bool {
    current_window_start(now, settings).is_some()
}

/// True once today's entry time-of-day has been reached.
pub fn entry_time_reached(now: DateTime<Utc>, settings: &RuntimeSettings) -> bool {
    now.time() >= settings.entry_time
}

pub fn is_trading_day(now: DateTime<Utc>, settings: &RuntimeSettings) -> bool {
    settings.trade_weekends || !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

/// True when the latest run of the mode started at or after `since`.
pub fn started_since(latest: Option<&Run>, since: DateTime<Utc>) -> bool {
    latest.is_some_and(|run| run.start_ts >= since)
}

/// True when a run of the mode already started on `now`'s UTC date.
pub fn started_today(latest: Option<&Run>, now: DateTime<Utc>) -> bool {
    latest.is_some_and(|run| run.start_ts.date_naive() == now.date_naive())
}

/// A fresh `running` row for the mode, stamped with the snapshot's parameters.
pub fn new_run(settings: &RuntimeSettings, now: DateTime<Utc>) -> Run {
    Run {
        run_id: Uuid::new_v4(),
        exchange: settings.exchange.clone(),
        mode: settings.mode,
        entry_time_utc: settings.entry_time_utc.clone(),
        start_ts: now,
        end_ts: None,
        status: RunStatus::Running,
        num_legs: i32::try_from(settings.num_legs).unwrap_or(i32::MAX),
        margin_per_leg_usdt: settings.margin_per_leg_usdt,
        leverage: settings.leverage,
        max_pump_pct: settings.max_pump_pct,
        global_kill_dd_pct: settings.global_kill_dd_pct,
        strategy_tag: settings.strategy_tag.to_string(),
        initial_balance: settings.initial_balance,
        current_balance: settings.initial_balance,
        opening_ts: None,
    }
}

/// Decision parameters for an existing run.
///
/// Sizing, the kill threshold and the tag are frozen on the run row when it is created;
/// only the hold limit follows the current settings snapshot.
pub fn run_params(run: &Run, settings: &RuntimeSettings) -> DecisionParams {
    DecisionParams {
        num_legs: usize::try_from(run.num_legs).unwrap_or(settings.num_legs),
        margin_per_leg_usdt: run.margin_per_leg_usdt,
        leverage: run.leverage,
        max_pump_pct: run.max_pump_pct,
        global_kill_dd_pct: run.global_kill_dd_pct,
        hold_hours: settings.hold_hours,
        strategy_tag: StrategyTag::from(run.strategy_tag.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use configuration::Config;
    use core_types::RunMode;

    fn settings(entry: &str, minutes: i64) -> RuntimeSettings {
        let mut s = Config::default().runtime(RunMode::Paper).unwrap();
        s.entry_time = NaiveTime::parse_from_str(entry, "%H:%M").unwrap();
        s.entry_time_utc = entry.to_string();
        s.entry_window_minutes = minutes;
        s
    }

    #[test]
    fn entry_window_is_half_open() {
        let s = settings("04:00", 60);
        let at = |h, m| Utc.with_ymd_and_hms(2025, 3, 4, h, m, 0).unwrap();
        assert!(!in_entry_window(at(3, 59), &s));
        assert!(in_entry_window(at(4, 0), &s));
        assert!(in_entry_window(at(4, 59), &s));
        assert!(!in_entry_window(at(5, 0), &s));
    }

    #[test]
    fn entry_window_can_cross_midnight() {
        let s = settings("23:30", 60);
        assert!(in_entry_window(Utc.with_ymd_and_hms(2025, 3, 5, 0, 15, 0).unwrap(), &s));
        assert!(!in_entry_window(Utc.with_ymd_and_hms(2025, 3, 5, 0, 30, 0).unwrap(), &s));
    }

    #[test]
    fn window_dedupe_spans_midnight() {
        let s = settings("23:30", 60);
        let opened_at = Utc.with_ymd_and_hms(2025, 3, 4, 23, 35, 0).unwrap();
        let run = new_run(&s, opened_at);

        let after_midnight = Utc.with_ymd_and_hms(2025, 3, 5, 0, 15, 0).unwrap();
        let window = current_window_start(after_midnight, &s).unwrap();
        assert_eq!(window, Utc.with_ymd_and_hms(2025, 3, 4, 23, 30, 0).unwrap());
        assert!(started_since(Some(&run), window));
        assert!(!started_today(Some(&run), after_midnight));

        let next_window = current_window_start(Utc.with_ymd_and_hms(2025, 3, 5, 23, 31, 0).unwrap(), &s).unwrap();
        assert!(!started_since(Some(&run), next_window));
    }

    #[test]
    fn oversized_window_is_never_open() {
        let s = settings("04:00", i64::MAX);
        assert!(!in_entry_window(Utc.with_ymd_and_hms(2025, 3, 4, 5, 0, 0).unwrap(), &s));
    }

    #[test]
    fn weekend_policy() {
        let mut s = settings("04:00", 60);
        let saturday = Utc.with_ymd_and_hms(2025, 3, 8, 5, 0, 0).unwrap();
        assert!(is_trading_day(saturday, &s));
        s.trade_weekends = false;
        assert!(!is_trading_day(saturday, &s));
        assert!(is_trading_day(Utc.with_ymd_and_hms(2025, 3, 10, 5, 0, 0).unwrap(), &s));
    }

    #[test]
    fn new_run_copies_the_snapshot() {
        let s = settings("04:00", 60);
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 4, 0, 0).unwrap();
        let run = new_run(&s, now);
        assert!(run.is_active());
        assert_eq!(run.strategy_tag, "S1");
        assert!(started_today(Some(&run), now + Duration::hours(3)));
        assert!(!started_today(Some(&run), now + Duration::days(1)));
        assert_eq!(run_params(&run, &s).num_legs, s.num_legs);
    }
}
