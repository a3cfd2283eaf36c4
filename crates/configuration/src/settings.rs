use crate::error::ConfigError;
use chrono::NaiveTime;
use core_types::{RunMode, StrategyTag};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalSettings,
    /// Strategy parameters shared by both modes unless a mode overrides them.
    #[serde(default)]
    pub defaults: StrategyDefaults,
    #[serde(default = "ModeOverrides::paper")]
    pub paper: ModeOverrides,
    #[serde(default = "ModeOverrides::live")]
    pub live: ModeOverrides,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalSettings::default(),
            defaults: StrategyDefaults::default(),
            paper: ModeOverrides::paper(),
            live: ModeOverrides::live(),
            api: ApiConfig::default(),
        }
    }
}

/// Process-wide settings that are not per mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub exchange: String,
    /// Cadence of the run scheduler, independent of the per-run poll interval.
    pub scheduler_interval_secs: u64,
    /// Upper bound on any single exchange request.
    pub gateway_timeout_secs: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            exchange: "bitget".to_string(),
            scheduler_interval_secs: 5,
            gateway_timeout_secs: 10,
        }
    }
}

/// Strategy and scheduling parameters. Fractions are expressed as 0.15 for 15%.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyDefaults {
    /// Daily entry time, `HH:MM` in UTC.
    pub entry_time_utc: String,
    pub entry_window_minutes: i64,
    pub trade_weekends: bool,
    pub num_legs: usize,
    pub margin_per_leg_usdt: Decimal,
    pub leverage: Decimal,
    pub max_pump_pct: Decimal,
    pub global_kill_dd_pct: Decimal,
    pub poll_interval_secs: u64,
    pub strategy_tag: String,
    pub hold_hours: Decimal,
}

impl Default for StrategyDefaults {
    fn default() -> Self {
        Self {
            entry_time_utc: "04:00".to_string(),
            entry_window_minutes: 60,
            trade_weekends: true,
            num_legs: 10,
            margin_per_leg_usdt: dec!(100),
            leverage: dec!(3),
            max_pump_pct: dec!(0.15),
            global_kill_dd_pct: dec!(0.30),
            poll_interval_secs: 30,
            strategy_tag: "S1".to_string(),
            hold_hours: dec!(24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeStatus {
    On,
    Off,
}

/// Per-mode values layered over [`StrategyDefaults`]. Every field is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ModeOverrides {
    pub status: Option<ModeStatus>,
    pub entry_time_utc: Option<String>,
    pub entry_window_minutes: Option<i64>,
    pub trade_weekends: Option<bool>,
    pub num_legs: Option<usize>,
    pub margin_per_leg_usdt: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub max_pump_pct: Option<Decimal>,
    pub global_kill_dd_pct: Option<Decimal>,
    pub poll_interval_secs: Option<u64>,
    pub strategy_tag: Option<String>,
    pub hold_hours: Option<Decimal>,
    /// Paper runs default to 1000 USDT; live runs have no default and refuse to open.
    pub initial_balance: Option<Decimal>,
}

impl ModeOverrides {
    fn paper() -> Self {
        Self {
            status: Some(ModeStatus::On),
            initial_balance: Some(dec!(1000)),
            ..Self::default()
        }
    }

    fn live() -> Self {
        Self {
            status: Some(ModeStatus::Off),
            ..Self::default()
        }
    }
}

/// Exchange connection settings. Secrets normally come from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sends the demo-trading header on every request.
    pub use_testnet: bool,
    /// Required by hedge-mode accounts when setting leverage.
    pub hold_side: Option<String>,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.bitget.com".to_string(),
            use_testnet: true,
            hold_side: None,
            api_key: String::new(),
            api_secret: String::new(),
            api_passphrase: String::new(),
        }
    }
}

impl ApiConfig {
    pub(crate) fn fill_credentials_from_env(&mut self) {
        let fill = |field: &mut String, var: &str| {
            if field.is_empty() {
                if let Ok(value) = std::env::var(var) {
                    *field = value;
                }
            }
        };
        fill(&mut self.api_key, "BITGET_API_KEY");
        fill(&mut self.api_secret, "BITGET_API_SECRET");
        fill(&mut self.api_passphrase, "BITGET_API_PASSPHRASE");
    }

    /// Names of the credentials that are still missing.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_empty() {
            missing.push("BITGET_API_KEY");
        }
        if self.api_secret.is_empty() {
            missing.push("BITGET_API_SECRET");
        }
        if self.api_passphrase.is_empty() {
            missing.push("BITGET_API_PASSPHRASE");
        }
        missing
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for mode in RunMode::ALL {
            self.runtime(mode)?;
        }
        if self.global.scheduler_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn overrides(&self, mode: RunMode) -> &ModeOverrides {
        match mode {
            RunMode::Paper => &self.paper,
            RunMode::Live => &self.live,
        }
    }

    /// Resolves the immutable settings snapshot for one mode.
    pub fn runtime(&self, mode: RunMode) -> Result<RuntimeSettings, ConfigError> {
        let d = &self.defaults;
        let o = self.overrides(mode);
        let entry_time_utc = o.entry_time_utc.clone().unwrap_or_else(|| d.entry_time_utc.clone());

        let settings = RuntimeSettings {
            mode,
            enabled: o.status.unwrap_or(ModeStatus::Off) == ModeStatus::On,
            exchange: self.global.exchange.clone(),
            entry_time: parse_entry_time(&entry_time_utc)?,
            entry_time_utc,
            entry_window_minutes: o.entry_window_minutes.unwrap_or(d.entry_window_minutes),
            trade_weekends: o.trade_weekends.unwrap_or(d.trade_weekends),
            num_legs: o.num_legs.unwrap_or(d.num_legs),
            margin_per_leg_usdt: o.margin_per_leg_usdt.unwrap_or(d.margin_per_leg_usdt),
            leverage: o.leverage.unwrap_or(d.leverage),
            max_pump_pct: o.max_pump_pct.unwrap_or(d.max_pump_pct),
            global_kill_dd_pct: o.global_kill_dd_pct.unwrap_or(d.global_kill_dd_pct),
            poll_interval_secs: o.poll_interval_secs.unwrap_or(d.poll_interval_secs),
            strategy_tag: StrategyTag::from(
                o.strategy_tag.clone().unwrap_or_else(|| d.strategy_tag.clone()),
            ),
            hold_hours: o.hold_hours.unwrap_or(d.hold_hours),
            initial_balance: o.initial_balance,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Parses `HH:MM` into a time of day.
pub fn parse_entry_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        ConfigError::ValidationError(format!("entry_time_utc must be HH:MM, got '{}'", value))
    })
}

/// The fully resolved, per-mode parameter set a controller or the scheduler works with.
///
/// It is a value: re-read once per tick and passed down, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub mode: RunMode,
    pub enabled: bool,
    pub exchange: String,
    pub entry_time_utc: String,
    pub entry_time: NaiveTime,
    pub entry_window_minutes: i64,
    pub trade_weekends: bool,
    pub num_legs: usize,
    pub margin_per_leg_usdt: Decimal,
    pub leverage: Decimal,
    pub max_pump_pct: Decimal,
    pub global_kill_dd_pct: Decimal,
    pub poll_interval_secs: u64,
    pub strategy_tag: StrategyTag,
    pub hold_hours: Decimal,
    pub initial_balance: Option<Decimal>,
}

/// A window longer than a day would overlap the next one.
pub const MAX_ENTRY_WINDOW_MINUTES: i64 = 1440;
pub const MAX_LEVERAGE: Decimal = Decimal::from_parts(125, 0, 0, false, 0);
pub const MAX_MARGIN_PER_LEG_USDT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

impl RuntimeSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(format!("[{}] {}", self.mode, msg)));
        if self.num_legs == 0 {
            return fail("num_legs must be greater than 0");
        }
        if self.margin_per_leg_usdt <= Decimal::ZERO || self.margin_per_leg_usdt > MAX_MARGIN_PER_LEG_USDT {
            return fail("margin_per_leg_usdt must be in (0, 1000000]");
        }
        if self.leverage <= Decimal::ZERO || self.leverage > MAX_LEVERAGE {
            return fail("leverage must be in (0, 125]");
        }
        if self.global_kill_dd_pct <= Decimal::ZERO || self.global_kill_dd_pct > Decimal::ONE {
            return fail("global_kill_dd_pct must be in (0, 1]");
        }
        if self.entry_window_minutes <= 0 || self.entry_window_minutes > MAX_ENTRY_WINDOW_MINUTES {
            return fail("entry_window_minutes must be in (0, 1440]");
        }
        if self.poll_interval_secs == 0 {
            return fail("poll_interval_secs must be greater than 0");
        }
        if self.hold_hours <= Decimal::ZERO {
            return fail("hold_hours must be greater than 0");
        }
        Ok(())
    }

    /// Returns a new snapshot with the store's `key -> value` overrides applied.
    ///
    /// Unknown keys are skipped with a warning. A value that does not parse fails the
    /// whole snapshot so a half-applied override set is never used.
    pub fn with_overrides(&self, overrides: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        for (key, value) in overrides {
            let invalid = || ConfigError::InvalidOverride { key: key.clone(), value: value.clone() };
            let decimal = || Decimal::from_str(value.trim()).map_err(|_| invalid());
            match key.as_str() {
                "status" => {
                    next.enabled = match value.trim().to_ascii_lowercase().as_str() {
                        "on" => true,
                        "off" => false,
                        _ => return Err(invalid()),
                    }
                }
                "entry_time_utc" => {
                    next.entry_time = parse_entry_time(value).map_err(|_| invalid())?;
                    next.entry_time_utc = value.trim().to_string();
                }
                "entry_window_minutes" => {
                    next.entry_window_minutes = value.trim().parse().map_err(|_| invalid())?
                }
                "trade_weekends" => {
                    next.trade_weekends = value.trim().to_ascii_lowercase().parse().map_err(|_| invalid())?
                }
                "num_legs" => next.num_legs = value.trim().parse().map_err(|_| invalid())?,
                "margin_per_leg_usdt" => next.margin_per_leg_usdt = decimal()?,
                "leverage" => next.leverage = decimal()?,
                "max_pump_pct" => next.max_pump_pct = decimal()?,
                "global_kill_dd_pct" => next.global_kill_dd_pct = decimal()?,
                "poll_interval_secs" => {
                    next.poll_interval_secs = value.trim().parse().map_err(|_| invalid())?
                }
                "strategy_tag" => next.strategy_tag = StrategyTag::from(value.as_str()),
                "hold_hours" => next.hold_hours = decimal()?,
                "initial_balance" => next.initial_balance = Some(decimal()?),
                _ => tracing::warn!(mode = %self.mode, key = %key, "Ignoring unknown runtime setting."),
            }
        }
        next.validate()?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_for_both_modes() {
        let config = Config::default();
        let paper = config.runtime(RunMode::Paper).unwrap();
        let live = config.runtime(RunMode::Live).unwrap();

        assert!(paper.enabled);
        assert!(!live.enabled);
        assert_eq!(paper.initial_balance, Some(dec!(1000)));
        assert_eq!(live.initial_balance, None);
        assert_eq!(paper.entry_time, NaiveTime::from_hms_opt(4, 0, 0).unwrap());
        assert_eq!(paper.strategy_tag, StrategyTag::S1);
    }

    #[test]
    fn mode_values_override_defaults() {
        let mut config = Config::default();
        config.live.leverage = Some(dec!(5));
        config.live.strategy_tag = Some("s3".to_string());

        let live = config.runtime(RunMode::Live).unwrap();
        assert_eq!(live.leverage, dec!(5));
        assert_eq!(live.strategy_tag, StrategyTag::S3);
        assert_eq!(config.runtime(RunMode::Paper).unwrap().leverage, dec!(3));
    }

    #[test]
    fn bad_entry_time_is_rejected() {
        let mut config = Config::default();
        config.defaults.entry_time_utc = "4am".to_string();
        assert!(matches!(config.runtime(RunMode::Paper), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn overrides_produce_a_new_snapshot() {
        let base = Config::default().runtime(RunMode::Paper).unwrap();
        let overrides = HashMap::from([
            ("leverage".to_string(), "2".to_string()),
            ("entry_time_utc".to_string(), "05:30".to_string()),
            ("no_such_key".to_string(), "1".to_string()),
        ]);

        let next = base.with_overrides(&overrides).unwrap();
        assert_eq!(next.leverage, dec!(2));
        assert_eq!(next.entry_time, NaiveTime::from_hms_opt(5, 30, 0).unwrap());
        assert_eq!(base.leverage, dec!(3));
    }

    #[test]
    fn unparseable_override_fails_the_snapshot() {
        let base = Config::default().runtime(RunMode::Paper).unwrap();
        let overrides = HashMap::from([("num_legs".to_string(), "ten".to_string())]);
        assert!(matches!(
            base.with_overrides(&overrides),
            Err(ConfigError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn out_of_range_overrides_are_rejected() {
        let base = Config::default().runtime(RunMode::Paper).unwrap();
        for (key, value) in [
            ("entry_window_minutes", "9223372036854775807"),
            ("entry_window_minutes", "1441"),
            ("leverage", "1000"),
            ("margin_per_leg_usdt", "79228162514264337593543950335"),
        ] {
            let overrides = HashMap::from([(key.to_string(), value.to_string())]);
            assert!(
                matches!(base.with_overrides(&overrides), Err(ConfigError::ValidationError(_))),
                "{key}={value} should be rejected"
            );
        }

        let day_long = HashMap::from([("entry_window_minutes".to_string(), "1440".to_string())]);
        assert_eq!(base.with_overrides(&day_long).unwrap().entry_window_minutes, 1440);
    }
}
