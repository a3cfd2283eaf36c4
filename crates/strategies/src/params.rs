use crate::error::StrategyError;
use configuration::RuntimeSettings;
use core_types::StrategyTag;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything the decision engine needs from configuration, taken by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionParams {
    pub num_legs: usize,
    pub margin_per_leg_usdt: Decimal,
    pub leverage: Decimal,
    pub max_pump_pct: Decimal,
    pub global_kill_dd_pct: Decimal,
    pub hold_hours: Decimal,
    pub strategy_tag: StrategyTag,
}

impl DecisionParams {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.num_legs == 0 {
            return Err(StrategyError::InvalidParameters("num_legs must be greater than 0".into()));
        }
        if self.margin_per_leg_usdt <= Decimal::ZERO || self.leverage <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "margin and leverage must be greater than 0".into(),
            ));
        }
        if self.global_kill_dd_pct <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "global_kill_dd_pct must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl From<&RuntimeSettings> for DecisionParams {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            num_legs: settings.num_legs,
            margin_per_leg_usdt: settings.margin_per_leg_usdt,
            leverage: settings.leverage,
            max_pump_pct: settings.max_pump_pct,
            global_kill_dd_pct: settings.global_kill_dd_pct,
            hold_hours: settings.hold_hours,
            strategy_tag: settings.strategy_tag.clone(),
        }
    }
}
