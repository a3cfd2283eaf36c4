use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a run trades against a simulation or the real exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Paper,
    Live,
}

impl RunMode {
    pub const ALL: [RunMode; 2] = [RunMode::Paper, RunMode::Live];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Paper => "paper",
            RunMode::Live => "live",
        }
    }
}

impl FromStr for RunMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(RunMode::Paper),
            "live" => Ok(RunMode::Live),
            _ => Err(CoreError::UnknownVariant { kind: "run mode", value: s.to_string() }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a run as persisted in the `runs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
        }
    }

    /// `running` and `paused` are the only statuses that occupy a mode's active slot.
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "paused" => Ok(RunStatus::Paused),
            "completed" => Ok(RunStatus::Completed),
            "stopped" => Ok(RunStatus::Stopped),
            _ => Err(CoreError::UnknownVariant { kind: "run status", value: s.to_string() }),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegStatus {
    Open,
    Closed,
}

impl LegStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegStatus::Open => "open",
            LegStatus::Closed => "closed",
        }
    }
}

impl FromStr for LegStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(LegStatus::Open),
            "closed" => Ok(LegStatus::Closed),
            _ => Err(CoreError::UnknownVariant { kind: "leg status", value: s.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Whether an order opens a short leg or buys it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Open,
    Close,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Open => "open",
            OrderAction::Close => "close",
        }
    }

    /// A basket is always short, so opening sells and closing buys.
    pub fn side(&self) -> OrderSide {
        match self {
            OrderAction::Open => OrderSide::Sell,
            OrderAction::Close => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Submitted,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Filled => "filled",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Rejected => "rejected",
        }
    }
}

/// Why a leg or a whole run was closed. The string forms are what the reports read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    LegTrailingSl,
    KillSwitch,
    HoldLimit,
    PortfolioTp,
    PortfolioSl,
    CloseAll,
    AllLegsClosed,
    External,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::LegTrailingSl => "leg_trailing_sl",
            ExitReason::KillSwitch => "kill_switch",
            ExitReason::HoldLimit => "24h",
            ExitReason::PortfolioTp => "portfolio_tp",
            ExitReason::PortfolioSl => "portfolio_sl",
            ExitReason::CloseAll => "close_all",
            ExitReason::AllLegsClosed => "all_legs_closed",
            ExitReason::External => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects which exit rules apply to a run.
///
/// `S1` uses the kill switch, the hold limit and the flat portfolio band. `S2` is exempt
/// from the kill switch and has no band. `S3` is `S1` plus the per-leg trailing stop.
/// Any other tag keeps only the kill switch and the hold limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum StrategyTag {
    S1,
    S2,
    S3,
    Other(String),
}

impl StrategyTag {
    pub fn kill_switch_exempt(&self) -> bool {
        matches!(self, StrategyTag::S2)
    }

    pub fn uses_flat_band(&self) -> bool {
        matches!(self, StrategyTag::S1 | StrategyTag::S3)
    }

    pub fn uses_leg_trailing_stop(&self) -> bool {
        matches!(self, StrategyTag::S3)
    }

    pub fn as_str(&self) -> &str {
        match self {
            StrategyTag::S1 => "S1",
            StrategyTag::S2 => "S2",
            StrategyTag::S3 => "S3",
            StrategyTag::Other(tag) => tag,
        }
    }
}

impl From<String> for StrategyTag {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "s1" => StrategyTag::S1,
            "s2" => StrategyTag::S2,
            "s3" => StrategyTag::S3,
            _ => StrategyTag::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for StrategyTag {
    fn from(value: &str) -> Self {
        StrategyTag::from(value.to_string())
    }
}

impl From<StrategyTag> for String {
    fn from(tag: StrategyTag) -> Self {
        tag.as_str().to_string()
    }
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-issued messages read from the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Pause,
    Resume,
    CloseAll,
    SetTp,
    SetSl,
    LegTp,
    LegSl,
    LegTpClear,
    LegSlClear,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Pause => "pause",
            CommandKind::Resume => "resume",
            CommandKind::CloseAll => "close_all",
            CommandKind::SetTp => "set_tp",
            CommandKind::SetSl => "set_sl",
            CommandKind::LegTp => "leg_tp",
            CommandKind::LegSl => "leg_sl",
            CommandKind::LegTpClear => "leg_tp_clear",
            CommandKind::LegSlClear => "leg_sl_clear",
        }
    }

    /// The run status a command moves active runs to, if it is one the core acts on.
    pub fn target_status(&self) -> Option<RunStatus> {
        match self {
            CommandKind::Pause => Some(RunStatus::Paused),
            CommandKind::Resume => Some(RunStatus::Running),
            CommandKind::CloseAll => Some(RunStatus::Stopped),
            _ => None,
        }
    }
}

impl FromStr for CommandKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "pause" => CommandKind::Pause,
            "resume" => CommandKind::Resume,
            "close_all" => CommandKind::CloseAll,
            "set_tp" => CommandKind::SetTp,
            "set_sl" => CommandKind::SetSl,
            "leg_tp" => CommandKind::LegTp,
            "leg_sl" => CommandKind::LegSl,
            "leg_tp_clear" => CommandKind::LegTpClear,
            "leg_sl_clear" => CommandKind::LegSlClear,
            _ => {
                return Err(CoreError::UnknownVariant { kind: "command", value: s.to_string() });
            }
        };
        Ok(kind)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
