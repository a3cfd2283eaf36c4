use crate::error::EventsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

impl FromStr for EventLevel {
    type Err = EventsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(EventLevel::Info),
            "warn" => Ok(EventLevel::Warn),
            "error" => Ok(EventLevel::Error),
            other => Err(EventsError::UnknownLevel(other.to_string())),
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every event type the system writes. The string form is the `events.event_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunCreated,
    RunStarted,
    RunAttached,
    RunCompleted,
    RunStopped,
    RunExpired,
    OpenInterrupted,
    NoLegs,
    LegOpened,
    LegClosed,
    LegClosedExternal,
    OrderRejected,
    SetLeverageFailed,
    InitialBalanceRequired,
    UntrackedPosition,
    CommandAck,
    CommandIgnored,
    OverridesRejected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RunCreated => "run_created",
            EventType::RunStarted => "run_started",
            EventType::RunAttached => "run_attached",
            EventType::RunCompleted => "run_completed",
            EventType::RunStopped => "run_stopped",
            EventType::RunExpired => "run_expired",
            EventType::OpenInterrupted => "open_interrupted",
            EventType::NoLegs => "no_legs",
            EventType::LegOpened => "leg_opened",
            EventType::LegClosed => "leg_closed",
            EventType::LegClosedExternal => "live_leg_closed_manual",
            EventType::OrderRejected => "order_rejected",
            EventType::SetLeverageFailed => "set_leverage_failed",
            EventType::InitialBalanceRequired => "initial_balance_required",
            EventType::UntrackedPosition => "untracked_position",
            EventType::CommandAck => "command_ack",
            EventType::CommandIgnored => "command_ignored",
            EventType::OverridesRejected => "overrides_rejected",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub ts: DateTime<Utc>,
    pub level: EventLevel,
    pub event_type: EventType,
    pub message: String,
    pub run_id: Option<Uuid>,
}

impl NewEvent {
    pub fn new(
        ts: DateTime<Utc>,
        level: EventLevel,
        event_type: EventType,
        message: impl Into<String>,
    ) -> Self {
        Self { ts, level, event_type, message: message.into(), run_id: None }
    }

    pub fn info(ts: DateTime<Utc>, event_type: EventType, message: impl Into<String>) -> Self {
        Self::new(ts, EventLevel::Info, event_type, message)
    }

    pub fn warn(ts: DateTime<Utc>, event_type: EventType, message: impl Into<String>) -> Self {
        Self::new(ts, EventLevel::Warn, event_type, message)
    }

    pub fn error(ts: DateTime<Utc>, event_type: EventType, message: impl Into<String>) -> Self {
        Self::new(ts, EventLevel::Error, event_type, message)
    }

    /// Attaches the event to a run.
    pub fn for_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// An event as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub level: EventLevel,
    pub event_type: String,
    pub message: String,
    pub run_id: Option<Uuid>,
}

impl EventRecord {
    pub fn is(&self, event_type: EventType) -> bool {
        self.event_type == event_type.as_str()
    }
}
