use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventsError {
    #[error("Unknown event level: {0}")]
    UnknownLevel(String),
}
