use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Decision engine received invalid parameters: {0}")]
    InvalidParameters(String),
}
