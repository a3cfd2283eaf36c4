use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A required runtime parameter is missing or invalid for the mode.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Settings error: {0}")]
    Settings(#[from] configuration::ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] api_client::error::ApiError),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Executor error: {0}")]
    Executor(#[from] executor::ExecutorError),
}
