use api_client::error::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Leg not tracked for symbol: {0}")]
    LegNotTracked(String),

    #[error("Leg already tracked for symbol: {0}")]
    LegAlreadyTracked(String),

    #[error("No usable price for symbol: {0}")]
    MissingPrice(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}
