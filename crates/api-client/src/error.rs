use thiserror::Error;

/// Any failure reaching the exchange. Callers treat it as "no data this tick".
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to build the HTTP request: {0}")]
    RequestBuild(String),

    #[error("Bitget returned error {code}: {msg}")]
    Exchange { code: String, msg: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Missing API credentials: {0}")]
    MissingCredentials(String),
}
