// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_tracing;
pub use settings::{
    ApiConfig, Config, GlobalSettings, ModeOverrides, ModeStatus, RuntimeSettings,
    StrategyDefaults,
};

/// Loads the application configuration.
///
/// Reads `.env` (if present), then `config.toml` (optional, so a pure-environment
/// deployment works), then `SHORTBASKET__*` environment variables, e.g.
/// `SHORTBASKET__LIVE__INITIAL_BALANCE=500`. Exchange credentials fall back to the
/// `BITGET_API_KEY` / `BITGET_API_SECRET` / `BITGET_API_PASSPHRASE` variables.
pub fn load_config() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(
            config::Environment::with_prefix("SHORTBASKET")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config = builder.try_deserialize::<Config>()?;
    config.api.fill_credentials_from_env();
    config.validate()?;

    Ok(config)
}
