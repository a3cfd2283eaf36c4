use crate::error::DbError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::env;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the Postgres pool named by `DATABASE_URL`.
///
/// `.env` is consulted first, then the process environment. Both trading loops and the
/// scheduler of one process draw from this single pool.
pub async fn connect() -> Result<PgPool, DbError> {
    // No .env in deployments; the variables come from the environment there.
    let _ = dotenvy::dotenv();

    let database_url = env::var("DATABASE_URL")
        .map_err(|_e| DbError::ConnectionConfigError("DATABASE_URL must be set.".to_string()))?;

    Ok(pool_options().connect(&database_url).await?)
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new().max_connections(MAX_CONNECTIONS).acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Applies the embedded schema migrations before either loop starts.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_bounded_and_fails_fast() {
        let options = pool_options();
        assert_eq!(options.get_max_connections(), MAX_CONNECTIONS);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(5));
    }
}
