use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::warn;

use crate::api_error::ApiError;
use crate::config::Config;

pub type DbPool = PgPool;

const CONNECT_RETRIES: u32 = 20;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Connect with retries so the server can come up before the database does.
pub async fn create_pool(config: &Config) -> Result<DbPool, sqlx::Error> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database.url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(err) if attempt < CONNECT_RETRIES => {
                warn!(attempt, error = %err, "database not ready, retrying");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(err) => return Err(err),
        }
    }
}

pub async fn health_check(pool: &DbPool) -> Result<(), ApiError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    Ok(())
}
