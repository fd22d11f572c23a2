use anyhow::Result;

use backoffice::{config::AppConfig, db, telemetry::init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "wait_for_db",
        database_url = %config.redacted_database_url(),
        retries = config.db_wait_retries,
        delay_secs = config.db_wait_delay.as_secs(),
        "waiting for database"
    );
    db::wait_for_database(
        &config.database_url,
        config.db_wait_retries,
        config.db_wait_delay,
    )
    .await
}
