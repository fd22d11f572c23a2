use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::Connection;

use backoffice::{bootstrap::ensure_admin, config::AppConfig, db, telemetry::init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "bootstrap",
        database_url = %config.redacted_database_url(),
        "loaded backend configuration"
    );
    let password = config.bootstrap_admin_password()?.to_string();

    db::wait_for_database(
        &config.database_url,
        config.db_wait_retries,
        config.db_wait_delay,
    )
    .await?;

    let database_url = config.database_url.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut conn =
            PgConnection::establish(&database_url).context("failed to connect to database")?;
        ensure_admin(&mut conn, &password)
    })
    .await
    .context("bootstrap task panicked")??;

    tracing::info!(component = "bootstrap", outcome = outcome.as_str(), "admin account checked");
    println!("admin: {}", outcome.as_str());
    Ok(())
}
