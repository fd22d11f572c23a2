use anyhow::{Context, Result};
use tokio::net::TcpListener;

use backoffice::{
    auth::jwt::JwtService,
    bootstrap::ensure_admin,
    config::AppConfig,
    db,
    migrate::{self, RevisionLog},
    routes,
    state::AppState,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        request_timeout_secs = config.request_timeout.as_secs(),
        "loaded backend configuration"
    );

    db::wait_for_database(
        &config.database_url,
        config.db_wait_retries,
        config.db_wait_delay,
    )
    .await?;

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let admin_password = config.bootstrap_admin_password()?.to_string();

    let setup_pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = setup_pool
            .get()
            .context("failed to get database connection")?;
        let log = RevisionLog::embedded()?;
        let applied = migrate::upgrade(&mut conn, &log, None)?;
        tracing::info!(
            component = "migrate",
            applied = applied.len(),
            head = log.head().id,
            "schema is up to date"
        );
        let outcome = ensure_admin(&mut conn, &admin_password)?;
        tracing::info!(component = "bootstrap", outcome = outcome.as_str(), "admin account checked");
        Ok(())
    })
    .await
    .context("startup task panicked")??;

    let jwt = JwtService::from_config(&config)?;
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(pool, config, jwt);
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(component = "api", %addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
