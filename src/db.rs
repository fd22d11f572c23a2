use std::time::Duration;

use anyhow::{bail, Context, Result};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 10;

pub fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    init_pool_with_size(database_url, DEFAULT_MAX_POOL_SIZE)
}

pub fn init_pool_with_size(database_url: &str, max_size: u32) -> anyhow::Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool_size = max_size.max(1);
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?;
    Ok(pool)
}

/// One readiness attempt: connect and run `SELECT 1`.
pub fn ping(database_url: &str) -> Result<()> {
    let mut conn =
        PgConnection::establish(database_url).context("failed to connect to database")?;
    diesel::sql_query("SELECT 1")
        .execute(&mut conn)
        .context("readiness query failed")?;
    Ok(())
}

/// Blocks until `SELECT 1` succeeds or `retries` attempts are exhausted.
pub async fn wait_for_database(database_url: &str, retries: u32, delay: Duration) -> Result<()> {
    let url = database_url.to_string();
    wait_until_ready(retries, delay, move || {
        let url = url.clone();
        async move {
            tokio::task::spawn_blocking(move || ping(&url))
                .await
                .context("readiness probe task panicked")?
        }
    })
    .await
}

pub async fn wait_until_ready<F, Fut>(retries: u32, delay: Duration, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let attempts = retries.max(1);
    for attempt in 1..=attempts {
        match probe().await {
            Ok(()) => {
                tracing::info!(attempt, "database is ready");
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(attempt, attempts, error = %err, "database not ready");
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    bail!("database did not become ready after {attempts} attempts")
}

#[cfg(test)]
mod tests {
    use super::wait_until_ready;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn succeeds_once_probe_passes() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = wait_until_ready(5, Duration::from_millis(1), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(anyhow!("not yet"))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = wait_until_ready(4, Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("refused")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
