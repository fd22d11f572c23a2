use std::sync::Arc;
use std::time::Instant;

use diesel::{connection::SimpleConnection, pg::PgConnection, Connection};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, jwt: JwtService) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            jwt,
        }
    }

    /// Runs `f` inside one database transaction on the blocking pool, bounded by
    /// the request deadline. Postgres cancels statements once the remaining
    /// budget is spent and the transaction refuses to commit past the deadline.
    /// The outcome is always the transaction's own: a 504 means it rolled back
    /// and a success means it committed.
    pub async fn transact<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = Instant::now() + self.config.request_timeout;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut pooled = pool
                .get()
                .map_err(|err| AppError::dependency(format!("database pool error: {err}")))?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AppError::timeout());
            }
            let timeout_ms = remaining.as_millis().max(1);

            let conn: &mut PgConnection = &mut pooled;
            conn.transaction::<T, AppError, _>(|conn| {
                conn.batch_execute(&format!("SET LOCAL statement_timeout = {timeout_ms}"))?;
                let value = f(conn)?;
                if Instant::now() >= deadline {
                    return Err(AppError::timeout());
                }
                Ok(value)
            })
        })
        .await
        .map_err(|err| AppError::internal(format!("database task failed: {err}")))?
    }
}
