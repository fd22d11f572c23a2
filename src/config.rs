use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::{distributions::Alphanumeric, Rng};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin121";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub request_timeout: Duration,
    pub db_wait_retries: u32,
    pub db_wait_delay: Duration,
    pub admin_password: Option<String>,
    pub require_admin_password: bool,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set; generated a per-process signing secret");
                random_secret()
            }
        };
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "backoffice".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "backoffice-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let request_timeout_secs: u64 = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("REQUEST_TIMEOUT_SECS must be an integer")?;
        let db_wait_retries = env::var("DB_WAIT_RETRIES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("DB_WAIT_RETRIES must be an integer")?;
        let db_wait_delay_secs: u64 = env::var("DB_WAIT_DELAY_SECS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .context("DB_WAIT_DELAY_SECS must be an integer")?;
        let admin_password = env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|value| !value.is_empty());
        let require_admin_password = env::var("REQUIRE_ADMIN_PASSWORD")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            db_wait_retries,
            db_wait_delay: Duration::from_secs(db_wait_delay_secs),
            admin_password,
            require_admin_password,
            cors_allowed_origin,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    /// The password the admin bootstrap should enforce. Falls back to the
    /// built-in default unless `REQUIRE_ADMIN_PASSWORD` is set.
    pub fn bootstrap_admin_password(&self) -> Result<&str> {
        match self.admin_password.as_deref() {
            Some(password) => Ok(password),
            None if self.require_admin_password => {
                bail!("ADMIN_PASSWORD must be set when REQUIRE_ADMIN_PASSWORD is enabled")
            }
            None => {
                tracing::warn!("ADMIN_PASSWORD not set; using the built-in default admin password");
                Ok(DEFAULT_ADMIN_PASSWORD)
            }
        }
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        database_max_pool_size: DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        request_timeout: Duration::from_secs(15),
        db_wait_retries: 1,
        db_wait_delay: Duration::from_millis(1),
        admin_password: None,
        require_admin_password: false,
        cors_allowed_origin: None,
    }
}
