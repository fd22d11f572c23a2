use std::env;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use backoffice::auth::jwt::JwtService;
use backoffice::auth::password::hash_password;
use backoffice::config::AppConfig;
use backoffice::db::{self, PgPool};
use backoffice::migrate::{self, RevisionLog};
use backoffice::models::{AuditRecord, NewUser};
use backoffice::routes;
use backoffice::schema::{audit_log, users};
use backoffice::state::AppState;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_request_timeout(Duration::from_secs(15)).await
    }

    /// A test app whose requests run under the given deadline.
    pub async fn with_request_timeout(request_timeout: Duration) -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            request_timeout,
            db_wait_retries: 1,
            db_wait_delay: Duration::from_millis(1),
            admin_password: None,
            require_admin_password: false,
            cors_allowed_origin: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self { state, router })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub async fn insert_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
        tenant_id: Option<&str>,
    ) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        let tenant_id = tenant_id.map(str::to_string);
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                email: None,
                hashed_password: hash_password(&password)?,
                role,
                is_active: true,
                tenant_id,
            };
            diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    /// Inserts a user and returns a bearer token for it.
    #[allow(dead_code)]
    pub async fn user_token(
        &self,
        username: &str,
        role: &str,
        tenant_id: Option<&str>,
    ) -> Result<String> {
        let password = format!("{username}-password");
        self.insert_user(username, &password, role, tenant_id)
            .await?;
        self.login_token(username, &password).await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/v1/login", &LoginPayload { username, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = read_json(response).await?;
        Ok(parsed.access_token)
    }

    /// Audit rows for one entity, oldest first.
    #[allow(dead_code)]
    pub async fn audit_rows(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditRecord>> {
        let entity_type = entity_type.to_string();
        let entity_id = entity_id.to_string();
        self.with_conn(move |conn| {
            let rows = audit_log::table
                .filter(audit_log::entity_type.eq(entity_type))
                .filter(audit_log::entity_id.eq(entity_id))
                .order(audit_log::created_at.asc())
                .load::<AuditRecord>(conn)
                .context("failed to load audit rows")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn execute_sql(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            conn.batch_execute(&sql).context("failed to run sql")?;
            Ok(())
        })
        .await
    }

    /// Runs `sql` (typically `SELECT ... FOR UPDATE`) in a transaction on its
    /// own connection and keeps that transaction open for `hold`. Returns once
    /// the locks are taken; await the handle to release them.
    #[allow(dead_code)]
    pub async fn hold_lock(&self, sql: &str, hold: Duration) -> Result<JoinHandle<Result<()>>> {
        let (locked_tx, locked_rx) = oneshot::channel();
        let pool = self.state.pool.clone();
        let sql = sql.to_string();
        let handle = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                conn.batch_execute(&sql).context("failed to take locks")?;
                let _ = locked_tx.send(());
                std::thread::sleep(hold);
                Ok(())
            })
        });
        locked_rx
            .await
            .context("lock holder exited before taking its locks")?;
        Ok(handle)
    }

    /// GET with one extra request header.
    #[allow(dead_code)]
    pub async fn get_with_header(
        &self,
        path: &str,
        name: &str,
        value: &str,
    ) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(name, value)
            .body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    /// POST without a body, as the transition endpoints accept.
    #[allow(dead_code)]
    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, Body::empty(), None, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, Body::empty(), None, token).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, Body::empty(), None, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(method, path, Body::from(body), Some("application/json"), token)
            .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Body,
        content_type: Option<&str>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

/// Decodes a JSON response body.
pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).with_context(|| {
        format!(
            "unexpected response body: {}",
            String::from_utf8_lossy(&body)
        )
    })
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        let log = RevisionLog::embedded()?;
        migrate::upgrade(&mut conn, &log, None).context("failed to run migrations")?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE post_instances, media_assets, content_items, channel_accounts, \
         service_calls, job_tasks, jobs, customers, builders, audit_log, users CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
