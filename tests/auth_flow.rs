mod common;

use std::time::{Duration, Instant};

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Deserialize)]
struct Me {
    username: String,
    role: String,
    tenant_id: Option<String>,
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let password = "s3cret-pass";
    app.insert_user("alice", password, "user", Some("all_county"))
        .await?;

    let token = app.login_token("alice", password).await?;

    let response = app.get("/api/v1/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me: Me = read_json(response).await?;

    assert_eq!(me.username, "alice");
    assert_eq!(me.role, "user");
    assert_eq!(me.tenant_id.as_deref(), Some("all_county"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn bad_credentials_and_inactive_users_get_the_same_401() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("bob", "correct-horse", "user", None).await?;
    app.insert_user("carol", "correct-horse", "user", None)
        .await?;
    app.execute_sql("UPDATE users SET is_active = FALSE WHERE username = 'carol'")
        .await?;

    let attempts = [
        ("bob", "wrong-horse"),
        ("nobody", "correct-horse"),
        ("carol", "correct-horse"),
    ];
    let mut bodies = Vec::new();
    for (username, password) in attempts {
        let response = app
            .post_json(
                "/api/v1/login",
                &json!({ "username": username, "password": password }),
                None,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(read_json::<Value>(response).await?);
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(bodies[0]["code"], "unauthorized");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_users_cost_as_much_as_wrong_passwords() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("dave", "correct-horse", "user", None).await?;

    async fn timed(app: &TestApp, username: &str) -> Result<Duration> {
        let started = Instant::now();
        let response = app
            .post_json(
                "/api/v1/login",
                &json!({ "username": username, "password": "wrong-horse" }),
                None,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(started.elapsed())
    }

    // Warm up the lazily built dummy hash before measuring.
    timed(&app, "nobody").await?;

    let rounds = 5;
    let mut known = Duration::ZERO;
    let mut unknown = Duration::ZERO;
    for _ in 0..rounds {
        known += timed(&app, "dave").await?;
        unknown += timed(&app, "nobody").await?;
    }
    let (known, unknown) = (known / rounds, unknown / rounds);
    assert!(
        unknown * 3 >= known,
        "unknown user answered in {unknown:?}, wrong password in {known:?}"
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn responses_carry_a_request_id() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app.get("/api/health", None).await?;
    let minted = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(minted.parse::<Uuid>().is_ok(), "unexpected request id {minted:?}");

    let response = app
        .get_with_header("/api/v1/builders", "x-request-id", "dispatch-42")
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-request-id").map(|value| value.as_bytes()),
        Some(&b"dispatch-42"[..])
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app.get("/api/v1/builders", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/v1/builders", Some("not-a-jwt")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let health: Value = read_json(response).await?;
    assert_eq!(health, json!({ "status": "ok" }));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn admins_manage_users() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let admin = app.user_token("root", "admin", None).await?;
    let regular = app.user_token("dave", "user", Some("all_county")).await?;

    let payload = json!({
        "username": "erin",
        "password": "long-enough",
        "role": "publisher",
        "tenant_id": "all_county"
    });
    let response = app.post_json("/api/v1/users", &payload, Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let created: Value = read_json(response).await?;
    assert_eq!(created["username"], "erin");
    assert!(created.get("hashed_password").is_none());

    let duplicate = app.post_json("/api/v1/users", &payload, Some(&admin)).await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let short = app
        .post_json(
            "/api/v1/users",
            &json!({ "username": "frank", "password": "short" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(short.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let forbidden = app.get("/api/v1/users", Some(&regular)).await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let token = app.login_token("erin", "long-enough").await?;
    let me: Me = read_json(app.get("/api/v1/me", Some(&token)).await?).await?;
    assert_eq!(me.role, "publisher");

    let audit = app
        .audit_rows("user", created["id"].as_str().unwrap_or_default())
        .await?;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "create");
    assert_eq!(audit[0].actor, "root");

    app.cleanup().await?;
    Ok(())
}
