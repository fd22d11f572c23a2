mod common;

use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Deserialize)]
struct BuilderResponse {
    id: Uuid,
    name: String,
    notes: Option<String>,
    tenant_id: Option<String>,
}

#[tokio::test]
async fn builder_crud_is_audited() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.user_token("office", "user", Some("all_county")).await?;

    let response = app
        .post_json(
            "/api/v1/builders",
            &json!({ "name": "  Lennar  ", "notes": "north division" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let created: BuilderResponse = read_json(response).await?;
    assert_eq!(created.name, "Lennar");
    assert_eq!(created.tenant_id.as_deref(), Some("all_county"));

    let duplicate = app
        .post_json("/api/v1/builders", &json!({ "name": "Lennar" }), Some(&token))
        .await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let blank = app
        .post_json("/api/v1/builders", &json!({ "name": "   " }), Some(&token))
        .await?;
    assert_eq!(blank.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let path = format!("/api/v1/builders/{}", created.id);
    let response = app
        .put_json(&path, &json!({ "notes": null }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: BuilderResponse = read_json(response).await?;
    assert_eq!(updated.name, "Lennar");
    assert_eq!(updated.notes, None);

    let audit = app.audit_rows("builder", &created.id.to_string()).await?;
    let actions: Vec<&str> = audit.iter().map(|row| row.action.as_str()).collect();
    assert_eq!(actions, ["create", "update"]);
    let update = &audit[1];
    assert_eq!(update.actor, "office");
    assert_eq!(update.tenant_id.as_deref(), Some("all_county"));
    let before = update.before.as_ref().expect("before snapshot");
    let after = update.after.as_ref().expect("after snapshot");
    assert_eq!(before["notes"], "north division");
    assert!(after["notes"].is_null());

    let listed: Vec<Value> = read_json(
        app.get(
            &format!("/api/v1/audit?entity_type=builder&entity_id={}", created.id),
            Some(&token),
        )
        .await?,
    )
    .await?;
    let actions: Vec<&str> = listed
        .iter()
        .filter_map(|row| row["action"].as_str())
        .collect();
    assert_eq!(actions, ["update", "create"]);

    let response = app.delete(&path, Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.get(&path, Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let audit = app.audit_rows("builder", &created.id.to_string()).await?;
    assert_eq!(audit.last().map(|row| row.action.as_str()), Some("delete"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn builders_are_scoped_to_their_tenant() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let county = app.user_token("county", "user", Some("all_county")).await?;
    let coastal = app.user_token("coastal", "user", Some("coastal")).await?;

    let created: BuilderResponse = read_json(
        app.post_json("/api/v1/builders", &json!({ "name": "Pulte" }), Some(&county))
            .await?,
    )
    .await?;

    // The same name is free in another tenant.
    let response = app
        .post_json("/api/v1/builders", &json!({ "name": "Pulte" }), Some(&coastal))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let path = format!("/api/v1/builders/{}", created.id);
    let response = app.get(&path, Some(&coastal)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app
        .put_json(&path, &json!({ "name": "Taken" }), Some(&coastal))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_json(
            "/api/v1/builders",
            &json!({ "name": "Elsewhere", "tenant_id": "all_county" }),
            Some(&coastal),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let listed: Vec<BuilderResponse> =
        read_json(app.get("/api/v1/builders", Some(&coastal)).await?).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].tenant_id.as_deref(), Some("coastal"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn timed_out_updates_roll_back_without_audit() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::with_request_timeout(Duration::from_secs(1)).await?;
    let token = app.user_token("office", "user", Some("all_county")).await?;

    let created: BuilderResponse = read_json(
        app.post_json(
            "/api/v1/builders",
            &json!({ "name": "Pulte", "notes": "original" }),
            Some(&token),
        )
        .await?,
    )
    .await?;

    // Another session keeps the row locked past the request deadline.
    let holder = app
        .hold_lock(
            &format!("SELECT id FROM builders WHERE id = '{}' FOR UPDATE", created.id),
            Duration::from_secs(3),
        )
        .await?;

    let path = format!("/api/v1/builders/{}", created.id);
    let response = app
        .put_json(&path, &json!({ "notes": "changed" }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = read_json(response).await?;
    assert_eq!(body["code"], "timeout");

    holder.await??;

    let current: BuilderResponse = read_json(app.get(&path, Some(&token)).await?).await?;
    assert_eq!(current.notes.as_deref(), Some("original"));
    let audit = app.audit_rows("builder", &created.id.to_string()).await?;
    let actions: Vec<&str> = audit.iter().map(|row| row.action.as_str()).collect();
    assert_eq!(actions, ["create"]);

    app.cleanup().await?;
    Ok(())
}
