mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn deleting_content_cascades_media_with_audit() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.user_token("marketing", "user", Some("all_county")).await?;

    let item: Value = read_json(
        app.post_json(
            "/api/v1/content_items",
            &json!({ "title": "Before/after", "body": "New condenser install.", "content_category": "projects" }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    let item_id = item["id"].as_str().unwrap_or_default().to_string();
    assert_eq!(item["created_by"], "marketing");

    let photo: Value = read_json(
        app.post_json(
            "/api/v1/media_assets",
            &json!({
                "content_item_id": item_id,
                "file_name": "condenser.jpg",
                "file_url": "https://cdn.example.com/condenser.jpg",
                "intent_tags": [" before ", "after", "", "before"]
            }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    assert_eq!(photo["file_type"], "image");
    assert_eq!(photo["mime_type"], "image/jpeg");
    assert_eq!(photo["intent_tags"], json!(["before", "after"]));
    assert_eq!(photo["tenant_id"], "all_county");

    let clip: Value = read_json(
        app.post_json(
            "/api/v1/media_assets",
            &json!({
                "content_item_id": item_id,
                "file_name": "walkthrough.mp4",
                "file_url": "https://cdn.example.com/walkthrough.mp4"
            }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    assert_eq!(clip["file_type"], "video");

    let rejected = app
        .post_json(
            "/api/v1/media_assets",
            &json!({ "file_name": "invoice.pdf", "file_url": "https://cdn.example.com/invoice.pdf" }),
            Some(&token),
        )
        .await?;
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let tagged: Vec<Value> = read_json(
        app.get("/api/v1/media_assets?intent_tag=before", Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(tagged.len(), 1);

    let post: Value = read_json(
        app.post_json(
            "/api/v1/post_instances",
            &json!({ "content_item_id": item_id }),
            Some(&token),
        )
        .await?,
    )
    .await?;

    let response = app
        .put_json(
            &format!("/api/v1/content_items/{item_id}"),
            &json!({ "title": null, "body": "New condenser install, 16 SEER." }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = read_json(response).await?;
    assert!(updated["title"].is_null());

    let response = app
        .delete(&format!("/api/v1/content_items/{item_id}"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let remaining: Vec<Value> =
        read_json(app.get("/api/v1/media_assets", Some(&token)).await?).await?;
    assert!(remaining.is_empty());

    let item_audit = app.audit_rows("content_item", &item_id).await?;
    let actions: Vec<&str> = item_audit.iter().map(|row| row.action.as_str()).collect();
    assert_eq!(actions, ["create", "update", "delete"]);

    for asset in [&photo, &clip] {
        let asset_audit = app
            .audit_rows("media_asset", asset["id"].as_str().unwrap_or_default())
            .await?;
        let actions: Vec<&str> = asset_audit.iter().map(|row| row.action.as_str()).collect();
        assert_eq!(actions, ["create", "delete"]);
        assert_eq!(asset_audit[1].actor, "marketing");
    }

    let orphaned: Value = read_json(
        app.get(
            &format!("/api/v1/post_instances/{}", post["id"].as_str().unwrap_or_default()),
            Some(&token),
        )
        .await?,
    )
    .await?;
    assert!(orphaned["content_item_id"].is_null());

    let post_audit = app
        .audit_rows("post_instance", post["id"].as_str().unwrap_or_default())
        .await?;
    let actions: Vec<&str> = post_audit.iter().map(|row| row.action.as_str()).collect();
    assert_eq!(actions, ["create", "update"]);
    let detached = &post_audit[1];
    assert_eq!(detached.actor, "marketing");
    let before = detached.before.as_ref().expect("before snapshot");
    let after = detached.after.as_ref().expect("after snapshot");
    assert_eq!(before["content_item_id"].as_str(), Some(item_id.as_str()));
    assert!(after["content_item_id"].is_null());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn media_cannot_attach_to_other_tenants_content() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let county = app.user_token("county", "user", Some("all_county")).await?;
    let coastal = app.user_token("coastal", "user", Some("coastal")).await?;

    let item: Value = read_json(
        app.post_json("/api/v1/content_items", &json!({ "body": "Private" }), Some(&county))
            .await?,
    )
    .await?;

    let response = app
        .post_json(
            "/api/v1/media_assets",
            &json!({
                "content_item_id": item["id"],
                "file_name": "x.png",
                "file_url": "https://cdn.example.com/x.png"
            }),
            Some(&coastal),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .delete(
            &format!("/api/v1/content_items/{}", item["id"].as_str().unwrap_or_default()),
            Some(&coastal),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}
