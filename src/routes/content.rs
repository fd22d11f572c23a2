use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    auth::AuthenticatedUser,
    error::AppResult,
    models::{ContentItem, ContentItemChanges, MediaAsset, NewContentItem, PostInstance},
    schema::{content_items, media_assets, post_instances},
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text, required_text, updated_text},
    utils::time::now,
};

pub async fn list_content_items(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ContentItem>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let query = scope_to_tenant!(
                content_items::table.into_boxed(),
                content_items::tenant_id,
                filter
            );
            Ok(query
                .order(content_items::created_at.desc())
                .load::<ContentItem>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct CreateContentItemRequest {
    pub body: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content_category: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_content_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateContentItemRequest>,
) -> AppResult<Json<ContentItem>> {
    let new_item = NewContentItem {
        id: Uuid::new_v4(),
        tenant_id: user.resolve_tenant(payload.tenant_id)?,
        title: optional_text(payload.title),
        body: required_text("body", &payload.body)?,
        content_category: optional_text(payload.content_category),
        created_by: Some(user.username.clone()),
    };

    let item = state
        .transact(move |conn| {
            let item: ContentItem = diesel::insert_into(content_items::table)
                .values(&new_item)
                .get_result(conn)?;
            AuditEntry::created(&item)?.write(conn, &user.username)?;
            Ok(item)
        })
        .await?;
    Ok(Json(item))
}

#[derive(Deserialize)]
pub struct UpdateContentItemRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub content_category: Option<Option<String>>,
}

pub async fn update_content_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateContentItemRequest>,
) -> AppResult<Json<ContentItem>> {
    let changes = ContentItemChanges {
        title: payload.title.map(optional_text),
        body: updated_text("body", payload.body)?,
        content_category: payload.content_category.map(optional_text),
        updated_at: now(),
    };

    let item = state
        .transact(move |conn| {
            let before = lock_content_item(conn, &user, id)?;
            let after: ContentItem = diesel::update(content_items::table.find(id))
                .set(&changes)
                .get_result(conn)?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(item))
}

/// Deletes the item; its media assets go with it through the foreign key and
/// each one gets its own delete entry. Posts that referenced the item keep
/// their row with the reference cleared.
pub async fn delete_content_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .transact(move |conn| {
            let before = lock_content_item(conn, &user, id)?;
            let assets = media_assets::table
                .filter(media_assets::content_item_id.eq(id))
                .for_update()
                .load::<MediaAsset>(conn)?;
            let posts = post_instances::table
                .filter(post_instances::content_item_id.eq(id))
                .for_update()
                .load::<PostInstance>(conn)?;

            diesel::delete(content_items::table.find(id)).execute(conn)?;

            AuditEntry::deleted(&before)?.write(conn, &user.username)?;
            for asset in &assets {
                AuditEntry::deleted(asset)?.write(conn, &user.username)?;
            }
            // The foreign key nulled `content_item_id` on these posts.
            for post in &posts {
                let after = post_instances::table
                    .find(post.id)
                    .first::<PostInstance>(conn)?;
                AuditEntry::updated(post, &after)?.write(conn, &user.username)?;
            }
            tracing::info!(
                content_item_id = %id,
                cascaded_assets = assets.len(),
                detached_posts = posts.len(),
                "content item deleted"
            );
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn lock_content_item(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
) -> AppResult<ContentItem> {
    let item = content_items::table
        .find(id)
        .for_update()
        .first::<ContentItem>(conn)?;
    user.ensure_access(item.tenant_id.as_deref())?;
    Ok(item)
}
