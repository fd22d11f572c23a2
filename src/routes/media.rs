use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use super::content::lock_content_item;
use crate::{
    audit::AuditEntry,
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{MediaAsset, NewMediaAsset},
    publishing::media::{normalize_intent_tags, resolve_media_kind},
    schema::media_assets,
    scope_to_tenant,
    state::AppState,
    utils::json::{optional_text, required_text},
};

#[derive(Debug, Default, Deserialize)]
pub struct MediaFilters {
    pub content_item_id: Option<Uuid>,
    pub intent_tag: Option<String>,
}

pub async fn list_media_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<MediaFilters>,
) -> AppResult<Json<Vec<MediaAsset>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let mut query = scope_to_tenant!(
                media_assets::table.into_boxed(),
                media_assets::tenant_id,
                filter
            );
            if let Some(content_item_id) = filters.content_item_id {
                query = query.filter(media_assets::content_item_id.eq(content_item_id));
            }
            if let Some(tag) = optional_text(filters.intent_tag) {
                query = query.filter(media_assets::intent_tags.contains(vec![tag]));
            }
            Ok(query
                .order(media_assets::created_at.desc())
                .load::<MediaAsset>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct CreateMediaAssetRequest {
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub content_item_id: Option<Uuid>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub intent_tags: Vec<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Assets attached to a content item live in that item's tenant; orphans
/// follow the usual tenant rules.
pub async fn create_media_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateMediaAssetRequest>,
) -> AppResult<Json<MediaAsset>> {
    let file_name = required_text("file_name", &payload.file_name)?;
    let file_url = required_text("file_url", &payload.file_url)?;
    if payload.file_size.is_some_and(|size| size < 0) {
        return Err(AppError::validation("file_size must not be negative"));
    }
    let kind = resolve_media_kind(
        &file_name,
        payload.file_type.as_deref(),
        payload.mime_type.as_deref(),
    )?;
    let requested_tenant = user.resolve_tenant(payload.tenant_id)?;

    let asset = state
        .transact(move |conn| {
            let tenant_id = match payload.content_item_id {
                Some(content_item_id) => lock_content_item(conn, &user, content_item_id)
                    .map_err(|err| match err.status() {
                        StatusCode::NOT_FOUND => {
                            AppError::validation("content_item_id does not refer to a known item")
                        }
                        _ => err,
                    })?
                    .tenant_id,
                None => requested_tenant,
            };
            let asset: MediaAsset = diesel::insert_into(media_assets::table)
                .values(&NewMediaAsset {
                    id: Uuid::new_v4(),
                    tenant_id,
                    content_item_id: payload.content_item_id,
                    file_name,
                    file_url,
                    file_type: kind.file_type,
                    file_size: payload.file_size,
                    mime_type: kind.mime_type,
                    intent_tags: normalize_intent_tags(payload.intent_tags),
                })
                .get_result(conn)?;
            AuditEntry::created(&asset)?.write(conn, &user.username)?;
            Ok(asset)
        })
        .await?;
    Ok(Json(asset))
}

pub async fn delete_media_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .transact(move |conn| {
            let before = media_assets::table
                .find(id)
                .for_update()
                .first::<MediaAsset>(conn)?;
            user.ensure_access(before.tenant_id.as_deref())?;
            diesel::delete(media_assets::table.find(id)).execute(conn)?;
            AuditEntry::deleted(&before)?.write(conn, &user.username)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
