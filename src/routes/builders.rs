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
    error::{unique_conflict, AppError, AppResult},
    models::{Builder, BuilderChanges, NewBuilder},
    schema::builders,
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text, required_text, updated_text},
    utils::time::now,
};

const DUPLICATE_NAME: &str = "a builder with this name already exists";

pub async fn list_builders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Builder>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let query = scope_to_tenant!(builders::table.into_boxed(), builders::tenant_id, filter);
            Ok(query.order(builders::name.asc()).load::<Builder>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_builder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Builder>> {
    let builder = state
        .transact(move |conn| {
            let builder = builders::table.find(id).first::<Builder>(conn)?;
            user.ensure_access(builder.tenant_id.as_deref())?;
            Ok(builder)
        })
        .await?;
    Ok(Json(builder))
}

#[derive(Deserialize)]
pub struct CreateBuilderRequest {
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_builder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateBuilderRequest>,
) -> AppResult<Json<Builder>> {
    let new_builder = NewBuilder {
        id: Uuid::new_v4(),
        tenant_id: user.resolve_tenant(payload.tenant_id)?,
        name: required_text("name", &payload.name)?,
        notes: optional_text(payload.notes),
    };

    let builder = state
        .transact(move |conn| {
            let builder: Builder = diesel::insert_into(builders::table)
                .values(&new_builder)
                .get_result(conn)
                .map_err(unique_conflict(DUPLICATE_NAME))?;
            AuditEntry::created(&builder)?.write(conn, &user.username)?;
            Ok(builder)
        })
        .await?;
    Ok(Json(builder))
}

#[derive(Deserialize)]
pub struct UpdateBuilderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

pub async fn update_builder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBuilderRequest>,
) -> AppResult<Json<Builder>> {
    let changes = BuilderChanges {
        name: updated_text("name", payload.name)?,
        notes: payload.notes.map(optional_text),
        updated_at: now(),
    };

    let builder = state
        .transact(move |conn| {
            let before = lock_builder(conn, &user, id)?;
            let after: Builder = diesel::update(builders::table.find(id))
                .set(&changes)
                .get_result(conn)
                .map_err(unique_conflict(DUPLICATE_NAME))?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(builder))
}

/// Builders that still own jobs cannot be removed (409).
pub async fn delete_builder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .transact(move |conn| {
            let before = lock_builder(conn, &user, id)?;
            diesel::delete(builders::table.find(id))
                .execute(conn)
                .map_err(|err| match AppError::from(err) {
                    conflict if conflict.status() == StatusCode::CONFLICT => {
                        AppError::conflict("builder still has jobs")
                    }
                    other => other,
                })?;
            AuditEntry::deleted(&before)?.write(conn, &user.username)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn lock_builder(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
) -> AppResult<Builder> {
    let builder = builders::table
        .find(id)
        .for_update()
        .first::<Builder>(conn)?;
    user.ensure_access(builder.tenant_id.as_deref())?;
    Ok(builder)
}
