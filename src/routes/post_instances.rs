use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    auth::{AuthenticatedUser, ROLE_PUBLISHER},
    error::{AppError, AppResult},
    models::{ContentItem, NewPostInstance, PostInstance, PostInstanceChanges},
    publishing::workflow::{
        self, current_status, ensure_editable, next_status, Actor, AttachedContent, Command,
        PostEvent, PostStatus, OVERDUE_STATUSES,
    },
    schema::{channel_accounts, content_items, post_instances},
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text},
    utils::time::{naive, now},
};

#[derive(Debug, Default, Deserialize)]
pub struct PostFilters {
    pub status: Option<String>,
    pub channel_id: Option<Uuid>,
}

pub async fn list_post_instances(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<PostFilters>,
) -> AppResult<Json<Vec<PostInstance>>> {
    let status = optional_text(filters.status)
        .map(|raw| raw.parse::<PostStatus>())
        .transpose()?;
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let mut query = scope_to_tenant!(
                post_instances::table.into_boxed(),
                post_instances::tenant_id,
                filter
            );
            if let Some(status) = status {
                query = query.filter(post_instances::status.eq(status.as_str()));
            }
            if let Some(channel_id) = filters.channel_id {
                query = query.filter(post_instances::channel_ids.contains(vec![channel_id]));
            }
            Ok(query
                .order(post_instances::created_at.desc())
                .load::<PostInstance>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

/// Drafts and pending approvals whose `draft_due_date` has passed.
pub async fn list_overdue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<PostInstance>>> {
    let filter = user.tenant_filter();
    let statuses: Vec<&'static str> = OVERDUE_STATUSES.iter().map(|s| s.as_str()).collect();
    let rows = state
        .transact(move |conn| {
            let query = scope_to_tenant!(
                post_instances::table.into_boxed(),
                post_instances::tenant_id,
                filter
            );
            Ok(query
                .filter(post_instances::draft_due_date.lt(now()))
                .filter(post_instances::status.eq_any(statuses))
                .order(post_instances::draft_due_date.asc())
                .load::<PostInstance>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

/// Scheduled posts whose time has come, oldest first, for the publisher.
pub async fn list_due(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<PostInstance>>> {
    user.require_any_role(&[ROLE_PUBLISHER])?;
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let query = scope_to_tenant!(
                post_instances::table.into_boxed(),
                post_instances::tenant_id,
                filter
            );
            Ok(query
                .filter(post_instances::status.eq(PostStatus::Scheduled.as_str()))
                .filter(post_instances::scheduled_at.le(now()))
                .order(post_instances::scheduled_at.asc())
                .load::<PostInstance>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_post_instance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostInstance>> {
    let post = state
        .transact(move |conn| {
            let post = post_instances::table.find(id).first::<PostInstance>(conn)?;
            user.ensure_access(post.tenant_id.as_deref())?;
            Ok(post)
        })
        .await?;
    Ok(Json(post))
}

#[derive(Deserialize)]
pub struct CreatePostInstanceRequest {
    #[serde(default)]
    pub channel_ids: Vec<Uuid>,
    #[serde(default)]
    pub content_item_id: Option<Uuid>,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub draft_due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suggested_category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Creates a `Planned` slot authored by the caller.
pub async fn create_post_instance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreatePostInstanceRequest>,
) -> AppResult<Json<PostInstance>> {
    let tenant_id = user.resolve_tenant(payload.tenant_id)?;
    let channel_ids = dedupe(payload.channel_ids);
    let scheduled_at = payload.scheduled_at.map(future_slot).transpose()?;

    let post = state
        .transact(move |conn| {
            ensure_channels(conn, tenant_id.as_deref(), &channel_ids)?;
            if let Some(content_item_id) = payload.content_item_id {
                load_content(conn, tenant_id.as_deref(), content_item_id)?;
            }
            let post: PostInstance = diesel::insert_into(post_instances::table)
                .values(&NewPostInstance {
                    id: Uuid::new_v4(),
                    tenant_id,
                    channel_ids,
                    content_item_id: payload.content_item_id,
                    body_text: optional_text(payload.body_text),
                    draft_due_date: naive(payload.draft_due_date),
                    scheduled_at,
                    status: PostStatus::Planned.as_str().to_string(),
                    author_id: Some(user.user_id),
                    author_username: Some(user.username.clone()),
                    suggested_category: optional_text(payload.suggested_category),
                    notes: optional_text(payload.notes),
                })
                .get_result(conn)?;
            AuditEntry::created(&post)?.write(conn, &user.username)?;
            Ok(post)
        })
        .await?;
    Ok(Json(post))
}

#[derive(Deserialize)]
pub struct UpdatePostInstanceRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub body_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub draft_due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub suggested_category: Option<Option<String>>,
}

/// Field edits, allowed only while the workflow considers the post editable.
pub async fn update_post_instance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostInstanceRequest>,
) -> AppResult<Json<PostInstance>> {
    let scheduled_at = match payload.scheduled_at {
        Some(Some(at)) => Some(Some(future_slot(at)?)),
        Some(None) => Some(None),
        None => None,
    };
    let changes = PostInstanceChanges {
        body_text: payload.body_text.map(optional_text),
        notes: payload.notes.map(optional_text),
        draft_due_date: payload.draft_due_date.map(naive),
        scheduled_at,
        suggested_category: payload.suggested_category.map(optional_text),
        ..Default::default()
    };

    let post = state
        .transact(move |conn| {
            let before = lock_post(conn, &user, id)?;
            ensure_editable(&before)?;
            let after = apply_changes(conn, id, &changes)?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(post))
}

#[derive(Default, Deserialize)]
pub struct AttachContentRequest {
    #[serde(default)]
    pub content_item_id: Option<Uuid>,
    #[serde(default)]
    pub channel_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub suggested_category: Option<String>,
}

pub async fn attach_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<AttachContentRequest>>,
) -> AppResult<Json<PostInstance>> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    transition(&state, user, id, PostEvent::AttachContent, move |conn, post| {
        let tenant_id = post.tenant_id.as_deref();
        let content = payload
            .content_item_id
            .or(post.content_item_id)
            .map(|content_id| load_content(conn, tenant_id, content_id))
            .transpose()?
            .map(|item| AttachedContent {
                id: item.id,
                body: item.body,
                category: item.content_category,
            });
        let channel_ids = payload.channel_ids.map(dedupe);
        ensure_channels(
            conn,
            tenant_id,
            channel_ids.as_deref().unwrap_or(post.channel_ids.as_slice()),
        )?;
        Ok(Command::AttachContent {
            content,
            channel_ids,
            body_text: payload.body_text,
            suggested_category: payload.suggested_category,
        })
    })
    .await
}

pub async fn submit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostInstance>> {
    transition(&state, user, id, PostEvent::Submit, |_, _| Ok(Command::Submit)).await
}

pub async fn approve(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostInstance>> {
    transition(&state, user, id, PostEvent::Approve, |_, _| Ok(Command::Approve)).await
}

#[derive(Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn reject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> AppResult<Json<PostInstance>> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    transition(&state, user, id, PostEvent::Reject, move |_, _| {
        Ok(Command::Reject {
            notes: payload.notes,
        })
    })
    .await
}

#[derive(Default, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

pub async fn schedule(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ScheduleRequest>>,
) -> AppResult<Json<PostInstance>> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    transition(&state, user, id, PostEvent::Schedule, move |_, _| {
        Ok(Command::Schedule {
            scheduled_at: naive(payload.scheduled_at),
        })
    })
    .await
}

pub async fn retry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ScheduleRequest>>,
) -> AppResult<Json<PostInstance>> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    transition(&state, user, id, PostEvent::Retry, move |_, _| {
        Ok(Command::Retry {
            scheduled_at: naive(payload.scheduled_at),
        })
    })
    .await
}

pub async fn publish_ok(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostInstance>> {
    user.require_any_role(&[ROLE_PUBLISHER])?;
    transition(&state, user, id, PostEvent::PublishOk, |_, _| {
        Ok(Command::PublishOk)
    })
    .await
}

#[derive(Default, Deserialize)]
pub struct PublishFailRequest {
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn publish_fail(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<PublishFailRequest>>,
) -> AppResult<Json<PostInstance>> {
    user.require_any_role(&[ROLE_PUBLISHER])?;
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    transition(&state, user, id, PostEvent::PublishFail, move |_, _| {
        Ok(Command::PublishFail {
            error: payload.error,
        })
    })
    .await
}

/// One workflow step in one transaction: lock the row, let the workflow
/// decide, write the row and its audit entry. Idempotent re-deliveries return
/// the row untouched and write nothing.
async fn transition<F>(
    state: &AppState,
    user: AuthenticatedUser,
    id: Uuid,
    event: PostEvent,
    build: F,
) -> AppResult<Json<PostInstance>>
where
    F: FnOnce(&mut PgConnection, &PostInstance) -> AppResult<Command> + Send + 'static,
{
    let post = state
        .transact(move |conn| {
            let before = lock_post(conn, &user, id)?;
            // Off-graph requests fail before any referenced rows are examined.
            next_status(current_status(&before)?, event)?;
            let command = build(conn, &before)?;
            let actor = Actor {
                user_id: user.user_id,
                username: &user.username,
            };
            let plan = workflow::plan(&before, command, &actor, now())?;
            if plan.is_noop() {
                return Ok(before);
            }

            let after = apply_changes(conn, id, &plan.changes)?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            tracing::info!(
                post_instance_id = %id,
                event = plan.event.as_str(),
                from = plan.from.as_str(),
                to = plan.to.as_str(),
                actor = %user.username,
                "workflow transition"
            );
            Ok(after)
        })
        .await?;
    Ok(Json(post))
}

fn apply_changes(
    conn: &mut PgConnection,
    id: Uuid,
    changes: &PostInstanceChanges,
) -> AppResult<PostInstance> {
    Ok(diesel::update(post_instances::table.find(id))
        .set((changes, post_instances::updated_at.eq(now())))
        .get_result(conn)?)
}

fn lock_post(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
) -> AppResult<PostInstance> {
    let post = post_instances::table
        .find(id)
        .for_update()
        .first::<PostInstance>(conn)?;
    user.ensure_access(post.tenant_id.as_deref())?;
    Ok(post)
}

/// The content item must exist in the post's tenant.
fn load_content(
    conn: &mut PgConnection,
    tenant_id: Option<&str>,
    content_item_id: Uuid,
) -> AppResult<ContentItem> {
    content_items::table
        .find(content_item_id)
        .first::<ContentItem>(conn)
        .optional()?
        .filter(|item| item.tenant_id.as_deref() == tenant_id)
        .ok_or_else(|| AppError::validation("content_item_id does not refer to a known item"))
}

/// Every channel id must name a channel account in the post's tenant.
fn ensure_channels(
    conn: &mut PgConnection,
    tenant_id: Option<&str>,
    channel_ids: &[Uuid],
) -> AppResult<()> {
    if channel_ids.is_empty() {
        return Ok(());
    }
    let found: Vec<(Uuid, Option<String>)> = channel_accounts::table
        .filter(channel_accounts::id.eq_any(channel_ids))
        .select((channel_accounts::id, channel_accounts::tenant_id))
        .load(conn)?;
    let valid: HashSet<Uuid> = found
        .into_iter()
        .filter(|(_, account_tenant)| account_tenant.as_deref() == tenant_id)
        .map(|(id, _)| id)
        .collect();
    match channel_ids.iter().find(|id| !valid.contains(id)) {
        Some(missing) => Err(AppError::validation(format!(
            "channel account {missing} does not exist in this tenant"
        ))),
        None => Ok(()),
    }
}

/// A planned publication slot set while drafting; it must lie ahead.
fn future_slot(at: DateTime<Utc>) -> AppResult<NaiveDateTime> {
    let at = at.naive_utc();
    if at <= now() {
        return Err(AppError::validation("scheduled_at must be in the future"));
    }
    Ok(at)
}

fn dedupe(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
