use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use super::jobs::lock_job;
use crate::{
    audit::AuditEntry,
    auth::AuthenticatedUser,
    error::AppResult,
    models::{JobTask, JobTaskChanges, NewJobTask},
    schema::job_tasks,
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text, required_text, updated_text},
    utils::time::now,
};

pub const TASK_DONE: &str = "done";
const TASK_PENDING: &str = "pending";

/// `completed_at` follows the status: set on entering `done`, cleared on
/// leaving it.
fn completion_change(
    previous: Option<&str>,
    next: &str,
    at: NaiveDateTime,
) -> Option<Option<NaiveDateTime>> {
    match (previous == Some(TASK_DONE), next == TASK_DONE) {
        (false, true) => Some(Some(at)),
        (true, false) => Some(None),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct JobTaskFilters {
    pub job_id: Option<Uuid>,
}

pub async fn list_job_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<JobTaskFilters>,
) -> AppResult<Json<Vec<JobTask>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let mut query =
                scope_to_tenant!(job_tasks::table.into_boxed(), job_tasks::tenant_id, filter);
            if let Some(job_id) = filters.job_id {
                query = query.filter(job_tasks::job_id.eq(job_id));
            }
            Ok(query
                .order(job_tasks::created_at.asc())
                .load::<JobTask>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct CreateJobTaskRequest {
    pub job_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Tasks inherit the tenant of their job.
pub async fn create_job_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateJobTaskRequest>,
) -> AppResult<Json<JobTask>> {
    let title = required_text("title", &payload.title)?;
    let status = optional_text(payload.status).unwrap_or_else(|| TASK_PENDING.to_string());

    let task = state
        .transact(move |conn| {
            let job = lock_job(conn, &user, payload.job_id)?;
            let completed_at = completion_change(None, &status, now()).flatten();
            let task: JobTask = diesel::insert_into(job_tasks::table)
                .values(&NewJobTask {
                    id: Uuid::new_v4(),
                    tenant_id: job.tenant_id,
                    job_id: job.id,
                    title,
                    description: optional_text(payload.description),
                    status,
                    assigned_to: optional_text(payload.assigned_to),
                    due_date: payload.due_date,
                    completed_at,
                })
                .get_result(conn)?;
            AuditEntry::created(&task)?.write(conn, &user.username)?;
            Ok(task)
        })
        .await?;
    Ok(Json(task))
}

#[derive(Deserialize)]
pub struct UpdateJobTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
}

pub async fn update_job_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateJobTaskRequest>,
) -> AppResult<Json<JobTask>> {
    let title = updated_text("title", payload.title)?;
    let status = updated_text("status", payload.status)?;

    let task = state
        .transact(move |conn| {
            let before = lock_task(conn, &user, id)?;
            let stamp = now();
            let completed_at = status
                .as_deref()
                .and_then(|next| completion_change(Some(&before.status), next, stamp));
            let changes = JobTaskChanges {
                title,
                description: payload.description.map(optional_text),
                status,
                assigned_to: payload.assigned_to.map(optional_text),
                due_date: payload.due_date,
                completed_at,
                updated_at: stamp,
            };
            let after: JobTask = diesel::update(job_tasks::table.find(id))
                .set(&changes)
                .get_result(conn)?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(task))
}

pub async fn delete_job_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .transact(move |conn| {
            let before = lock_task(conn, &user, id)?;
            diesel::delete(job_tasks::table.find(id)).execute(conn)?;
            AuditEntry::deleted(&before)?.write(conn, &user.username)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn lock_task(conn: &mut PgConnection, user: &AuthenticatedUser, id: Uuid) -> AppResult<JobTask> {
    let task = job_tasks::table
        .find(id)
        .for_update()
        .first::<JobTask>(conn)?;
    user.ensure_access(task.tenant_id.as_deref())?;
    Ok(task)
}
