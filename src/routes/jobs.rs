use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    auth::AuthenticatedUser,
    error::{unique_conflict, AppError, AppResult},
    models::{Builder, Job, JobChanges, JobTask, NewJob, ServiceCall},
    schema::{builders, job_tasks, jobs, service_calls},
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text, required_text, updated_text},
    utils::time::now,
};

const DUPLICATE_JOB: &str = "a job with this builder, community, lot and phase already exists";

#[derive(Debug, Default, Deserialize)]
pub struct JobFilters {
    pub builder_id: Option<Uuid>,
    pub status: Option<String>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<JobFilters>,
) -> AppResult<Json<Vec<Job>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let mut query = scope_to_tenant!(jobs::table.into_boxed(), jobs::tenant_id, filter);
            if let Some(builder_id) = filters.builder_id {
                query = query.filter(jobs::builder_id.eq(builder_id));
            }
            if let Some(status) = optional_text(filters.status) {
                query = query.filter(jobs::status.eq(status));
            }
            Ok(query
                .order((jobs::community.asc(), jobs::lot_number.asc()))
                .load::<Job>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    let job = state
        .transact(move |conn| {
            let job = jobs::table.find(id).first::<Job>(conn)?;
            user.ensure_access(job.tenant_id.as_deref())?;
            Ok(job)
        })
        .await?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub builder_id: Uuid,
    pub community: String,
    pub lot_number: String,
    pub phase: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tech_name: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub warranty_start: Option<NaiveDate>,
    #[serde(default)]
    pub warranty_end: Option<NaiveDate>,
    #[serde(default)]
    pub warranty_notes: Option<String>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateJobRequest>,
) -> AppResult<Json<Job>> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        tenant_id: user.resolve_tenant(payload.tenant_id)?,
        builder_id: payload.builder_id,
        community: required_text("community", &payload.community)?,
        lot_number: required_text("lot_number", &payload.lot_number)?,
        phase: required_text("phase", &payload.phase)?,
        status: optional_text(payload.status).unwrap_or_else(|| "open".to_string()),
        address: optional_text(payload.address),
        tech_name: optional_text(payload.tech_name),
        assigned_to: optional_text(payload.assigned_to),
        warranty_start: payload.warranty_start,
        warranty_end: payload.warranty_end,
        warranty_notes: optional_text(payload.warranty_notes),
        completion_date: payload.completion_date,
    };

    let job = state
        .transact(move |conn| {
            ensure_builder(conn, &user, new_job.builder_id, new_job.tenant_id.as_deref())?;
            let job: Job = diesel::insert_into(jobs::table)
                .values(&new_job)
                .get_result(conn)
                .map_err(unique_conflict(DUPLICATE_JOB))?;
            AuditEntry::created(&job)?.write(conn, &user.username)?;
            Ok(job)
        })
        .await?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct UpdateJobRequest {
    #[serde(default)]
    pub builder_id: Option<Uuid>,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tech_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub warranty_start: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub warranty_end: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub warranty_notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completion_date: Option<Option<NaiveDate>>,
}

pub async fn update_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateJobRequest>,
) -> AppResult<Json<Job>> {
    let changes = JobChanges {
        builder_id: payload.builder_id,
        community: updated_text("community", payload.community)?,
        lot_number: updated_text("lot_number", payload.lot_number)?,
        phase: updated_text("phase", payload.phase)?,
        status: updated_text("status", payload.status)?,
        address: payload.address.map(optional_text),
        tech_name: payload.tech_name.map(optional_text),
        assigned_to: payload.assigned_to.map(optional_text),
        warranty_start: payload.warranty_start,
        warranty_end: payload.warranty_end,
        warranty_notes: payload.warranty_notes.map(optional_text),
        completion_date: payload.completion_date,
        updated_at: now(),
    };

    let job = state
        .transact(move |conn| {
            let before = lock_job(conn, &user, id)?;
            if let Some(builder_id) = changes.builder_id {
                ensure_builder(conn, &user, builder_id, before.tenant_id.as_deref())?;
            }
            let after: Job = diesel::update(jobs::table.find(id))
                .set(&changes)
                .get_result(conn)
                .map_err(unique_conflict(DUPLICATE_JOB))?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(job))
}

/// Removes the job and, through the foreign key, its tasks.
pub async fn delete_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .transact(move |conn| {
            let before = lock_job(conn, &user, id)?;
            let tasks = job_tasks::table
                .filter(job_tasks::job_id.eq(id))
                .for_update()
                .load::<JobTask>(conn)?;
            let calls = service_calls::table
                .filter(service_calls::job_id.eq(id))
                .for_update()
                .load::<ServiceCall>(conn)?;

            diesel::delete(jobs::table.find(id)).execute(conn)?;

            AuditEntry::deleted(&before)?.write(conn, &user.username)?;
            for task in &tasks {
                AuditEntry::deleted(task)?.write(conn, &user.username)?;
            }
            // Service calls outlive the job with `job_id` nulled.
            for call in &calls {
                let after = service_calls::table
                    .find(call.id)
                    .first::<ServiceCall>(conn)?;
                AuditEntry::updated(call, &after)?.write(conn, &user.username)?;
            }
            tracing::info!(
                job_id = %id,
                cascaded_tasks = tasks.len(),
                detached_service_calls = calls.len(),
                "job deleted"
            );
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn lock_job(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
) -> AppResult<Job> {
    let job = jobs::table.find(id).for_update().first::<Job>(conn)?;
    user.ensure_access(job.tenant_id.as_deref())?;
    Ok(job)
}

/// The builder must be global or live in the job's tenant.
fn ensure_builder(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    builder_id: Uuid,
    tenant_id: Option<&str>,
) -> AppResult<()> {
    let builder = builders::table
        .find(builder_id)
        .first::<Builder>(conn)
        .optional()?
        .filter(|builder| {
            builder.tenant_id.is_none() || user.can_access(builder.tenant_id.as_deref())
        })
        .ok_or_else(|| AppError::validation("builder_id does not refer to a known builder"))?;
    if builder.tenant_id.is_some() && builder.tenant_id.as_deref() != tenant_id {
        return Err(AppError::validation(
            "builder belongs to a different tenant than the job",
        ));
    }
    Ok(())
}
