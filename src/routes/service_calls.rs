use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Customer, Job, NewServiceCall, ServiceCall, ServiceCallChanges},
    schema::{customers, jobs, service_calls},
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text, required_text, updated_text},
    utils::time::{naive, now},
};

#[derive(Debug, Default, Deserialize)]
pub struct ServiceCallFilters {
    pub status: Option<String>,
}

pub async fn list_service_calls(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<ServiceCallFilters>,
) -> AppResult<Json<Vec<ServiceCall>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let mut query = scope_to_tenant!(
                service_calls::table.into_boxed(),
                service_calls::tenant_id,
                filter
            );
            if let Some(status) = optional_text(filters.status) {
                query = query.filter(service_calls::status.eq(status));
            }
            Ok(query
                .order(service_calls::created_at.desc())
                .load::<ServiceCall>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct CreateServiceCallRequest {
    pub summary: String,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub requested_date: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_service_call(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateServiceCallRequest>,
) -> AppResult<Json<ServiceCall>> {
    let new_call = NewServiceCall {
        id: Uuid::new_v4(),
        tenant_id: user.resolve_tenant(payload.tenant_id)?,
        customer_id: payload.customer_id,
        job_id: payload.job_id,
        summary: required_text("summary", &payload.summary)?,
        description: optional_text(payload.description),
        status: optional_text(payload.status).unwrap_or_else(|| "open".to_string()),
        priority: optional_text(payload.priority).unwrap_or_else(|| "normal".to_string()),
        assigned_to: optional_text(payload.assigned_to),
        requested_date: payload.requested_date,
        scheduled_start: naive(payload.scheduled_start),
        scheduled_end: naive(payload.scheduled_end),
        address: optional_text(payload.address),
    };

    let call = state
        .transact(move |conn| {
            ensure_references(conn, &user, new_call.customer_id, new_call.job_id)?;
            let call: ServiceCall = diesel::insert_into(service_calls::table)
                .values(&new_call)
                .get_result(conn)?;
            AuditEntry::created(&call)?.write(conn, &user.username)?;
            Ok(call)
        })
        .await?;
    Ok(Json(call))
}

#[derive(Deserialize)]
pub struct UpdateServiceCallRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub customer_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub job_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub requested_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub scheduled_start: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub scheduled_end: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
}

pub async fn update_service_call(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateServiceCallRequest>,
) -> AppResult<Json<ServiceCall>> {
    let changes = ServiceCallChanges {
        customer_id: payload.customer_id,
        job_id: payload.job_id,
        summary: updated_text("summary", payload.summary)?,
        description: payload.description.map(optional_text),
        status: updated_text("status", payload.status)?,
        priority: updated_text("priority", payload.priority)?,
        assigned_to: payload.assigned_to.map(optional_text),
        requested_date: payload.requested_date,
        scheduled_start: payload.scheduled_start.map(naive),
        scheduled_end: payload.scheduled_end.map(naive),
        completed_at: payload.completed_at.map(naive),
        address: payload.address.map(optional_text),
        updated_at: now(),
    };

    let call = state
        .transact(move |conn| {
            let before = service_calls::table
                .find(id)
                .for_update()
                .first::<ServiceCall>(conn)?;
            user.ensure_access(before.tenant_id.as_deref())?;
            ensure_references(
                conn,
                &user,
                changes.customer_id.flatten(),
                changes.job_id.flatten(),
            )?;
            let after: ServiceCall = diesel::update(service_calls::table.find(id))
                .set(&changes)
                .get_result(conn)?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(call))
}

/// Linked customers and jobs must be visible to the caller.
fn ensure_references(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    customer_id: Option<Uuid>,
    job_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(customer_id) = customer_id {
        let visible = customers::table
            .find(customer_id)
            .first::<Customer>(conn)
            .optional()?
            .is_some_and(|customer| user.can_access(customer.tenant_id.as_deref()));
        if !visible {
            return Err(AppError::validation("customer_id does not refer to a known customer"));
        }
    }
    if let Some(job_id) = job_id {
        let visible = jobs::table
            .find(job_id)
            .first::<Job>(conn)
            .optional()?
            .is_some_and(|job| user.can_access(job.tenant_id.as_deref()));
        if !visible {
            return Err(AppError::validation("job_id does not refer to a known job"));
        }
    }
    Ok(())
}
