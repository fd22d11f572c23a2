use axum::{
    extract::{Query, State},
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    models::AuditRecord,
    schema::audit_log,
    scope_to_tenant,
    state::AppState,
    utils::json::optional_text,
};

const MAX_ROWS: i64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<i64>,
}

/// Newest first. Admins read every tenant; everyone else reads their own.
pub async fn list_audit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<AuditQuery>,
) -> AppResult<Json<Vec<AuditRecord>>> {
    let filter = user.tenant_filter();
    let limit = params.limit.unwrap_or(MAX_ROWS).clamp(1, MAX_ROWS);
    let rows = state
        .transact(move |conn| {
            let mut query =
                scope_to_tenant!(audit_log::table.into_boxed(), audit_log::tenant_id, filter);
            if let Some(entity_type) = optional_text(params.entity_type) {
                query = query.filter(audit_log::entity_type.eq(entity_type));
            }
            if let Some(entity_id) = optional_text(params.entity_id) {
                query = query.filter(audit_log::entity_id.eq(entity_id));
            }
            Ok(query
                .order((audit_log::created_at.desc(), audit_log::id.desc()))
                .limit(limit)
                .load::<AuditRecord>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}
