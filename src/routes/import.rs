use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    import::{import_events, ImportSummary, JobEvent},
    state::AppState,
};

#[derive(Deserialize)]
pub struct ImportJobsRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub events: Vec<JobEvent>,
}

/// Each event is its own savepoint inside the request transaction, so a bad
/// event is counted and skipped without losing the others.
pub async fn import_jobs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ImportJobsRequest>,
) -> AppResult<Json<ImportSummary>> {
    let tenant_id = user.resolve_tenant(payload.tenant_id)?;
    let summary = state
        .transact(move |conn| {
            Ok(import_events(
                conn,
                tenant_id.as_deref(),
                payload.events.into_iter().map(Ok),
                &user.username,
            ))
        })
        .await?;
    Ok(Json(summary))
}
