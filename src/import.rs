//! Bulk job import. Each event is applied in its own transaction (a savepoint
//! when the caller already holds one): the builder is found or created by
//! name, then the job is inserted unless its composite key already exists.

use chrono::NaiveDate;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::error::AppError;
use crate::models::{Builder, Job, NewBuilder, NewJob};
use crate::schema::{builders, jobs};

pub const IMPORT_ACTOR: &str = "import";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("audit write failed: {0}")]
    Audit(#[from] AppError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobEvent {
    pub builder: String,
    pub community: String,
    pub lot_number: String,
    pub phase: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tech_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
}

struct ValidJob {
    builder: String,
    community: String,
    lot_number: String,
    phase: String,
    address: Option<String>,
    tech_name: Option<String>,
    status: String,
    completion_date: Option<NaiveDate>,
}

impl JobEvent {
    fn validate(&self) -> Result<ValidJob, ImportError> {
        fn key(field: &'static str, value: &str) -> Result<String, ImportError> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ImportError::BlankField(field))
            } else {
                Ok(trimmed.to_string())
            }
        }
        fn optional(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        }

        Ok(ValidJob {
            builder: key("builder", &self.builder)?,
            community: key("community", &self.community)?,
            lot_number: key("lot_number", &self.lot_number)?,
            phase: key("phase", &self.phase)?,
            address: optional(&self.address),
            tech_name: optional(&self.tech_name),
            status: optional(&self.status).unwrap_or_else(|| "open".to_string()),
            completion_date: self.completion_date,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Created,
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ImportSummary {
    pub fn record(&mut self, outcome: &Result<EventOutcome, ImportError>) {
        match outcome {
            Ok(EventOutcome::Created) => self.created += 1,
            Ok(EventOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.errors += 1,
        }
    }
}

/// Runs every event, counting failures instead of aborting the batch.
pub fn import_events<I>(
    conn: &mut PgConnection,
    tenant_id: Option<&str>,
    events: I,
    actor: &str,
) -> ImportSummary
where
    I: IntoIterator<Item = Result<JobEvent, ImportError>>,
{
    let mut summary = ImportSummary::default();
    for (index, event) in events.into_iter().enumerate() {
        let outcome = event.and_then(|event| import_event(conn, tenant_id, &event, actor));
        if let Err(err) = &outcome {
            tracing::warn!(component = "import", event = index + 1, error = %err, "event rejected");
        }
        summary.record(&outcome);
    }
    tracing::info!(
        component = "import",
        created = summary.created,
        skipped = summary.skipped,
        errors = summary.errors,
        "import finished"
    );
    summary
}

pub fn import_event(
    conn: &mut PgConnection,
    tenant_id: Option<&str>,
    event: &JobEvent,
    actor: &str,
) -> Result<EventOutcome, ImportError> {
    let job = event.validate()?;
    conn.transaction(|conn| {
        let builder = find_or_create_builder(conn, tenant_id, &job.builder, actor)?;

        let inserted = diesel::insert_into(jobs::table)
            .values(&NewJob {
                id: Uuid::new_v4(),
                tenant_id: tenant_id.map(str::to_string),
                builder_id: builder.id,
                community: job.community,
                lot_number: job.lot_number,
                phase: job.phase,
                status: job.status,
                address: job.address,
                tech_name: job.tech_name,
                assigned_to: None,
                warranty_start: None,
                warranty_end: None,
                warranty_notes: None,
                completion_date: job.completion_date,
            })
            .on_conflict_do_nothing()
            .get_result::<Job>(conn)
            .optional()?;

        match inserted {
            Some(created) => {
                AuditEntry::created(&created)?.write(conn, actor)?;
                Ok(EventOutcome::Created)
            }
            None => Ok(EventOutcome::Skipped),
        }
    })
}

fn find_or_create_builder(
    conn: &mut PgConnection,
    tenant_id: Option<&str>,
    name: &str,
    actor: &str,
) -> Result<Builder, ImportError> {
    if let Some(existing) = find_builder(conn, tenant_id, name)? {
        return Ok(existing);
    }
    let created = diesel::insert_into(builders::table)
        .values(&NewBuilder {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.map(str::to_string),
            name: name.to_string(),
            notes: None,
        })
        .on_conflict_do_nothing()
        .get_result::<Builder>(conn)
        .optional()?;
    match created {
        Some(builder) => {
            AuditEntry::created(&builder)?.write(conn, actor)?;
            Ok(builder)
        }
        // Lost a race with a concurrent import; the row exists now.
        None => find_builder(conn, tenant_id, name)?.ok_or(ImportError::Database(
            diesel::result::Error::NotFound,
        )),
    }
}

fn find_builder(
    conn: &mut PgConnection,
    tenant_id: Option<&str>,
    name: &str,
) -> Result<Option<Builder>, ImportError> {
    let query = builders::table
        .filter(builders::name.eq(name))
        .into_boxed();
    let query = match tenant_id {
        Some(tenant) => query.filter(builders::tenant_id.eq(tenant)),
        None => query.filter(builders::tenant_id.is_null()),
    };
    Ok(query.first::<Builder>(conn).optional()?)
}

/// Parses a JSON-lines stream; blank lines are ignored.
pub fn parse_json_lines(input: &str) -> Vec<Result<JobEvent, ImportError>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str::<JobEvent>(line)
                .map_err(|err| ImportError::Malformed(format!("line {}: {err}", number + 1)))
        })
        .collect()
}
