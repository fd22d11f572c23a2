//! Schema migrations as an ordered, parent-linked revision log embedded at
//! compile time. Applied revisions are recorded in `schema_revisions`; the
//! applied list must always be a prefix of the log.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use thiserror::Error;

use crate::models::{NewSchemaRevision, SchemaRevision};
use crate::schema::schema_revisions;

/// Key for `pg_advisory_xact_lock`, shared by every migration runner.
pub const MIGRATION_LOCK_KEY: i64 = 0x6261_636b_6f66_6669;

const CREATE_REVISION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_revisions (
    revision VARCHAR(32) PRIMARY KEY,
    parent_revision VARCHAR(32),
    name VARCHAR(255) NOT NULL,
    position INTEGER NOT NULL UNIQUE,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub id: &'static str,
    pub parent: Option<&'static str>,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

macro_rules! revision {
    ($id:literal, $parent:expr, $dir:literal) => {
        Revision {
            id: $id,
            parent: $parent,
            name: $dir,
            up: include_str!(concat!("../migrations/", $dir, "/up.sql")),
            down: include_str!(concat!("../migrations/", $dir, "/down.sql")),
        }
    };
}

pub static EMBEDDED_REVISIONS: &[Revision] = &[
    revision!("0001", None, "0001_create_users"),
    revision!("0002", Some("0001"), "0002_create_builders"),
    revision!("0003", Some("0002"), "0003_create_customers"),
    revision!("0004", Some("0003"), "0004_create_jobs"),
    revision!("0005", Some("0004"), "0005_create_job_tasks"),
    revision!("0006", Some("0005"), "0006_create_service_calls"),
    revision!("0007", Some("0006"), "0007_create_audit_log"),
    revision!("0008", Some("0007"), "0008_create_marketing_channels"),
    revision!("0009", Some("0008"), "0009_create_channel_accounts"),
    revision!("0010", Some("0009"), "0010_create_content_items"),
    revision!("0011", Some("0010"), "0011_create_media_assets"),
    revision!("0012", Some("0011"), "0012_create_post_instances"),
    revision!("0013", Some("0012"), "0013_add_post_instance_reviewer"),
    revision!("0014", Some("0013"), "0014_add_media_asset_intent_tags"),
    revision!("0015", Some("0014"), "0015_post_instance_planned_slots"),
    revision!("0016", Some("0015"), "0016_post_instance_channel_ids_index"),
];

pub const BASE: &str = "base";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("revision log is invalid: {0}")]
    InvalidLog(String),
    #[error("unknown revision '{0}'")]
    UnknownRevision(String),
    #[error(
        "applied revisions diverge from the log at position {position}: \
         database has '{applied}', log expects '{expected}'"
    )]
    Diverged {
        position: usize,
        applied: String,
        expected: String,
    },
    #[error("database has {applied} applied revisions but the log only knows {known}")]
    AheadOfLog { applied: usize, known: usize },
    #[error("revision '{revision}' expects head '{expected}' but the database is at '{current}'")]
    HeadMoved {
        revision: String,
        expected: String,
        current: String,
    },
    #[error("target '{target}' is behind the current head; use downgrade")]
    TargetBehind { target: String },
    #[error("target '{target}' is ahead of the current head; use upgrade")]
    TargetAhead { target: String },
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// A validated revision log: one root, an unbroken parent chain, unique ids.
#[derive(Debug, Clone)]
pub struct RevisionLog {
    revisions: Vec<Revision>,
}

impl RevisionLog {
    pub fn embedded() -> MigrationResult<Self> {
        Self::new(EMBEDDED_REVISIONS.to_vec())
    }

    pub fn new(revisions: Vec<Revision>) -> MigrationResult<Self> {
        let Some(root) = revisions.first() else {
            return Err(MigrationError::InvalidLog("no revisions".into()));
        };
        if root.parent.is_some() {
            return Err(MigrationError::InvalidLog(format!(
                "first revision '{}' must not have a parent",
                root.id
            )));
        }

        let mut seen = HashSet::new();
        for (index, revision) in revisions.iter().enumerate() {
            if revision.id.is_empty() || revision.id == BASE {
                return Err(MigrationError::InvalidLog(format!(
                    "revision id '{}' is reserved or empty",
                    revision.id
                )));
            }
            if !seen.insert(revision.id) {
                return Err(MigrationError::InvalidLog(format!(
                    "duplicate revision id '{}'",
                    revision.id
                )));
            }
            if index > 0 {
                let expected = revisions[index - 1].id;
                if revision.parent != Some(expected) {
                    return Err(MigrationError::InvalidLog(format!(
                        "revision '{}' names parent {:?}, expected '{expected}'",
                        revision.id, revision.parent
                    )));
                }
            }
        }

        Ok(Self { revisions })
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn head(&self) -> &Revision {
        &self.revisions[self.revisions.len() - 1]
    }

    /// Number of applied revisions once the database sits at `target`.
    /// `None` means head, `"base"` means nothing applied.
    pub fn resolve_target(&self, target: Option<&str>) -> MigrationResult<usize> {
        match target {
            None => Ok(self.revisions.len()),
            Some(BASE) => Ok(0),
            Some(id) => self
                .revisions
                .iter()
                .position(|revision| revision.id == id)
                .map(|index| index + 1)
                .ok_or_else(|| MigrationError::UnknownRevision(id.to_string())),
        }
    }

    /// Checks that `applied` (oldest first) is a prefix of the log and returns
    /// its length.
    pub fn check_applied<S: AsRef<str>>(&self, applied: &[S]) -> MigrationResult<usize> {
        if applied.len() > self.revisions.len() {
            return Err(MigrationError::AheadOfLog {
                applied: applied.len(),
                known: self.revisions.len(),
            });
        }
        for (position, (applied, expected)) in applied.iter().zip(&self.revisions).enumerate() {
            if applied.as_ref() != expected.id {
                if self.resolve_target(Some(applied.as_ref())).is_err() {
                    return Err(MigrationError::UnknownRevision(applied.as_ref().to_string()));
                }
                return Err(MigrationError::Diverged {
                    position: position + 1,
                    applied: applied.as_ref().to_string(),
                    expected: expected.id.to_string(),
                });
            }
        }
        Ok(applied.len())
    }

    /// Offline upgrade script from `from` (exclusive) to `to` (inclusive).
    pub fn render_upgrade_sql(&self, from: usize, to: usize) -> MigrationResult<String> {
        if to < from {
            return Err(MigrationError::TargetBehind {
                target: self.label(to),
            });
        }
        let mut script = String::new();
        script.push_str(CREATE_REVISION_TABLE);
        script.push_str("\n\n");
        for index in from..to {
            let revision = &self.revisions[index];
            script.push_str(&format!(
                "-- Running upgrade {} -> {} ({})\n",
                revision.parent.unwrap_or(BASE),
                revision.id,
                revision.name
            ));
            script.push_str("BEGIN;\n");
            script.push_str(&format!(
                "SELECT pg_advisory_xact_lock({MIGRATION_LOCK_KEY});\n"
            ));
            push_statement(&mut script, revision.up);
            script.push_str(&format!(
                "INSERT INTO schema_revisions (revision, parent_revision, name, position) \
                 VALUES ({}, {}, {}, {});\n",
                quote(revision.id),
                revision.parent.map(quote).unwrap_or_else(|| "NULL".into()),
                quote(revision.name),
                index + 1
            ));
            script.push_str("COMMIT;\n\n");
        }
        Ok(script)
    }

    /// Offline downgrade script from `from` applied revisions down to `to`.
    pub fn render_downgrade_sql(&self, from: usize, to: usize) -> MigrationResult<String> {
        if to > from {
            return Err(MigrationError::TargetAhead {
                target: self.label(to),
            });
        }
        let mut script = String::new();
        for index in (to..from).rev() {
            let revision = &self.revisions[index];
            script.push_str(&format!(
                "-- Running downgrade {} -> {} ({})\n",
                revision.id,
                revision.parent.unwrap_or(BASE),
                revision.name
            ));
            script.push_str("BEGIN;\n");
            script.push_str(&format!(
                "SELECT pg_advisory_xact_lock({MIGRATION_LOCK_KEY});\n"
            ));
            push_statement(&mut script, revision.down);
            script.push_str(&format!(
                "DELETE FROM schema_revisions WHERE revision = {};\n",
                quote(revision.id)
            ));
            script.push_str("COMMIT;\n\n");
        }
        Ok(script)
    }

    fn label(&self, count: usize) -> String {
        match count {
            0 => BASE.to_string(),
            n => self.revisions[n - 1].id.to_string(),
        }
    }
}

fn push_statement(script: &mut String, sql: &str) {
    script.push_str(sql.trim_end());
    script.push('\n');
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn ensure_revision_table(conn: &mut PgConnection) -> MigrationResult<()> {
    conn.batch_execute(CREATE_REVISION_TABLE)?;
    Ok(())
}

/// Applied revisions, oldest first.
pub fn applied(conn: &mut PgConnection) -> MigrationResult<Vec<SchemaRevision>> {
    ensure_revision_table(conn)?;
    let rows = schema_revisions::table
        .order(schema_revisions::position.asc())
        .load::<SchemaRevision>(conn)?;
    Ok(rows)
}

pub fn current(conn: &mut PgConnection) -> MigrationResult<Option<String>> {
    Ok(applied(conn)?.pop().map(|row| row.revision))
}

fn locked_head(conn: &mut PgConnection) -> MigrationResult<Option<String>> {
    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<BigInt, _>(MIGRATION_LOCK_KEY)
        .execute(conn)?;
    let head = schema_revisions::table
        .order(schema_revisions::position.desc())
        .select(schema_revisions::revision)
        .first::<String>(conn)
        .optional()?;
    Ok(head)
}

/// Applies pending revisions up to `target` (head when `None`), each in its
/// own transaction. Returns the ids applied by this call.
pub fn upgrade(
    conn: &mut PgConnection,
    log: &RevisionLog,
    target: Option<&str>,
) -> MigrationResult<Vec<&'static str>> {
    let ids: Vec<String> = applied(conn)?.into_iter().map(|row| row.revision).collect();
    let from = log.check_applied(&ids)?;
    let to = log.resolve_target(target)?;
    if to < from {
        return Err(MigrationError::TargetBehind {
            target: log.label(to),
        });
    }

    let mut newly_applied = Vec::new();
    for index in from..to {
        let revision = log.revisions()[index].clone();
        let applied_now = conn.transaction::<bool, MigrationError, _>(|conn| {
            let head = locked_head(conn)?;
            if head.as_deref() == Some(revision.id) {
                return Ok(false);
            }
            if head.as_deref() != revision.parent {
                return Err(MigrationError::HeadMoved {
                    revision: revision.id.to_string(),
                    expected: revision.parent.unwrap_or(BASE).to_string(),
                    current: head.unwrap_or_else(|| BASE.to_string()),
                });
            }
            conn.batch_execute(revision.up)?;
            diesel::insert_into(schema_revisions::table)
                .values(&NewSchemaRevision {
                    revision: revision.id,
                    parent_revision: revision.parent,
                    name: revision.name,
                    position: (index + 1) as i32,
                })
                .execute(conn)?;
            Ok(true)
        })?;

        if applied_now {
            tracing::info!(
                component = "migrate",
                revision = revision.id,
                name = revision.name,
                "applied revision"
            );
            newly_applied.push(revision.id);
        }
    }
    Ok(newly_applied)
}

/// Reverts applied revisions down to `target` (`"base"` reverts everything).
pub fn downgrade(
    conn: &mut PgConnection,
    log: &RevisionLog,
    target: &str,
) -> MigrationResult<Vec<&'static str>> {
    let ids: Vec<String> = applied(conn)?.into_iter().map(|row| row.revision).collect();
    let from = log.check_applied(&ids)?;
    let to = log.resolve_target(Some(target))?;
    if to > from {
        return Err(MigrationError::TargetAhead {
            target: target.to_string(),
        });
    }

    let mut reverted = Vec::new();
    for index in (to..from).rev() {
        let revision = log.revisions()[index].clone();
        conn.transaction::<(), MigrationError, _>(|conn| {
            let head = locked_head(conn)?;
            if head.as_deref() != Some(revision.id) {
                return Err(MigrationError::HeadMoved {
                    revision: revision.id.to_string(),
                    expected: revision.id.to_string(),
                    current: head.unwrap_or_else(|| BASE.to_string()),
                });
            }
            conn.batch_execute(revision.down)?;
            diesel::delete(
                schema_revisions::table.filter(schema_revisions::revision.eq(revision.id)),
            )
            .execute(conn)?;
            Ok(())
        })?;
        tracing::info!(
            component = "migrate",
            revision = revision.id,
            name = revision.name,
            "reverted revision"
        );
        reverted.push(revision.id);
    }
    Ok(reverted)
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub revision: Revision,
    pub applied_at: Option<NaiveDateTime>,
}

/// The full log annotated with when each revision was applied.
pub fn history(conn: &mut PgConnection, log: &RevisionLog) -> MigrationResult<Vec<HistoryEntry>> {
    let rows = applied(conn)?;
    let ids: Vec<&str> = rows.iter().map(|row| row.revision.as_str()).collect();
    log.check_applied(&ids)?;
    Ok(log
        .revisions()
        .iter()
        .enumerate()
        .map(|(index, revision)| HistoryEntry {
            revision: revision.clone(),
            applied_at: rows.get(index).map(|row| row.applied_at),
        })
        .collect())
}
