//! Append-only audit trail. Entries are written on the caller's connection so
//! they share the mutation's transaction: a rollback drops both.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AuditRecord, Builder, ChannelAccount, ContentItem, Customer, Job, JobTask, MediaAsset,
    NewAuditRecord, PostInstance, ServiceCall, User,
};
use crate::schema::audit_log;
use crate::utils::time::now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

/// A row type that can appear in the audit trail. The snapshot is the row's
/// serialized form, so fields marked `skip_serializing` (secrets) never land
/// in `before`/`after`.
pub trait Auditable: Serialize {
    const ENTITY_TYPE: &'static str;

    fn entity_id(&self) -> String;

    fn tenant_id(&self) -> Option<&str>;
}

macro_rules! auditable {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Auditable for $ty {
                const ENTITY_TYPE: &'static str = $name;

                fn entity_id(&self) -> String {
                    self.id.to_string()
                }

                fn tenant_id(&self) -> Option<&str> {
                    self.tenant_id.as_deref()
                }
            }
        )*
    };
}

auditable! {
    User => "user",
    Builder => "builder",
    Job => "job",
    JobTask => "job_task",
    ServiceCall => "service_call",
    Customer => "customer",
    ChannelAccount => "channel_account",
    ContentItem => "content_item",
    MediaAsset => "media_asset",
    PostInstance => "post_instance",
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    action: AuditAction,
    entity_type: &'static str,
    entity_id: String,
    tenant_id: Option<String>,
    before: Option<Value>,
    after: Option<Value>,
}

impl AuditEntry {
    pub fn created<T: Auditable>(row: &T) -> AppResult<Self> {
        Ok(Self::base(AuditAction::Create, row, None, Some(serde_json::to_value(row)?)))
    }

    pub fn updated<T: Auditable>(before: &T, after: &T) -> AppResult<Self> {
        Ok(Self::base(
            AuditAction::Update,
            after,
            Some(serde_json::to_value(before)?),
            Some(serde_json::to_value(after)?),
        ))
    }

    pub fn deleted<T: Auditable>(row: &T) -> AppResult<Self> {
        Ok(Self::base(AuditAction::Delete, row, Some(serde_json::to_value(row)?), None))
    }

    fn base<T: Auditable>(
        action: AuditAction,
        row: &T,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Self {
        Self {
            action,
            entity_type: T::ENTITY_TYPE,
            entity_id: row.entity_id(),
            tenant_id: row.tenant_id().map(str::to_string),
            before,
            after,
        }
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn write(self, conn: &mut PgConnection, actor: &str) -> AppResult<AuditRecord> {
        let record = NewAuditRecord {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            actor: actor.to_string(),
            action: self.action.as_str().to_string(),
            entity_type: self.entity_type.to_string(),
            entity_id: self.entity_id,
            before: self.before,
            after: self.after,
            created_at: now(),
        };
        let stored = diesel::insert_into(audit_log::table)
            .values(&record)
            .get_result(conn)?;
        Ok(stored)
    }
}
