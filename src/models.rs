use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::publishing::brand_diet::BrandDiet;
use crate::schema::*;
use crate::utils::time::{serialize_iso, serialize_iso_option};

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub role: String,
    pub is_active: bool,
    pub tenant_id: Option<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub hashed_password: String,
    pub role: String,
    pub is_active: bool,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = builders)]
pub struct Builder {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub name: String,
    pub notes: Option<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = builders)]
pub struct NewBuilder {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub name: String,
    pub notes: Option<String>,
}

/// Partial updates: `None` leaves a column untouched, `Some(None)` clears a
/// nullable one. `updated_at` is always written, so no changeset is empty.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = builders)]
pub struct BuilderChanges {
    pub name: Option<String>,
    pub notes: Option<Option<String>>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = jobs)]
#[diesel(belongs_to(Builder))]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub builder_id: Uuid,
    pub community: String,
    pub lot_number: String,
    pub phase: String,
    pub status: String,
    pub address: Option<String>,
    pub tech_name: Option<String>,
    pub assigned_to: Option<String>,
    pub warranty_start: Option<NaiveDate>,
    pub warranty_end: Option<NaiveDate>,
    pub warranty_notes: Option<String>,
    pub completion_date: Option<NaiveDate>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub builder_id: Uuid,
    pub community: String,
    pub lot_number: String,
    pub phase: String,
    pub status: String,
    pub address: Option<String>,
    pub tech_name: Option<String>,
    pub assigned_to: Option<String>,
    pub warranty_start: Option<NaiveDate>,
    pub warranty_end: Option<NaiveDate>,
    pub warranty_notes: Option<String>,
    pub completion_date: Option<NaiveDate>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = jobs)]
pub struct JobChanges {
    pub builder_id: Option<Uuid>,
    pub community: Option<String>,
    pub lot_number: Option<String>,
    pub phase: Option<String>,
    pub status: Option<String>,
    pub address: Option<Option<String>>,
    pub tech_name: Option<Option<String>>,
    pub assigned_to: Option<Option<String>>,
    pub warranty_start: Option<Option<NaiveDate>>,
    pub warranty_end: Option<Option<NaiveDate>>,
    pub warranty_notes: Option<Option<String>>,
    pub completion_date: Option<Option<NaiveDate>>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = job_tasks)]
#[diesel(belongs_to(Job))]
pub struct JobTask {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub job_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub assigned_to: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(serialize_with = "serialize_iso_option")]
    pub completed_at: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_tasks)]
pub struct NewJobTask {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub job_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub assigned_to: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = job_tasks)]
pub struct JobTaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub assigned_to: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub completed_at: Option<Option<NaiveDateTime>>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = customers)]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = customers)]
pub struct NewCustomer {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = customers)]
pub struct CustomerChanges {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub address_line1: Option<Option<String>>,
    pub address_line2: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub state: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = service_calls)]
pub struct ServiceCall {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub customer_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub summary: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assigned_to: Option<String>,
    pub requested_date: Option<NaiveDate>,
    #[serde(serialize_with = "serialize_iso_option")]
    pub scheduled_start: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_iso_option")]
    pub scheduled_end: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_iso_option")]
    pub completed_at: Option<NaiveDateTime>,
    pub address: Option<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_calls)]
pub struct NewServiceCall {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub customer_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub summary: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assigned_to: Option<String>,
    pub requested_date: Option<NaiveDate>,
    pub scheduled_start: Option<NaiveDateTime>,
    pub scheduled_end: Option<NaiveDateTime>,
    pub address: Option<String>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = service_calls)]
pub struct ServiceCallChanges {
    pub customer_id: Option<Option<Uuid>>,
    pub job_id: Option<Option<Uuid>>,
    pub summary: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Option<String>>,
    pub requested_date: Option<Option<NaiveDate>>,
    pub scheduled_start: Option<Option<NaiveDateTime>>,
    pub scheduled_end: Option<Option<NaiveDateTime>>,
    pub completed_at: Option<Option<NaiveDateTime>>,
    pub address: Option<Option<String>>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct MarketingChannel {
    pub key: String,
    pub display_name: String,
    pub supports_autopost: bool,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = channel_accounts)]
pub struct ChannelAccount {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub channel_key: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub credentials: Value,
    pub brand_diet: Option<BrandDiet>,
    pub is_active: bool,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = channel_accounts)]
pub struct NewChannelAccount {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub channel_key: String,
    pub display_name: Option<String>,
    pub credentials: Value,
    pub brand_diet: Option<BrandDiet>,
    pub is_active: bool,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = channel_accounts)]
pub struct ChannelAccountChanges {
    pub display_name: Option<Option<String>>,
    pub credentials: Option<Value>,
    pub brand_diet: Option<Option<BrandDiet>>,
    pub is_active: Option<bool>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = content_items)]
pub struct ContentItem {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub title: Option<String>,
    pub body: String,
    pub content_category: Option<String>,
    pub created_by: Option<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = content_items)]
pub struct NewContentItem {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub title: Option<String>,
    pub body: String,
    pub content_category: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = content_items)]
pub struct ContentItemChanges {
    pub title: Option<Option<String>>,
    pub body: Option<String>,
    pub content_category: Option<Option<String>>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = media_assets)]
#[diesel(belongs_to(ContentItem))]
pub struct MediaAsset {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub content_item_id: Option<Uuid>,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub intent_tags: Vec<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = media_assets)]
pub struct NewMediaAsset {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub content_item_id: Option<Uuid>,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub intent_tags: Vec<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = post_instances)]
pub struct PostInstance {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub channel_ids: Vec<Uuid>,
    pub content_item_id: Option<Uuid>,
    pub body_text: Option<String>,
    #[serde(serialize_with = "serialize_iso_option")]
    pub scheduled_at: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_iso_option")]
    pub draft_due_date: Option<NaiveDateTime>,
    pub status: String,
    pub author_id: Option<Uuid>,
    pub author_username: Option<String>,
    pub reviewer: Option<String>,
    pub suggested_category: Option<String>,
    pub notes: Option<String>,
    #[serde(serialize_with = "serialize_iso_option")]
    pub published_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = post_instances)]
pub struct NewPostInstance {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub channel_ids: Vec<Uuid>,
    pub content_item_id: Option<Uuid>,
    pub body_text: Option<String>,
    pub draft_due_date: Option<NaiveDateTime>,
    pub scheduled_at: Option<NaiveDateTime>,
    pub status: String,
    pub author_id: Option<Uuid>,
    pub author_username: Option<String>,
    pub suggested_category: Option<String>,
    pub notes: Option<String>,
}

/// Field changes produced by a workflow transition or an edit. `None` leaves a
/// column untouched; `Some(None)` clears it.
#[derive(Debug, Default, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = post_instances)]
pub struct PostInstanceChanges {
    pub status: Option<String>,
    pub channel_ids: Option<Vec<Uuid>>,
    pub content_item_id: Option<Option<Uuid>>,
    pub body_text: Option<Option<String>>,
    pub scheduled_at: Option<Option<NaiveDateTime>>,
    pub draft_due_date: Option<Option<NaiveDateTime>>,
    pub reviewer: Option<Option<String>>,
    pub suggested_category: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub published_at: Option<Option<NaiveDateTime>>,
    pub last_error: Option<Option<String>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = audit_log)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_log)]
pub struct NewAuditRecord {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable)]
pub struct SchemaRevision {
    pub revision: String,
    pub parent_revision: Option<String>,
    pub name: String,
    pub position: i32,
    pub applied_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema_revisions)]
pub struct NewSchemaRevision<'a> {
    pub revision: &'a str,
    pub parent_revision: Option<&'a str>,
    pub name: &'a str,
    pub position: i32,
}
