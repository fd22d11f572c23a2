use axum::{
    extract::{Path, State},
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    auth::AuthenticatedUser,
    error::AppResult,
    models::{Customer, CustomerChanges, NewCustomer},
    schema::customers,
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text, required_text, updated_text},
    utils::time::now,
};

pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Customer>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let query =
                scope_to_tenant!(customers::table.into_boxed(), customers::tenant_id, filter);
            Ok(query.order(customers::name.asc()).load::<Customer>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCustomerRequest>,
) -> AppResult<Json<Customer>> {
    let new_customer = NewCustomer {
        id: Uuid::new_v4(),
        tenant_id: user.resolve_tenant(payload.tenant_id)?,
        name: required_text("name", &payload.name)?,
        email: optional_text(payload.email),
        phone: optional_text(payload.phone),
        address_line1: optional_text(payload.address_line1),
        address_line2: optional_text(payload.address_line2),
        city: optional_text(payload.city),
        state: optional_text(payload.state),
        postal_code: optional_text(payload.postal_code),
        notes: optional_text(payload.notes),
    };

    let customer = state
        .transact(move |conn| {
            let customer: Customer = diesel::insert_into(customers::table)
                .values(&new_customer)
                .get_result(conn)?;
            AuditEntry::created(&customer)?.write(conn, &user.username)?;
            Ok(customer)
        })
        .await?;
    Ok(Json(customer))
}

#[derive(Deserialize)]
pub struct UpdateCustomerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address_line1: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address_line2: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub state: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub postal_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> AppResult<Json<Customer>> {
    let changes = CustomerChanges {
        name: updated_text("name", payload.name)?,
        email: payload.email.map(optional_text),
        phone: payload.phone.map(optional_text),
        address_line1: payload.address_line1.map(optional_text),
        address_line2: payload.address_line2.map(optional_text),
        city: payload.city.map(optional_text),
        state: payload.state.map(optional_text),
        postal_code: payload.postal_code.map(optional_text),
        notes: payload.notes.map(optional_text),
        updated_at: now(),
    };

    let customer = state
        .transact(move |conn| {
            let before = customers::table
                .find(id)
                .for_update()
                .first::<Customer>(conn)?;
            user.ensure_access(before.tenant_id.as_deref())?;
            let after: Customer = diesel::update(customers::table.find(id))
                .set(&changes)
                .get_result(conn)?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(customer))
}
