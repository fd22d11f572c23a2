use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{value::RawValue, Value};
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    auth::AuthenticatedUser,
    error::{unique_conflict, AppError, AppResult},
    models::{ChannelAccount, ChannelAccountChanges, MarketingChannel, NewChannelAccount},
    publishing::brand_diet::{suggest_category, BrandDiet, CategorySuggestion},
    schema::{channel_accounts, marketing_channels, post_instances},
    scope_to_tenant,
    state::AppState,
    utils::json::{nullable, optional_text},
    utils::time::now,
};

const DUPLICATE_ACCOUNT: &str = "this tenant already has an account for that channel";

/// Posts considered when comparing an account's recent mix to its brand diet.
pub const SUGGESTION_WINDOW: i64 = 30;

pub async fn list_marketing_channels(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<MarketingChannel>>> {
    let rows = state
        .transact(|conn| {
            Ok(marketing_channels::table
                .order(marketing_channels::key.asc())
                .load::<MarketingChannel>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn list_channel_accounts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ChannelAccount>>> {
    let filter = user.tenant_filter();
    let rows = state
        .transact(move |conn| {
            let query = scope_to_tenant!(
                channel_accounts::table.into_boxed(),
                channel_accounts::tenant_id,
                filter
            );
            Ok(query
                .order(channel_accounts::channel_key.asc())
                .load::<ChannelAccount>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

fn parse_brand_diet(raw: Option<Box<RawValue>>) -> AppResult<Option<BrandDiet>> {
    raw.map(|raw| BrandDiet::from_raw(&raw))
        .transpose()
        .map_err(|err| AppError::validation(err.to_string()))
}

#[derive(Deserialize)]
pub struct CreateChannelAccountRequest {
    pub channel_key: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub credentials: Option<Value>,
    #[serde(default)]
    pub brand_diet: Option<Box<RawValue>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_channel_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateChannelAccountRequest>,
) -> AppResult<Json<ChannelAccount>> {
    let new_account = NewChannelAccount {
        id: Uuid::new_v4(),
        tenant_id: user.resolve_tenant(payload.tenant_id)?,
        channel_key: payload.channel_key.trim().to_ascii_lowercase(),
        display_name: optional_text(payload.display_name),
        credentials: payload
            .credentials
            .unwrap_or_else(|| Value::Object(Default::default())),
        brand_diet: parse_brand_diet(payload.brand_diet)?,
        is_active: payload.is_active.unwrap_or(true),
    };

    let account = state
        .transact(move |conn| {
            let known = marketing_channels::table
                .find(&new_account.channel_key)
                .first::<MarketingChannel>(conn)
                .optional()?;
            if known.is_none() {
                return Err(AppError::validation(format!(
                    "unknown channel '{}'",
                    new_account.channel_key
                )));
            }
            let account: ChannelAccount = diesel::insert_into(channel_accounts::table)
                .values(&new_account)
                .get_result(conn)
                .map_err(unique_conflict(DUPLICATE_ACCOUNT))?;
            AuditEntry::created(&account)?.write(conn, &user.username)?;
            Ok(account)
        })
        .await?;
    Ok(Json(account))
}

#[derive(Deserialize)]
pub struct UpdateChannelAccountRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub display_name: Option<Option<String>>,
    #[serde(default)]
    pub credentials: Option<Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub brand_diet: Option<Option<Box<RawValue>>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub async fn update_channel_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateChannelAccountRequest>,
) -> AppResult<Json<ChannelAccount>> {
    let changes = ChannelAccountChanges {
        display_name: payload.display_name.map(optional_text),
        credentials: payload.credentials,
        brand_diet: payload.brand_diet.map(parse_brand_diet).transpose()?,
        is_active: payload.is_active,
        updated_at: now(),
    };

    let account = state
        .transact(move |conn| {
            let before = load_account(conn, &user, id, true)?;
            let after: ChannelAccount = diesel::update(channel_accounts::table.find(id))
                .set(&changes)
                .get_result(conn)?;
            AuditEntry::updated(&before, &after)?.write(conn, &user.username)?;
            Ok(after)
        })
        .await?;
    Ok(Json(account))
}

/// Advisory: which category the account should post next to track its diet.
pub async fn category_suggestion(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CategorySuggestion>> {
    let suggestion = state
        .transact(move |conn| {
            let account = load_account(conn, &user, id, false)?;
            let diet = account.brand_diet.ok_or_else(|| {
                AppError::validation("channel account has no brand_diet configured")
            })?;

            let recent: Vec<Option<String>> = post_instances::table
                .filter(post_instances::channel_ids.contains(vec![id]))
                .order(post_instances::created_at.desc())
                .limit(SUGGESTION_WINDOW)
                .select(post_instances::suggested_category)
                .load(conn)?;

            let mut counts: BTreeMap<String, i64> = BTreeMap::new();
            for category in recent.into_iter().flatten() {
                *counts.entry(category).or_default() += 1;
            }
            suggest_category(&diet, &counts).map_err(|err| AppError::validation(err.to_string()))
        })
        .await?;
    Ok(Json(suggestion))
}

fn load_account(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
    lock: bool,
) -> AppResult<ChannelAccount> {
    let account = if lock {
        channel_accounts::table
            .find(id)
            .for_update()
            .first::<ChannelAccount>(conn)?
    } else {
        channel_accounts::table
            .find(id)
            .first::<ChannelAccount>(conn)?
    };
    user.ensure_access(account.tenant_id.as_deref())?;
    Ok(account)
}
