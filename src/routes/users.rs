use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    auth::{password, AuthenticatedUser, KNOWN_ROLES, ROLE_USER},
    error::{unique_conflict, AppError, AppResult},
    models::{NewUser, User},
    schema::users,
    state::AppState,
    utils::json::{optional_text, required_text},
};

const MIN_PASSWORD_LEN: usize = 8;

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<User>>> {
    user.require_admin()?;
    let rows = state
        .transact(|conn| {
            Ok(users::table
                .order(users::username.asc())
                .load::<User>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<Json<User>> {
    user.require_admin()?;

    let username = required_text("username", &payload.username)?;
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let role = optional_text(payload.role).unwrap_or_else(|| ROLE_USER.to_string());
    if !KNOWN_ROLES.contains(&role.as_str()) {
        return Err(AppError::validation(format!(
            "role must be one of {}",
            KNOWN_ROLES.join(", ")
        )));
    }
    let hashed_password = password::hash_password(&payload.password)?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username,
        email: optional_text(payload.email),
        hashed_password,
        role,
        is_active: true,
        tenant_id: optional_text(payload.tenant_id),
    };
    let actor = user.username;

    let created = state
        .transact(move |conn| {
            let created: User = diesel::insert_into(users::table)
                .values(&new_user)
                .get_result(conn)
                .map_err(unique_conflict("username or email already exists"))?;
            AuditEntry::created(&created)?.write(conn, &actor)?;
            Ok(created)
        })
        .await?;

    tracing::info!(username = %created.username, role = %created.role, "user created");
    Ok(Json(created))
}
