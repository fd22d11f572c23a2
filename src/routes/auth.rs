use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::User,
    schema::users::dsl,
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Unknown users, wrong passwords and inactive accounts all answer with the
/// same 401, and each path runs exactly one argon2 verification.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let username = payload.username.trim().to_string();
    let user = state
        .transact(move |conn| {
            Ok(dsl::users
                .filter(dsl::username.eq(&username))
                .first::<User>(conn)
                .optional()?)
        })
        .await?;

    let stored = user.as_ref().map(|user| user.hashed_password.clone());
    let password = payload.password;
    let valid = tokio::task::spawn_blocking(move || {
        password::verify_credentials(&password, stored.as_deref())
    })
    .await
    .map_err(|err| AppError::internal(format!("password verification failed: {err}")))?;

    let user = match user {
        Some(user) if valid && user.is_active => user,
        _ => {
            tracing::info!(username = %payload.username.trim(), "login rejected");
            return Err(AppError::unauthorized());
        }
    };

    let access_token = state.jwt.generate_token(&user).map_err(AppError::from)?;
    tracing::info!(username = %user.username, role = %user.role, "login succeeded");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_seconds(),
    }))
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
    pub tenant_id: Option<String>,
}

pub async fn me(user: AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        username: user.username,
        role: user.role,
        tenant_id: user.tenant_id,
    })
}
