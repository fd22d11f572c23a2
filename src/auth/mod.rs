pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    tenancy::TenantFilter,
};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const ROLE_PUBLISHER: &str = "publisher";

pub const KNOWN_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_USER, ROLE_PUBLISHER];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub role: String,
    pub tenant_id: Option<String>,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("admin role required"))
        }
    }

    pub fn require_any_role(&self, roles: &[&str]) -> AppResult<()> {
        if self.is_admin() || roles.iter().any(|role| *role == self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "one of the roles {} is required",
                roles.join(", ")
            )))
        }
    }

    /// Tenant a new row is written under. Admins choose freely (`None` means
    /// global); everyone else is pinned to the tenant in their token.
    pub fn resolve_tenant(&self, requested: Option<String>) -> AppResult<Option<String>> {
        if self.is_admin() {
            return Ok(requested);
        }
        match requested {
            Some(tenant) if Some(tenant.as_str()) != self.tenant_id.as_deref() => Err(
                AppError::forbidden("cannot write rows for another tenant"),
            ),
            _ => Ok(self.tenant_id.clone()),
        }
    }

    pub fn can_access(&self, row_tenant: Option<&str>) -> bool {
        self.is_admin() || row_tenant == self.tenant_id.as_deref()
    }

    /// Rows outside the caller's tenant are reported as missing.
    pub fn ensure_access(&self, row_tenant: Option<&str>) -> AppResult<()> {
        if self.can_access(row_tenant) {
            Ok(())
        } else {
            Err(AppError::not_found())
        }
    }

    pub fn tenant_filter(&self) -> TenantFilter {
        if self.is_admin() {
            TenantFilter::Any
        } else {
            TenantFilter::Only(self.tenant_id.clone())
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
            tenant_id: claims.tenant_id,
        })
    }
}
