use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::User;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
        })
    }

    pub fn expires_in_seconds(&self) -> i64 {
        self.expiry.num_seconds()
    }

    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            tenant_id: user.tenant_id.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: String,
    pub tenant_id: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn user(tenant: Option<&str>) -> User {
        let now = Utc::now().naive_utc();
        User {
            id: Uuid::new_v4(),
            username: "dispatcher".to_string(),
            email: None,
            hashed_password: String::new(),
            role: "user".to_string(),
            is_active: true,
            tenant_id: tenant.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn token_carries_identity_and_tenant() {
        let service = JwtService::from_config(&test_config("postgres://localhost/db")).unwrap();
        let user = user(Some("all_county"));
        let token = service.generate_token(&user).unwrap();

        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, "user");
        assert_eq!(claims.tenant_id.as_deref(), Some("all_county"));
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let service = JwtService::from_config(&test_config("postgres://localhost/db")).unwrap();
        let mut other_config = test_config("postgres://localhost/db");
        other_config.jwt_secret = "different".to_string();
        let other = JwtService::from_config(&other_config).unwrap();

        let token = other.generate_token(&user(None)).unwrap();
        assert!(service.verify_token(&token).is_err());
    }
}
