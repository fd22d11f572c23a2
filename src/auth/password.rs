use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

/// Verified against when the username is unknown so that both paths pay for
/// one argon2 verification.
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("no-such-user").unwrap_or_default());

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash).map_err(|err| anyhow!(err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Checks a login attempt. `stored` is `None` for unknown usernames; the
/// dummy hash is still verified and the attempt fails.
pub fn verify_credentials(password: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(hash) => verify_password(password, hash).unwrap_or(false),
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let first = hash_password("pipe-wrench").unwrap();
        let second = hash_password("pipe-wrench").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2"));
        assert!(verify_password("pipe-wrench", &first).unwrap());
        assert!(!verify_password("plunger", &first).unwrap());
    }

    #[test]
    fn unknown_users_never_verify() {
        assert!(!verify_credentials("no-such-user", None));
        assert!(!verify_credentials("", None));
        assert!(DUMMY_HASH.starts_with("$argon2"));
    }

    #[test]
    fn stored_hashes_verify_through_credentials() {
        let stored = hash_password("pipe-wrench").unwrap();
        assert!(verify_credentials("pipe-wrench", Some(&stored)));
        assert!(!verify_credentials("plunger", Some(&stored)));
        assert!(!verify_credentials("pipe-wrench", Some("not-a-phc-string")));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }
}
