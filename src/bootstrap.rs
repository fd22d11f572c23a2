//! Idempotent seeding of the built-in `admin` account.

use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::ROLE_ADMIN;
use crate::models::{NewUser, User};
use crate::schema::users;
use crate::utils::time::now;

pub const ADMIN_USERNAME: &str = "admin";

const BOOTSTRAP_LOCK_KEY: i64 = 0x6164_6d69_6e5f_6273;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    Updated,
    Unchanged,
}

impl BootstrapOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapOutcome::Created => "created",
            BootstrapOutcome::Updated => "updated",
            BootstrapOutcome::Unchanged => "unchanged",
        }
    }
}

/// Ensures `admin` exists as an active, global admin whose password verifies
/// against `password`. Concurrent callers serialize on an advisory lock; the
/// hash is only rewritten when it no longer matches.
pub fn ensure_admin(conn: &mut PgConnection, password: &str) -> Result<BootstrapOutcome> {
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
            .bind::<BigInt, _>(BOOTSTRAP_LOCK_KEY)
            .execute(conn)
            .context("failed to take the bootstrap lock")?;

        let existing = users::table
            .filter(users::username.eq(ADMIN_USERNAME))
            .for_update()
            .first::<User>(conn)
            .optional()
            .context("failed to look up the admin user")?;

        let Some(admin) = existing else {
            let hashed_password = hash_password(password).context("failed to hash password")?;
            diesel::insert_into(users::table)
                .values(&NewUser {
                    id: Uuid::new_v4(),
                    username: ADMIN_USERNAME.to_string(),
                    email: None,
                    hashed_password,
                    role: ROLE_ADMIN.to_string(),
                    is_active: true,
                    tenant_id: None,
                })
                .execute(conn)
                .context("failed to create the admin user")?;
            return Ok(BootstrapOutcome::Created);
        };

        // An unparseable stored hash counts as a mismatch and gets replaced.
        let password_matches =
            verify_password(password, &admin.hashed_password).unwrap_or(false);
        let attributes_match =
            admin.role == ROLE_ADMIN && admin.is_active && admin.tenant_id.is_none();
        if password_matches && attributes_match {
            return Ok(BootstrapOutcome::Unchanged);
        }

        let hashed_password = if password_matches {
            admin.hashed_password
        } else {
            hash_password(password).context("failed to hash password")?
        };
        diesel::update(users::table.find(admin.id))
            .set((
                users::hashed_password.eq(hashed_password),
                users::role.eq(ROLE_ADMIN),
                users::is_active.eq(true),
                users::tenant_id.eq(None::<String>),
                users::updated_at.eq(now()),
            ))
            .execute(conn)
            .context("failed to update the admin user")?;
        Ok(BootstrapOutcome::Updated)
    })
}
