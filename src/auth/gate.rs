use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::auth::session::SessionStore;
use crate::db::models::AdminUser;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// The public face of an admin account, as stored in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminIdentity {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<AdminUser> for AdminIdentity {
    fn from(user: AdminUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Anonymous,
    Authenticated(AdminIdentity),
}

impl AuthStatus {
    pub fn admin(&self) -> Option<&AdminIdentity> {
        match self {
            AuthStatus::Anonymous => None,
            AuthStatus::Authenticated(admin) => Some(admin),
        }
    }
}

pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plaintext, cost)
}

/// Verify plaintext against a stored hash - salted and constant-time via bcrypt
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

fn find_active_admin(pool: &DbPool, username: &str) -> AppResult<Option<AdminUser>> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, email, is_active, last_login, created_at
             FROM admin_users WHERE username = ?1 AND is_active = 1",
            params![username],
            |row| {
                Ok(AdminUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    email: row.get(3)?,
                    is_active: row.get(4)?,
                    last_login: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Check credentials. Unknown, inactive and wrong-password all look the
/// same to the caller.
pub fn authenticate(pool: &DbPool, username: &str, password: &str) -> AppResult<AdminIdentity> {
    let Some(user) = find_active_admin(pool, username)? else {
        tracing::warn!(username, "Login rejected: no active account");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash) {
        tracing::warn!(username, "Login rejected: bad password");
        return Err(AppError::InvalidCredentials);
    }

    let conn = pool.get()?;
    conn.execute(
        "UPDATE admin_users SET last_login = datetime('now') WHERE id = ?1",
        params![user.id],
    )?;

    Ok(user.into())
}

/// Anonymous -> Authenticated. Returns the admin and the new session token.
pub fn login(
    pool: &DbPool,
    sessions: &SessionStore,
    username: &str,
    password: &str,
) -> AppResult<(AdminIdentity, String)> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Username and password required".into(),
        ));
    }

    let admin = authenticate(pool, username, password)?;
    let token = sessions.create(admin.id)?;
    tracing::info!(admin_id = admin.id, username = %admin.username, "Admin logged in");
    Ok((admin, token))
}

/// Authenticated -> Anonymous. Safe to call with no or stale token.
pub fn logout(sessions: &SessionStore, token: Option<&str>) -> AppResult<()> {
    if let Some(token) = token {
        if sessions.destroy(token)? {
            tracing::info!("Admin logged out");
        }
    }
    Ok(())
}

/// Insert an active admin account. Used by the `admin add` subcommand.
pub fn provision_admin(
    pool: &DbPool,
    username: &str,
    email: &str,
    password: &str,
    cost: u32,
) -> anyhow::Result<i64> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("Username is required");
    }
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }

    let hash = hash_password(password, cost)?;
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO admin_users (username, password_hash, email) VALUES (?1, ?2, ?3)",
        params![username, hash, email.trim()],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            anyhow::anyhow!("Admin user already exists: {username}")
        }
        other => other.into(),
    })?;

    Ok(conn.last_insert_rowid())
}
