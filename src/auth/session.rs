use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::auth::gate::{AdminIdentity, AuthStatus};
use crate::error::AppResult;
use crate::state::DbPool;

/// Server-side session store keyed by an opaque token. Rows live in the
/// `sessions` table, so every request handler shares the same view.
#[derive(Clone)]
pub struct SessionStore {
    pool: DbPool,
    ttl_hours: u64,
}

impl SessionStore {
    pub fn new(pool: DbPool, ttl_hours: u64) -> Self {
        Self { pool, ttl_hours }
    }

    /// Create a new session for an admin. Returns the session token.
    pub fn create(&self, admin_id: i64) -> AppResult<String> {
        let purged = self.purge_expired()?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired sessions");
        }

        let conn = self.pool.get()?;
        let token = generate_token();
        conn.execute(
            "INSERT INTO sessions (token, admin_id, expires_at)
             VALUES (?1, ?2, datetime('now', ?3))",
            params![token, admin_id, format!("+{} hours", self.ttl_hours)],
        )?;

        Ok(token)
    }

    /// The admin bound to a live session, if any. Expired sessions and
    /// deactivated accounts read as absent.
    pub fn lookup(&self, token: &str) -> AppResult<Option<AdminIdentity>> {
        let conn = self.pool.get()?;
        let admin = conn
            .query_row(
                "SELECT u.id, u.username, u.email FROM sessions s
                 JOIN admin_users u ON u.id = s.admin_id
                 WHERE s.token = ?1 AND s.expires_at > datetime('now') AND u.is_active = 1",
                params![token],
                |row| {
                    Ok(AdminIdentity {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(admin)
    }

    /// Read-only status check. Never fails; a storage error reads as
    /// Anonymous and is logged.
    pub fn status(&self, token: Option<&str>) -> AuthStatus {
        let Some(token) = token else {
            return AuthStatus::Anonymous;
        };
        match self.lookup(token) {
            Ok(Some(admin)) => AuthStatus::Authenticated(admin),
            Ok(None) => AuthStatus::Anonymous,
            Err(e) => {
                tracing::warn!("Session lookup failed: {}", e);
                AuthStatus::Anonymous
            }
        }
    }

    /// Delete a session by token. Returns whether a row was removed.
    pub fn destroy(&self, token: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    pub fn purge_expired(&self) -> AppResult<usize> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= datetime('now')",
            [],
        )?;
        Ok(rows)
    }
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
