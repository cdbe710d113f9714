use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::accounts;
use crate::db::models::{FlashMessage, User};

/// A freshly created server-side session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    Success,
    Error,
    Info,
}

impl Flash {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flash::Success => "success",
            Flash::Error => "error",
            Flash::Info => "info",
        }
    }

    pub fn message(self, text: impl Into<String>) -> FlashMessage {
        FlashMessage {
            category: self.as_str().to_string(),
            message: text.into(),
        }
    }
}

/// Create a new session for a user.
pub fn create_session(
    conn: &Connection,
    user_id: i64,
    hours: u64,
) -> Result<NewSession, rusqlite::Error> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(NewSession { id, token })
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Resolve an unexpired session token to its session id and user.
pub fn resolve(conn: &Connection, token: &str) -> Result<Option<(String, User)>, rusqlite::Error> {
    let found: Option<(String, i64)> = conn
        .query_row(
            "SELECT id, user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
            params![token],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let Some((session_id, user_id)) = found else {
        return Ok(None);
    };
    Ok(accounts::find_by_id(conn, user_id)?.map(|user| (session_id, user)))
}

/// Drop sessions past their expiry. Returns how many were removed.
pub fn purge_expired(conn: &Connection) -> Result<usize, rusqlite::Error> {
    conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])
}

pub fn push_flash(
    conn: &Connection,
    session_id: &str,
    kind: Flash,
    message: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO flashes (session_id, category, message) VALUES (?1, ?2, ?3)",
        params![session_id, kind.as_str(), message],
    )?;
    Ok(())
}

/// Return and clear the pending flash messages of a session, oldest first.
pub fn take_flashes(conn: &Connection, session_id: &str) -> Result<Vec<FlashMessage>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT category, message FROM flashes WHERE session_id = ?1 ORDER BY id ASC",
    )?;
    let flashes = stmt
        .query_map(params![session_id], |r| {
            Ok(FlashMessage {
                category: r.get(0)?,
                message: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if !flashes.is_empty() {
        conn.execute("DELETE FROM flashes WHERE session_id = ?1", params![session_id])?;
    }
    Ok(flashes)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
