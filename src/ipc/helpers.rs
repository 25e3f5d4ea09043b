use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use super::error::err;
use super::types::Request;

/// Handler-level failure carrying the status code it maps to. Storage
/// detail never reaches the caller on 500s; it goes to stderr instead.
#[derive(Debug)]
pub struct HandlerErr {
    pub status: u16,
    pub message: String,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.status, self.message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HandlerErr {
            status: 400,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        HandlerErr {
            status: 401,
            message: "Unauthorized".to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            status: 404,
            message: message.into(),
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        eprintln!("recuperod: internal error: {}", e);
        HandlerErr {
            status: 500,
            message: "internal error".to_string(),
        }
    }
}

/// Verify the request's session token against the sessions table. Rejecting
/// a missing token happens before any storage access.
pub fn require_session(conn: &Connection, req: &Request) -> Result<(), HandlerErr> {
    let token = match req.session.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Err(HandlerErr::unauthorized()),
    };

    let expires_at: Option<Option<String>> = conn
        .query_row(
            "SELECT expires_at FROM sessions WHERE token = ?",
            [token],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::internal)?;

    match expires_at {
        None => Err(HandlerErr::unauthorized()),
        Some(None) => Ok(()),
        Some(Some(ts)) => {
            let expiry = chrono::DateTime::parse_from_rfc3339(&ts)
                .map_err(|_| HandlerErr::unauthorized())?;
            if expiry > Utc::now() {
                Ok(())
            } else {
                Err(HandlerErr::unauthorized())
            }
        }
    }
}

pub fn body_required_str(body: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_request(format!("missing {}", key)))
}

pub fn body_opt_str(body: &serde_json::Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn query_opt_str(query: &serde_json::Value, key: &str) -> Option<String> {
    query
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Id of the single active school year, or a 404.
pub fn active_school_year_id(conn: &Connection) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT id FROM school_years WHERE active = 1 LIMIT 1",
        [],
        |r| r.get::<_, String>(0),
    )
    .optional()
    .map_err(HandlerErr::internal)?
    .ok_or_else(|| HandlerErr::not_found("no active school year"))
}

pub fn teacher_exists(conn: &Connection, teacher_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::internal)
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
