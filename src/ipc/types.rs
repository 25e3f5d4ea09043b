use rusqlite::Connection;
use serde::Deserialize;

/// One request line. `method` and `path` mirror the HTTP surface this daemon
/// stands in for; `query` and `body` are JSON objects and `session` carries
/// the auth token issued by the external provider.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: serde_json::Value,
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(default)]
    pub session: Option<String>,
}

pub struct AppState {
    pub conn: Connection,
}
