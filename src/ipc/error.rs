use serde_json::json;

/// Response envelope: `{ id, status, body }`, with the HTTP status code
/// assigned here at the boundary rather than inside handler logic.
pub fn respond(id: &str, status: u16, body: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "status": status,
        "body": body
    })
}

pub fn ok(id: &str, body: serde_json::Value) -> serde_json::Value {
    respond(id, 200, body)
}

pub fn created(id: &str, body: serde_json::Value) -> serde_json::Value {
    respond(id, 201, body)
}

pub fn err(id: &str, status: u16, message: impl Into<String>) -> serde_json::Value {
    respond(id, status, json!({ "error": message.into() }))
}
