use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{created, ok};
use crate::ipc::helpers::{body_opt_str, body_required_str, require_session, HandlerErr};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/recovery-types") => Some(handle_list(state, req)),
        ("POST", "/recovery-types") => Some(handle_create(state, req)),
        _ => None,
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let mut stmt = match conn.prepare(
        "SELECT id, name, description FROM recovery_types ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "description": row.get::<_, Option<String>>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(types) => ok(&req.id, json!({ "recoveryTypes": types })),
        Err(e) => HandlerErr::internal(e).response(&req.id),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let name = match body_required_str(&req.body, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let description = body_opt_str(&req.body, "description");

    let type_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO recovery_types(id, name, description) VALUES(?, ?, ?)",
        (&type_id, &name, &description),
    ) {
        let msg = e.to_string();
        if msg.contains("UNIQUE") {
            return HandlerErr::bad_request(format!("recovery type already exists: {}", name))
                .response(&req.id);
        }
        return HandlerErr::internal(msg).response(&req.id);
    }

    created(
        &req.id,
        json!({
            "recoveryType": {
                "id": type_id,
                "name": name,
                "description": description
            }
        }),
    )
}
