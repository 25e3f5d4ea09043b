use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{created, ok};
use crate::ipc::helpers::{body_opt_str, body_required_str, require_session, HandlerErr};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/school-years/active") => Some(handle_active(state, req)),
        ("GET", "/school-years") => Some(handle_list(state, req)),
        ("POST", "/school-years") => Some(handle_create(state, req)),
        _ => None,
    }
}

fn year_json(
    id: String,
    name: String,
    start_date: Option<String>,
    end_date: Option<String>,
    active: bool,
) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "startDate": start_date,
        "endDate": end_date,
        "active": active
    })
}

fn handle_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let row = conn
        .query_row(
            "SELECT id, name, start_date, end_date FROM school_years WHERE active = 1 LIMIT 1",
            [],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional();

    match row {
        Ok(Some((id, name, start, end))) => ok(
            &req.id,
            json!({ "schoolYear": year_json(id, name, start, end, true) }),
        ),
        Ok(None) => HandlerErr::not_found("no active school year").response(&req.id),
        Err(e) => HandlerErr::internal(e).response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let mut stmt = match conn.prepare(
        "SELECT id, name, start_date, end_date, active FROM school_years ORDER BY name DESC",
    ) {
        Ok(s) => s,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(year_json(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get::<_, i64>(4)? != 0,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(years) => ok(&req.id, json!({ "schoolYears": years })),
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
    let start_date = body_opt_str(&req.body, "startDate");
    let end_date = body_opt_str(&req.body, "endDate");
    let active = req
        .body
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let year_id = Uuid::new_v4().to_string();

    // Activating a year deactivates the others in the same transaction so
    // there is never more than one active row.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    if active {
        if let Err(e) = tx.execute("UPDATE school_years SET active = 0 WHERE active = 1", []) {
            let _ = tx.rollback();
            return HandlerErr::internal(e).response(&req.id);
        }
    }
    if let Err(e) = tx.execute(
        "INSERT INTO school_years(id, name, start_date, end_date, active) VALUES(?, ?, ?, ?, ?)",
        (&year_id, &name, &start_date, &end_date, active as i64),
    ) {
        let _ = tx.rollback();
        let msg = e.to_string();
        if msg.contains("UNIQUE") {
            return HandlerErr::bad_request(format!("school year already exists: {}", name))
                .response(&req.id);
        }
        return HandlerErr::internal(msg).response(&req.id);
    }
    if let Err(e) = tx.commit() {
        return HandlerErr::internal(e).response(&req.id);
    }

    created(
        &req.id,
        json!({ "schoolYear": year_json(year_id, name, start_date, end_date, active) }),
    )
}
