use rusqlite::{params_from_iter, types::Value};
use serde_json::json;
use uuid::Uuid;

use crate::import::{round2, MODULE_MINUTES};
use crate::ipc::error::{created, ok};
use crate::ipc::helpers::{
    active_school_year_id, body_opt_str, body_required_str, now_rfc3339, query_opt_str,
    require_session, teacher_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/activities") => Some(handle_activities_list(state, req)),
        ("POST", "/activities") => Some(handle_activities_create(state, req)),
        _ => None,
    }
}

/// Optional listing filters, each matched explicitly when the query is built.
#[derive(Debug, Default)]
struct ActivityFilter {
    school_year_id: Option<String>,
    teacher_id: Option<String>,
}

fn handle_activities_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let filter = ActivityFilter {
        school_year_id: query_opt_str(&req.query, "schoolYearId"),
        teacher_id: query_opt_str(&req.query, "teacherId"),
    };

    let mut sql = String::from(
        "SELECT id, teacher_id, school_year_id, recovery_type_id,
                date, minutes, modules, note
         FROM activities
         WHERE 1=1",
    );
    let mut params: Vec<Value> = Vec::new();
    if let Some(teacher_id) = &filter.teacher_id {
        sql.push_str(" AND teacher_id = ?");
        params.push(Value::Text(teacher_id.clone()));
    }
    if let Some(school_year_id) = &filter.school_year_id {
        sql.push_str(" AND school_year_id = ?");
        params.push(Value::Text(school_year_id.clone()));
    }
    sql.push_str(" ORDER BY date DESC, created_at DESC");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "teacherId": row.get::<_, String>(1)?,
                "schoolYearId": row.get::<_, String>(2)?,
                "recoveryTypeId": row.get::<_, Option<String>>(3)?,
                "date": row.get::<_, Option<String>>(4)?,
                "minutes": row.get::<_, f64>(5)?,
                "modules": row.get::<_, f64>(6)?,
                "note": row.get::<_, Option<String>>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(activities) => ok(&req.id, json!({ "activities": activities })),
        Err(e) => HandlerErr::internal(e).response(&req.id),
    }
}

fn handle_activities_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let teacher_id = match body_required_str(&req.body, "teacherId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let minutes = match req.body.get("minutes").and_then(|v| v.as_f64()) {
        Some(v) if v >= 0.0 => v,
        Some(_) => return HandlerErr::bad_request("minutes must not be negative").response(&req.id),
        None => return HandlerErr::bad_request("missing minutes").response(&req.id),
    };
    let recovery_type_id = body_opt_str(&req.body, "recoveryTypeId");
    let date = body_opt_str(&req.body, "date");
    let note = body_opt_str(&req.body, "note");

    match teacher_exists(conn, &teacher_id) {
        Ok(true) => {}
        Ok(false) => return HandlerErr::not_found("teacher not found").response(&req.id),
        Err(e) => return e.response(&req.id),
    }

    let school_year_id = match body_opt_str(&req.body, "schoolYearId") {
        Some(v) => v,
        None => match active_school_year_id(conn) {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        },
    };

    let modules = round2(minutes / MODULE_MINUTES);
    let activity_id = Uuid::new_v4().to_string();

    // Insert and saldo debit must land together.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO activities(id, teacher_id, school_year_id, recovery_type_id,
                                date, minutes, modules, note, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &activity_id,
            &teacher_id,
            &school_year_id,
            &recovery_type_id,
            &date,
            minutes,
            modules,
            &note,
            now_rfc3339(),
        ),
    ) {
        let _ = tx.rollback();
        return HandlerErr::internal(e).response(&req.id);
    }
    if let Err(e) = tx.execute(
        "UPDATE tesoretti SET saldo = saldo - ?
         WHERE teacher_id = ? AND school_year_id = ?",
        (minutes, &teacher_id, &school_year_id),
    ) {
        let _ = tx.rollback();
        return HandlerErr::internal(e).response(&req.id);
    }
    if let Err(e) = tx.commit() {
        return HandlerErr::internal(e).response(&req.id);
    }

    created(
        &req.id,
        json!({
            "activity": {
                "id": activity_id,
                "teacherId": teacher_id,
                "schoolYearId": school_year_id,
                "recoveryTypeId": recovery_type_id,
                "date": date,
                "minutes": minutes,
                "modules": modules,
                "note": note
            }
        }),
    )
}
