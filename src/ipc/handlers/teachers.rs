use std::collections::HashMap;

use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{created, err, ok};
use crate::ipc::helpers::{body_opt_str, body_required_str, now_rfc3339, require_session, HandlerErr};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/teachers") => Some(handle_teachers_list(state, req)),
        ("POST", "/teachers") => Some(handle_teachers_create(state, req)),
        _ => None,
    }
}

/// Teachers with their full tesoretto history, newest school year first.
fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let mut budget_stmt = match conn.prepare(
        "SELECT t.id, t.teacher_id, t.school_year_id, y.name,
                t.minuti_settimana, t.minuti_annui, t.moduli_annui, t.saldo
         FROM tesoretti t
         JOIN school_years y ON y.id = t.school_year_id
         ORDER BY y.name DESC",
    ) {
        Ok(s) => s,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };

    let mut budgets_by_teacher: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    let budget_rows = budget_stmt.query_map([], |row| {
        let teacher_id: String = row.get(1)?;
        let entry = json!({
            "id": row.get::<_, String>(0)?,
            "schoolYearId": row.get::<_, String>(2)?,
            "schoolYearName": row.get::<_, String>(3)?,
            "minutiSettimana": row.get::<_, Option<f64>>(4)?,
            "minutiAnnui": row.get::<_, f64>(5)?,
            "moduliAnnui": row.get::<_, f64>(6)?,
            "saldo": row.get::<_, f64>(7)?,
        });
        Ok((teacher_id, entry))
    });
    match budget_rows.and_then(|it| it.collect::<Result<Vec<_>, _>>()) {
        Ok(rows) => {
            for (teacher_id, entry) in rows {
                budgets_by_teacher.entry(teacher_id).or_default().push(entry);
            }
        }
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    }

    let mut stmt = match conn.prepare(
        "SELECT id, cognome, nome, email FROM teachers ORDER BY cognome, nome",
    ) {
        Ok(s) => s,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let cognome: String = row.get(1)?;
            let nome: String = row.get(2)?;
            let email: Option<String> = row.get(3)?;
            Ok((id, cognome, nome, email))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(teachers) => {
            let teachers = teachers
                .into_iter()
                .map(|(id, cognome, nome, email)| {
                    let budgets = budgets_by_teacher.remove(&id).unwrap_or_default();
                    json!({
                        "id": id,
                        "cognome": cognome,
                        "nome": nome,
                        "email": email,
                        "budgets": budgets
                    })
                })
                .collect::<Vec<_>>();
            ok(&req.id, json!({ "teachers": teachers }))
        }
        Err(e) => HandlerErr::internal(e).response(&req.id),
    }
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let cognome = match body_required_str(&req.body, "cognome") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let nome = match body_required_str(&req.body, "nome") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let email = body_opt_str(&req.body, "email");

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM teachers
             WHERE lower(trim(cognome)) = lower(?) AND lower(trim(nome)) = lower(?)",
            (&cognome, &nome),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    if existing.is_some() {
        return err(
            &req.id,
            400,
            format!("teacher already exists: {} {}", cognome, nome),
        );
    }

    let teacher_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO teachers(id, cognome, nome, email, created_at) VALUES(?, ?, ?, ?, ?)",
        (&teacher_id, &cognome, &nome, &email, now_rfc3339()),
    ) {
        return HandlerErr::internal(e).response(&req.id);
    }

    created(
        &req.id,
        json!({
            "teacher": {
                "id": teacher_id,
                "cognome": cognome,
                "nome": nome,
                "email": email
            }
        }),
    )
}
