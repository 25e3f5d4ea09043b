use rusqlite::{params_from_iter, types::Value};
use serde_json::json;

use crate::ipc::error::ok;
use crate::ipc::helpers::{query_opt_str, require_session, HandlerErr};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/budgets") => Some(handle_budgets_list(state, req)),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct BudgetFilter {
    teacher_id: Option<String>,
    school_year_id: Option<String>,
}

fn handle_budgets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let filter = BudgetFilter {
        teacher_id: query_opt_str(&req.query, "teacherId"),
        school_year_id: query_opt_str(&req.query, "schoolYearId"),
    };

    let mut sql = String::from(
        "SELECT t.id, t.teacher_id, d.cognome, d.nome, t.school_year_id, y.name,
                t.minuti_settimana, t.minuti_annui, t.moduli_annui, t.saldo
         FROM tesoretti t
         JOIN teachers d ON d.id = t.teacher_id
         JOIN school_years y ON y.id = t.school_year_id
         WHERE 1=1",
    );
    let mut params: Vec<Value> = Vec::new();
    if let Some(teacher_id) = &filter.teacher_id {
        sql.push_str(" AND t.teacher_id = ?");
        params.push(Value::Text(teacher_id.clone()));
    }
    if let Some(school_year_id) = &filter.school_year_id {
        sql.push_str(" AND t.school_year_id = ?");
        params.push(Value::Text(school_year_id.clone()));
    }
    sql.push_str(" ORDER BY y.name DESC, d.cognome, d.nome");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return HandlerErr::internal(e).response(&req.id),
    };
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "teacherId": row.get::<_, String>(1)?,
                "cognome": row.get::<_, String>(2)?,
                "nome": row.get::<_, String>(3)?,
                "schoolYearId": row.get::<_, String>(4)?,
                "schoolYearName": row.get::<_, String>(5)?,
                "minutiSettimana": row.get::<_, Option<f64>>(6)?,
                "minutiAnnui": row.get::<_, f64>(7)?,
                "moduliAnnui": row.get::<_, f64>(8)?,
                "saldo": row.get::<_, f64>(9)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(budgets) => ok(&req.id, json!({ "budgets": budgets })),
        Err(e) => HandlerErr::internal(e).response(&req.id),
    }
}
