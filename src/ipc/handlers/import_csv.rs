use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::import::{build_preview, ParsedImportRecord};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    active_school_year_id, body_required_str, now_rfc3339, require_session, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/import/preview") => Some(handle_import_preview(state, req)),
        ("POST", "/import/commit") => Some(handle_import_commit(state, req)),
        _ => None,
    }
}

fn handle_import_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let content = match body_required_str(&req.body, "content") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let preview = build_preview(&content);
    match serde_json::to_value(&preview) {
        Ok(v) => ok(&req.id, v),
        Err(e) => HandlerErr::internal(e).response(&req.id),
    }
}

/// Re-derives the preview from the submitted text and commits its valid
/// records one by one. Records are independent: a storage failure on one is
/// recorded against its row and does not roll back or stop the others.
fn handle_import_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = &state.conn;
    if let Err(e) = require_session(conn, req) {
        return e.response(&req.id);
    }

    let content = match body_required_str(&req.body, "content") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let school_year_id = match active_school_year_id(conn) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let preview = build_preview(&content);
    if !preview.errors.is_empty() {
        return HandlerErr::bad_request(preview.errors.join("; ")).response(&req.id);
    }

    let mut created = 0usize;
    let mut updated = 0usize;
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for record in preview.records.iter().filter(|r| r.is_valid()) {
        match commit_record(conn, record, &school_year_id) {
            Ok(CommitOutcome::Created) => created += 1,
            Ok(CommitOutcome::Updated) => updated += 1,
            Err(message) => {
                errors.push(json!({ "row": record.row, "message": message }));
            }
        }
    }

    let success = errors.is_empty();
    let message = format!(
        "import finished: {} created, {} updated, {} errors",
        created,
        updated,
        errors.len()
    );
    ok(
        &req.id,
        json!({
            "success": success,
            "message": message,
            "created": created,
            "updated": updated,
            "errors": errors
        }),
    )
}

enum CommitOutcome {
    Created,
    Updated,
}

fn commit_record(
    conn: &Connection,
    record: &ParsedImportRecord,
    school_year_id: &str,
) -> Result<CommitOutcome, String> {
    let existing: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT id, email FROM teachers
             WHERE lower(trim(cognome)) = lower(?) AND lower(trim(nome)) = lower(?)",
            (record.cognome.trim(), record.nome.trim()),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| e.to_string())?;

    let (teacher_id, outcome) = match existing {
        Some((teacher_id, stored_email)) => {
            let email_missing = stored_email.as_deref().map_or(true, |e| e.trim().is_empty());
            if email_missing {
                if let Some(email) = &record.email {
                    conn.execute(
                        "UPDATE teachers SET email = ? WHERE id = ?",
                        (email, &teacher_id),
                    )
                    .map_err(|e| e.to_string())?;
                }
            }
            (teacher_id, CommitOutcome::Updated)
        }
        None => {
            let teacher_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO teachers(id, cognome, nome, email, created_at) VALUES(?, ?, ?, ?, ?)",
                (
                    &teacher_id,
                    record.cognome.trim(),
                    record.nome.trim(),
                    &record.email,
                    now_rfc3339(),
                ),
            )
            .map_err(|e| e.to_string())?;
            (teacher_id, CommitOutcome::Created)
        }
    };

    conn.execute(
        "INSERT INTO tesoretti(id, teacher_id, school_year_id, minuti_settimana,
                               minuti_annui, moduli_annui, saldo, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &teacher_id,
            school_year_id,
            record.minuti_settimana,
            record.minuti_annui,
            record.moduli_annui,
            record.saldo,
            now_rfc3339(),
        ),
    )
    .map_err(|e| e.to_string())?;

    Ok(outcome)
}
