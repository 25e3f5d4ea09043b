use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::teachers::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::activities::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::budgets::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::school_years::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::recovery_types::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::import_csv::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        404,
        format!("unknown route: {} {}", req.method, req.path),
    )
}
