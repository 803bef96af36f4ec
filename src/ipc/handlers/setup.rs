use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, db_conn};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_exam_types_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    Ok(json!({
        "examTypes": db::exam_types(conn)?,
        "defaultExamType": db::default_exam_type(conn)?,
    }))
}

fn handle_exam_types_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_approve_marks() {
        return Err(role.forbidden("change exam types").into());
    }

    let Some(raw) = req.params.get("examTypes").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("examTypes must be an array of strings"));
    };
    let mut exam_types: Vec<String> = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(HandlerErr::bad_params("examTypes must be non-empty strings")
                .with_details(json!({ "value": v })));
        };
        if !exam_types.iter().any(|e| e == s) {
            exam_types.push(s.to_string());
        }
    }
    if exam_types.is_empty() {
        return Err(HandlerErr::bad_params("examTypes must not be empty"));
    }

    let default_exam_type = match req.params.get("defaultExamType").and_then(|v| v.as_str()) {
        Some(d) => d.trim().to_string(),
        None => db::default_exam_type(conn)?,
    };
    if !exam_types.contains(&default_exam_type) {
        return Err(HandlerErr::bad_params("defaultExamType must be one of examTypes")
            .with_details(json!({ "defaultExamType": default_exam_type })));
    }

    db::settings_set_json(conn, db::EXAM_TYPES_KEY, &json!(exam_types))?;
    db::settings_set_json(conn, db::DEFAULT_EXAM_TYPE_KEY, &json!(default_exam_type))?;
    tracing::info!(actor = role.actor_id(), count = exam_types.len(), "exam types updated");
    Ok(json!({
        "examTypes": exam_types,
        "defaultExamType": default_exam_type,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.examTypes.get" => handle_exam_types_get(state, req),
        "setup.examTypes.set" => handle_exam_types_set(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
