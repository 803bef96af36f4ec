use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, db_conn, now_rfc3339, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_assignments_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_manage_roster() {
        return Err(role.forbidden("assign teachers").into());
    }

    let teacher_id = required_str(req, "teacherId")?;
    let subject = required_str(req, "subject")?;
    let form = required_str(req, "form")?;

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO teacher_assignments(teacher_id, subject, form, created_at)
             VALUES(?, ?, ?, ?)",
            (&teacher_id, &subject, &form, now_rfc3339()),
        )
        .map_err(|e| {
            HandlerErr::db("db_insert_failed", e)
                .with_details(json!({ "table": "teacher_assignments" }))
        })?;

    tracing::info!(teacher_id = %teacher_id, subject = %subject, form = %form, "teacher assigned");
    Ok(json!({ "created": inserted == 1 }))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_view_roster() {
        return Err(role.forbidden("list assignments").into());
    }
    let teacher_id = required_str(req, "teacherId")?;

    let mut stmt = conn.prepare(
        "SELECT subject, form FROM teacher_assignments
         WHERE teacher_id = ?
         ORDER BY form, subject",
    )?;
    let assignments = stmt
        .query_map([&teacher_id], |r| {
            Ok(json!({
                "subject": r.get::<_, String>(0)?,
                "form": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({ "teacherId": teacher_id, "assignments": assignments }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.set" => handle_assignments_set(state, req),
        "assignments.list" => handle_assignments_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
