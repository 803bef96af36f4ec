use crate::calc;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, current_year, db_conn, now_rfc3339, optional_i64, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_manage_roster() {
        return Err(role.forbidden("add students").into());
    }

    let last_name = required_str(req, "lastName")?;
    let first_name = required_str(req, "firstName")?;
    let admission_no = required_str(req, "admissionNo")?;
    let form = required_str(req, "form")?;
    let year = required_i64(req, "year")?;
    calc::validate_year(year, current_year())?;

    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE form = ? AND year = ?",
        (&form, year),
        |r| r.get(0),
    )?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, admission_no, last_name, first_name, form, year, sort_order, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &admission_no,
            &last_name,
            &first_name,
            &form,
            year,
            sort_order,
            now_rfc3339(),
        ),
    )
    .map_err(|e| {
        if db::is_constraint_violation(&e) {
            HandlerErr::new("conflict", "admission number already in use")
                .with_details(json!({ "admissionNo": admission_no }))
        } else {
            HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "students" }))
        }
    })?;

    tracing::info!(student_id = %student_id, form = %form, year, "student created");
    Ok(json!({ "studentId": student_id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_view_roster() {
        return Err(role.forbidden("list students").into());
    }

    let form = optional_str(req, "form")?;
    let year = optional_i64(req, "year")?;
    let students = db::list_students(conn, form.as_deref(), year)?;
    Ok(json!({
        "students": students.iter().map(|s| s.to_json()).collect::<Vec<_>>()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
