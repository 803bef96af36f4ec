use crate::calc;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{actor, db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

use super::analytics::{load_class_snapshot, ClassQuery};

fn handle_reports_student(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    let student_id = required_str(req, "studentId")?;
    if !role.can_view_student_results(&student_id) {
        return Err(role.forbidden("view this student's report").into());
    }

    let student = db::find_student(conn, &student_id)?.ok_or_else(|| {
        HandlerErr::not_found("student not found").with_details(json!({ "studentId": student_id }))
    })?;
    // Report cards always rank against approved marks only.
    let mut query = ClassQuery::parse(req, Some(student.form.clone()))?;
    query.include_provisional = false;

    let snapshot = load_class_snapshot(conn, &query)?;
    let card = calc::build_report(
        &student_id,
        query.term,
        query.year,
        &snapshot.marks,
        &snapshot.performance,
    );

    Ok(json!({
        "student": student.to_json(),
        "filters": query.to_json(),
        "classMean": snapshot.performance.class_mean,
        "report": card,
    }))
}

fn handle_reports_class(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_view_class_results() {
        return Err(role.forbidden("view class reports").into());
    }
    let mut query = ClassQuery::parse(req, None)?;
    query.include_provisional = false;

    let students = db::list_students(conn, Some(&query.form), Some(query.year))?;
    let snapshot = load_class_snapshot(conn, &query)?;
    let cards = students
        .iter()
        .map(|s| {
            json!({
                "student": s.to_json(),
                "report": calc::build_report(
                    &s.id,
                    query.term,
                    query.year,
                    &snapshot.marks,
                    &snapshot.performance,
                ),
            })
        })
        .collect::<Vec<_>>();

    tracing::debug!(form = %query.form, cards = cards.len(), "class reports built");
    Ok(json!({
        "filters": query.to_json(),
        "classMean": snapshot.performance.class_mean,
        "subjectMeans": snapshot.performance.subject_means,
        "reports": cards,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.student" => handle_reports_student(state, req),
        "reports.class" => handle_reports_class(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
