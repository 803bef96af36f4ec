use crate::calc::{self, MarkRecord};
use crate::db::{self, MarkFilter, StudentRow};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    actor, current_year, db_conn, now_rfc3339, optional_bool, optional_i64, optional_str,
    required_i64, required_str, ComponentParams,
};
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// The (student, subject, term, year, exam type) a mark is stored under.
struct MarkKeyParams {
    student_id: String,
    subject: String,
    term: i64,
    year: i64,
    exam_type: String,
}

fn parse_mark_key(conn: &Connection, req: &Request) -> Result<MarkKeyParams, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let subject = required_str(req, "subject")?;
    let term = required_i64(req, "term")?;
    let year = required_i64(req, "year")?;
    calc::validate_term(term)?;
    calc::validate_year(year, current_year())?;

    let exam_type = match optional_str(req, "examType")? {
        Some(v) => v,
        None => db::default_exam_type(conn)?,
    };
    let allowed = db::exam_types(conn)?;
    if !allowed.contains(&exam_type) {
        return Err(HandlerErr::bad_params("unknown examType")
            .with_details(json!({ "examType": exam_type, "allowed": allowed })));
    }

    Ok(MarkKeyParams {
        student_id,
        subject,
        term,
        year,
        exam_type,
    })
}

fn load_student(conn: &Connection, student_id: &str) -> Result<StudentRow, HandlerErr> {
    db::find_student(conn, student_id)?.ok_or_else(|| {
        HandlerErr::not_found("student not found").with_details(json!({ "studentId": student_id }))
    })
}

/// A teacher may only write marks for subjects they teach in the student's
/// form.
fn authorize_entry(
    conn: &Connection,
    role: &Role,
    subject: &str,
    student: &StudentRow,
) -> Result<(), HandlerErr> {
    let allowed = match role {
        Role::Principal { .. } => true,
        Role::Teacher { teacher_id } => {
            db::teacher_is_assigned(conn, teacher_id, subject, &student.form)?
        }
        Role::Student { .. } | Role::Secretary { .. } | Role::Bursar { .. } => false,
    };
    if allowed {
        return Ok(());
    }
    Err(HandlerErr::from(role.forbidden("enter marks for this subject and form"))
        .with_details(json!({
            "role": role.as_str(),
            "subject": subject,
            "form": student.form,
        })))
}

fn merged_scores(
    components: &ComponentParams,
    stored: calc::ComponentScores,
) -> Result<calc::ComponentScores, HandlerErr> {
    let scores = components.merge_over(stored);
    if scores.is_empty() {
        return Err(HandlerErr::bad_params(
            "a mark must keep at least one component score",
        ));
    }
    Ok(scores)
}

fn conflict(mark: &MarkRecord) -> HandlerErr {
    HandlerErr::new("conflict", "mark was changed by another writer")
        .with_details(json!({ "markId": mark.id, "version": mark.version }))
}

fn handle_marks_enter(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    let key = parse_mark_key(conn, req)?;
    let components = ComponentParams::parse(req)?;
    if components.submits_nothing() {
        return Err(HandlerErr::bad_params(
            "submit at least one of: opening, midterm, final",
        ));
    }
    let expected_version = optional_i64(req, "expectedVersion")?;

    let student = load_student(conn, &key.student_id)?;
    authorize_entry(conn, &role, &key.subject, &student)?;

    let now = now_rfc3339();
    let existing = db::find_mark(
        conn,
        &key.student_id,
        &key.subject,
        key.term,
        key.year,
        &key.exam_type,
    )?;

    let (record, created) = match existing {
        Some(mut mark) => {
            if mark.approved {
                return Err(HandlerErr::new("already_approved", "approved marks are locked")
                    .with_details(json!({ "markId": mark.id })));
            }
            if let Some(v) = expected_version {
                if v != mark.version {
                    return Err(conflict(&mark));
                }
            }
            let scores = merged_scores(&components, mark.components())?;
            let agg = calc::aggregate(&scores)?;
            mark.apply_aggregate(&scores, &agg, &now);
            if !db::update_mark_scores(conn, &mark, mark.version)? {
                return Err(conflict(&mark));
            }
            mark.version += 1;
            (mark, false)
        }
        None => {
            if let Some(v) = expected_version {
                if v != 0 {
                    return Err(HandlerErr::not_found("no mark to update")
                        .with_details(json!({ "expectedVersion": v })));
                }
            }
            let scores = merged_scores(&components, calc::ComponentScores::default())?;
            let agg = calc::aggregate(&scores)?;
            let mut mark = MarkRecord {
                id: Uuid::new_v4().to_string(),
                student_id: key.student_id.clone(),
                subject: key.subject.clone(),
                term: key.term,
                year: key.year,
                exam_type: key.exam_type.clone(),
                opening: None,
                midterm: None,
                final_exam: None,
                total: 0.0,
                percentage: 0.0,
                grade: String::new(),
                points: 0,
                approved: false,
                approved_by: None,
                approved_at: None,
                created_at: now.clone(),
                updated_at: now.clone(),
                version: 1,
            };
            mark.apply_aggregate(&scores, &agg, &now);
            db::insert_mark(conn, &mark).map_err(|e| {
                // Another writer created the same key first.
                if db::is_constraint_violation(&e) {
                    conflict(&mark)
                } else {
                    HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "marks" }))
                }
            })?;
            (mark, true)
        }
    };

    tracing::info!(
        mark_id = %record.id,
        student_id = %record.student_id,
        subject = %record.subject,
        term = record.term,
        year = record.year,
        total = record.total,
        created,
        actor = role.actor_id(),
        "mark entered"
    );
    Ok(json!({ "created": created, "mark": record }))
}

fn handle_marks_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    let key = parse_mark_key(conn, req)?;
    if !role.can_view_student_results(&key.student_id) {
        return Err(role.forbidden("view these marks").into());
    }

    let mark = db::find_mark(
        conn,
        &key.student_id,
        &key.subject,
        key.term,
        key.year,
        &key.exam_type,
    )?
    .ok_or_else(|| HandlerErr::not_found("mark not found"))?;
    if matches!(role, Role::Student { .. }) && !mark.approved {
        return Err(HandlerErr::not_found("mark not found"));
    }
    Ok(json!({ "mark": mark }))
}

fn parse_mark_filter(req: &Request) -> Result<MarkFilter, HandlerErr> {
    let term = optional_i64(req, "term")?;
    if let Some(t) = term {
        calc::validate_term(t)?;
    }
    Ok(MarkFilter {
        student_id: optional_str(req, "studentId")?,
        form: optional_str(req, "form")?,
        subject: optional_str(req, "subject")?,
        term,
        year: optional_i64(req, "year")?,
        exam_type: optional_str(req, "examType")?,
        approved_only: optional_bool(req, "approvedOnly", false)?,
    })
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    let mut filter = parse_mark_filter(req)?;

    match &role {
        Role::Student { student_id } => {
            if filter.student_id.as_deref().is_some_and(|s| s != student_id.as_str()) {
                return Err(role.forbidden("view another student's marks").into());
            }
            filter.student_id = Some(student_id.clone());
            // Students never see provisional marks.
            filter.approved_only = true;
        }
        _ if role.can_view_class_results() => {}
        _ => return Err(role.forbidden("view marks").into()),
    }

    let marks = db::list_marks(conn, &filter)?;
    Ok(json!({ "count": marks.len(), "marks": marks }))
}

fn handle_marks_approve(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_approve_marks() {
        return Err(role.forbidden("approve marks").into());
    }

    let mark_id = required_str(req, "markId")?;
    let mark = db::find_mark_by_id(conn, &mark_id)?.ok_or_else(|| {
        HandlerErr::not_found("mark not found").with_details(json!({ "markId": mark_id }))
    })?;
    if mark.approved {
        return Err(HandlerErr::new("already_approved", "mark is already approved")
            .with_details(json!({
                "markId": mark.id,
                "approvedBy": mark.approved_by,
                "approvedAt": mark.approved_at,
            })));
    }

    let now = now_rfc3339();
    if !db::approve_mark(conn, &mark.id, role.actor_id(), &now)? {
        return Err(conflict(&mark));
    }
    let approved = db::find_mark_by_id(conn, &mark.id)?
        .ok_or_else(|| HandlerErr::not_found("mark not found"))?;

    tracing::info!(mark_id = %approved.id, approver = role.actor_id(), "mark approved");
    Ok(json!({ "mark": approved }))
}

fn handle_marks_approve_all(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    if !role.can_approve_marks() {
        return Err(role.forbidden("approve marks").into());
    }

    let form = required_str(req, "form")?;
    let term = required_i64(req, "term")?;
    let year = required_i64(req, "year")?;
    calc::validate_term(term)?;
    calc::validate_year(year, current_year())?;
    let filter = MarkFilter {
        form: Some(form),
        subject: optional_str(req, "subject")?,
        term: Some(term),
        year: Some(year),
        exam_type: optional_str(req, "examType")?,
        ..MarkFilter::default()
    };

    let now = now_rfc3339();
    let pending: Vec<MarkRecord> = db::list_marks(conn, &filter)?
        .into_iter()
        .filter(|m| !m.approved)
        .collect();
    let mut approved_ids = Vec::with_capacity(pending.len());
    for m in &pending {
        // Rows approved concurrently are skipped.
        if db::approve_mark(conn, &m.id, role.actor_id(), &now)? {
            approved_ids.push(m.id.clone());
        }
    }

    tracing::info!(
        approver = role.actor_id(),
        approved = approved_ids.len(),
        "marks approved in bulk"
    );
    Ok(json!({ "approvedCount": approved_ids.len(), "markIds": approved_ids }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.enter" => handle_marks_enter(state, req),
        "marks.get" => handle_marks_get(state, req),
        "marks.list" => handle_marks_list(state, req),
        "marks.approve" => handle_marks_approve(state, req),
        "marks.approveAll" => handle_marks_approve_all(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
