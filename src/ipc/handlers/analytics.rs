use crate::calc::{self, ClassPerformance, MarkRecord, StudentRef};
use crate::db::{self, MarkFilter};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    actor, current_year, db_conn, optional_bool, optional_str, required_i64, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use rusqlite::Connection;
use serde_json::json;

/// Which slice of a form's marks a class-level computation runs over.
#[derive(Debug, Clone)]
pub(crate) struct ClassQuery {
    pub form: String,
    pub term: i64,
    pub year: i64,
    pub exam_type: Option<String>,
    pub include_provisional: bool,
}

impl ClassQuery {
    pub(crate) fn parse(req: &Request, form: Option<String>) -> Result<Self, HandlerErr> {
        let form = match form {
            Some(f) => f,
            None => required_str(req, "form")?,
        };
        let term = required_i64(req, "term")?;
        let year = required_i64(req, "year")?;
        calc::validate_term(term)?;
        calc::validate_year(year, current_year())?;
        Ok(Self {
            form,
            term,
            year,
            exam_type: optional_str(req, "examType")?,
            include_provisional: optional_bool(req, "includeProvisional", false)?,
        })
    }

    fn mark_filter(&self) -> MarkFilter {
        MarkFilter {
            form: Some(self.form.clone()),
            term: Some(self.term),
            year: Some(self.year),
            exam_type: self.exam_type.clone(),
            approved_only: !self.include_provisional,
            ..MarkFilter::default()
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        json!({
            "form": self.form,
            "term": self.term,
            "year": self.year,
            "examType": self.exam_type,
            "includeProvisional": self.include_provisional,
        })
    }
}

pub(crate) struct ClassSnapshot {
    pub roster: Vec<StudentRef>,
    pub marks: Vec<MarkRecord>,
    pub performance: ClassPerformance,
}

pub(crate) fn load_class_snapshot(
    conn: &Connection,
    query: &ClassQuery,
) -> Result<ClassSnapshot, HandlerErr> {
    let roster: Vec<StudentRef> = db::list_students(conn, Some(&query.form), Some(query.year))?
        .iter()
        .map(|s| s.to_ref())
        .collect();
    let marks = db::list_marks(conn, &query.mark_filter())?;
    let performance = calc::rank_class(&marks, &roster);
    Ok(ClassSnapshot {
        roster,
        marks,
        performance,
    })
}

fn require_class_viewer(role: &Role) -> Result<(), HandlerErr> {
    if role.can_view_class_results() {
        Ok(())
    } else {
        Err(role.forbidden("view class results").into())
    }
}

/// Either direction of the grade table: `percentage` to letter and points,
/// or `letter` to points.
fn handle_grade_classify(_state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    if let Some(letter) = optional_str(req, "letter")? {
        return Ok(json!({
            "letter": letter,
            "points": calc::points_for(&letter),
        }));
    }
    let Some(percentage) = req.params.get("percentage").and_then(|v| v.as_f64()) else {
        return Err(HandlerErr::bad_params("percentage must be a number"));
    };
    let grade = calc::classify(percentage);
    Ok(json!({
        "percentage": percentage,
        "letter": grade.letter,
        "points": grade.points,
        "bands": calc::GRADE_BANDS.to_vec(),
    }))
}

fn handle_class_rank(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    require_class_viewer(&role)?;
    let query = ClassQuery::parse(req, None)?;

    let snapshot = load_class_snapshot(conn, &query)?;
    tracing::debug!(
        form = %query.form,
        term = query.term,
        year = query.year,
        marks = snapshot.marks.len(),
        roster = snapshot.roster.len(),
        "class ranked"
    );
    Ok(json!({
        "filters": query.to_json(),
        "performance": snapshot.performance,
    }))
}

fn handle_subject_stats(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    require_class_viewer(&role)?;
    let query = ClassQuery::parse(req, None)?;

    let marks = db::list_marks(conn, &query.mark_filter())?;
    Ok(json!({
        "filters": query.to_json(),
        "subjects": calc::subject_stats(&marks),
    }))
}

fn handle_student_trend(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let role = actor(req)?;
    let student_id = required_str(req, "studentId")?;
    if !role.can_view_student_results(&student_id) {
        return Err(role.forbidden("view this student's results").into());
    }
    let year = required_i64(req, "year")?;
    calc::validate_year(year, current_year())?;
    let exam_type = optional_str(req, "examType")?;
    let include_provisional = match role {
        Role::Student { .. } => false,
        _ => optional_bool(req, "includeProvisional", false)?,
    };

    let student = db::find_student(conn, &student_id)?.ok_or_else(|| {
        HandlerErr::not_found("student not found").with_details(json!({ "studentId": student_id }))
    })?;

    let marks = db::list_marks(
        conn,
        &MarkFilter {
            student_id: Some(student_id.clone()),
            year: Some(year),
            exam_type: exam_type.clone(),
            approved_only: !include_provisional,
            ..MarkFilter::default()
        },
    )?;
    let means = calc::term_means(&marks, &student_id, year);
    let trend = calc::analyze_trend(&means)?;

    Ok(json!({
        "student": student.to_json(),
        "filters": {
            "year": year,
            "examType": exam_type,
            "includeProvisional": include_provisional,
        },
        "trend": trend,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "analytics.grade.classify" => handle_grade_classify(state, req),
        "analytics.class.rank" => handle_class_rank(state, req),
        "analytics.subject.stats" => handle_subject_stats(state, req),
        "analytics.student.trend" => handle_student_trend(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
