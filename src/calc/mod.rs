//! Pure grading computations.
//!
//! Nothing in here touches the workspace database: callers load mark rows
//! and roster entries, pass copies in, and persist whatever comes back.

mod aggregate;
mod grade_table;
mod ranking;
mod report;
mod stats;
mod trend;

pub use aggregate::{aggregate, AggregatedMark, ComponentScores};
pub use grade_table::{classify, points_for, Grade, GRADE_BANDS};
pub use ranking::{rank_class, ClassPerformance, StudentRef};
pub use report::build_report;
pub use stats::subject_stats;
pub use trend::{analyze_trend, term_means};

use serde::{Deserialize, Serialize};

pub const MIN_YEAR: i64 = 2020;
pub const TERMS: [i64; 3] = [1, 2, 3];

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Half-away-from-zero rounding to 2 decimal places, used for every
/// stored or reported score.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// One student's marks for one (subject, term, year, exam type).
///
/// `total`, `percentage`, `grade` and `points` are derived by
/// [`MarkRecord::apply_aggregate`] and are never written on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub term: i64,
    pub year: i64,
    pub exam_type: String,
    pub opening: Option<f64>,
    pub midterm: Option<f64>,
    #[serde(rename = "final")]
    pub final_exam: Option<f64>,
    pub total: f64,
    pub percentage: f64,
    pub grade: String,
    pub points: i64,
    pub approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

impl MarkRecord {
    pub fn components(&self) -> ComponentScores {
        ComponentScores {
            opening: self.opening,
            midterm: self.midterm,
            final_exam: self.final_exam,
        }
    }

    /// Writes the component scores and every derived field. Identity and
    /// approval fields are left alone.
    pub fn apply_aggregate(&mut self, scores: &ComponentScores, agg: &AggregatedMark, now: &str) {
        self.opening = scores.opening;
        self.midterm = scores.midterm;
        self.final_exam = scores.final_exam;
        self.total = agg.total;
        self.percentage = agg.percentage;
        self.grade = agg.grade.letter.to_string();
        self.points = agg.grade.points;
        self.updated_at = now.to_string();
    }

    pub fn matches(&self, student_id: &str, term: i64, year: i64) -> bool {
        self.student_id == student_id && self.term == term && self.year == year
    }
}

pub fn validate_term(term: i64) -> Result<(), CalcError> {
    if TERMS.contains(&term) {
        return Ok(());
    }
    Err(
        CalcError::new("bad_params", "term must be one of: 1, 2, 3")
            .with_details(serde_json::json!({ "term": term })),
    )
}

/// Accepts `MIN_YEAR..=current_year + 1`.
pub fn validate_year(year: i64, current_year: i64) -> Result<(), CalcError> {
    let max = current_year + 1;
    if (MIN_YEAR..=max).contains(&year) {
        return Ok(());
    }
    Err(CalcError::new(
        "bad_params",
        format!("year must be between {} and {}", MIN_YEAR, max),
    )
    .with_details(serde_json::json!({ "year": year })))
}

#[cfg(test)]
pub(crate) fn test_record(
    student_id: &str,
    subject: &str,
    term: i64,
    year: i64,
    total: f64,
    approved: bool,
) -> MarkRecord {
    let grade = classify(total);
    MarkRecord {
        id: format!("{}-{}-{}-{}", student_id, subject, term, year),
        student_id: student_id.to_string(),
        subject: subject.to_string(),
        term,
        year,
        exam_type: "End of Term".to_string(),
        opening: None,
        midterm: None,
        final_exam: None,
        total,
        percentage: total,
        grade: grade.letter.to_string(),
        points: grade.points,
        approved,
        approved_by: approved.then(|| "P1".to_string()),
        approved_at: None,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:00:00Z".to_string(),
        version: 1,
    }
}
