use super::ranking::subject_scores;
use super::{classify, round_2_decimals, ClassPerformance, MarkRecord};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLine {
    pub subject: String,
    pub exam_type: String,
    pub opening: Option<f64>,
    pub midterm: Option<f64>,
    #[serde(rename = "final")]
    pub final_exam: Option<f64>,
    pub total: f64,
    pub grade: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportCard {
    pub student_id: String,
    pub term: i64,
    pub year: i64,
    pub subjects: Vec<ReportLine>,
    pub total_marks: f64,
    pub total_points: i64,
    pub mean_score: Option<f64>,
    pub overall_grade: Option<String>,
    pub overall_points: Option<i64>,
    pub position: Option<usize>,
    pub class_size: Option<usize>,
}

/// Composes a report card from a student's approved marks and a class
/// snapshot for the same term and year.
///
/// Provisional (unapproved) marks never appear. Position and class size
/// stay unset when the student is missing from the snapshot or has not
/// been ranked in it.
pub fn build_report(
    student_id: &str,
    term: i64,
    year: i64,
    marks: &[MarkRecord],
    class_performance: &ClassPerformance,
) -> StudentReportCard {
    let approved: Vec<&MarkRecord> = marks
        .iter()
        .filter(|m| m.approved && m.matches(student_id, term, year))
        .collect();
    let subjects: Vec<ReportLine> = approved
        .iter()
        .map(|m| {
            // Re-derive rather than trust the stored letter.
            let grade = classify(m.total);
            ReportLine {
                subject: m.subject.clone(),
                exam_type: m.exam_type.clone(),
                opening: m.opening,
                midterm: m.midterm,
                final_exam: m.final_exam,
                total: m.total,
                grade: grade.letter.to_string(),
                points: grade.points,
            }
        })
        .collect();

    // Totals count each subject once, as the class ranking does.
    let scores = subject_scores(approved.iter().copied());
    let total_marks: f64 = scores.iter().map(|(_, total)| total).sum();
    let total_points: i64 = scores.iter().map(|(_, total)| classify(*total).points).sum();
    let mean_score = if scores.is_empty() {
        None
    } else {
        Some(round_2_decimals(total_marks / (scores.len() as f64)))
    };
    let overall = mean_score.map(classify);

    let ranked = class_performance
        .student(student_id)
        .and_then(|s| s.position);
    let class_size = ranked.map(|_| class_performance.class_size());

    StudentReportCard {
        student_id: student_id.to_string(),
        term,
        year,
        subjects,
        total_marks: round_2_decimals(total_marks),
        total_points,
        mean_score,
        overall_grade: overall.map(|g| g.letter.to_string()),
        overall_points: overall.map(|g| g.points),
        position: ranked,
        class_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{rank_class, test_record, StudentRef};

    fn roster(ids: &[&str]) -> Vec<StudentRef> {
        ids.iter()
            .map(|id| StudentRef {
                student_id: id.to_string(),
                display_name: None,
                admission_no: None,
            })
            .collect()
    }

    #[test]
    fn report_uses_only_approved_marks_for_the_term() {
        let marks = vec![
            test_record("S1", "Mathematics", 1, 2024, 85.5, true),
            test_record("S1", "English", 1, 2024, 64.5, true),
            test_record("S1", "Physics", 1, 2024, 10.0, false),
            test_record("S1", "Mathematics", 2, 2024, 20.0, true),
            test_record("S2", "Mathematics", 1, 2024, 60.0, true),
        ];
        let class = rank_class(
            &marks
                .iter()
                .filter(|m| m.approved && m.term == 1)
                .cloned()
                .collect::<Vec<_>>(),
            &roster(&["S1", "S2", "S3"]),
        );
        let card = build_report("S1", 1, 2024, &marks, &class);

        assert_eq!(card.subjects.len(), 2);
        assert!(card.subjects.iter().all(|s| s.subject != "Physics"));
        assert_eq!(card.total_marks, 150.0);
        assert_eq!(card.mean_score, Some(75.0));
        assert_eq!(card.overall_grade.as_deref(), Some("A-"));
        assert_eq!(card.overall_points, Some(11));
        assert_eq!(card.total_points, 12 + 8);
        assert_eq!(card.position, Some(1));
        assert_eq!(card.class_size, Some(3));
    }

    #[test]
    fn subject_with_several_exam_types_counts_once() {
        let mut mid = test_record("S1", "Mathematics", 1, 2024, 40.0, true);
        mid.exam_type = "Mid Term".to_string();
        let marks = vec![
            test_record("S1", "Mathematics", 1, 2024, 80.0, true),
            mid,
            test_record("S1", "English", 1, 2024, 90.0, true),
            test_record("S2", "Mathematics", 1, 2024, 50.0, true),
        ];
        let class = rank_class(&marks, &roster(&["S1", "S2"]));
        let card = build_report("S1", 1, 2024, &marks, &class);

        let ranked = class.student("S1").expect("S1");
        assert_eq!(ranked.mean_score, Some(75.0));
        assert_eq!(ranked.grade.as_deref(), Some("A-"));

        // Every record is still listed, but the totals agree with the ranking.
        assert_eq!(card.subjects.len(), 3);
        assert_eq!(card.total_marks, 150.0);
        assert_eq!(card.mean_score, ranked.mean_score);
        assert_eq!(card.overall_grade, ranked.grade);
        assert_eq!(card.overall_points, Some(11));
        // Mathematics averages to 60 (B-, 8), English 90 (A, 12).
        assert_eq!(card.total_points, 20);
        assert_eq!(card.position, Some(1));
    }

    #[test]
    fn student_absent_from_snapshot_has_no_position() {
        let marks = vec![test_record("S9", "Mathematics", 1, 2024, 70.0, true)];
        let class = rank_class(&[], &roster(&["S1"]));
        let card = build_report("S9", 1, 2024, &marks, &class);
        assert_eq!(card.mean_score, Some(70.0));
        assert_eq!(card.position, None);
        assert_eq!(card.class_size, None);
    }

    #[test]
    fn no_approved_marks_leaves_overall_unset() {
        let marks = vec![test_record("S1", "Mathematics", 1, 2024, 70.0, false)];
        let class = rank_class(&[], &roster(&["S1"]));
        let card = build_report("S1", 1, 2024, &marks, &class);
        assert!(card.subjects.is_empty());
        assert_eq!(card.mean_score, None);
        assert_eq!(card.overall_grade, None);
        assert_eq!(card.total_points, 0);
        // Placeholder rows carry no position.
        assert_eq!(card.position, None);
        assert_eq!(card.class_size, None);
    }
}
