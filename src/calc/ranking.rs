use super::{classify, round_2_decimals, MarkRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A roster entry as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub student_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub admission_no: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
    pub subject: String,
    pub total: f64,
    pub grade: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub student_id: String,
    pub display_name: Option<String>,
    pub admission_no: Option<String>,
    pub subject_count: usize,
    pub total_marks: f64,
    /// `None` for roster students with no marks yet.
    pub mean_score: Option<f64>,
    pub grade: Option<String>,
    pub subjects: Vec<SubjectMark>,
    /// 1 = best. `None` for placeholders.
    pub position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPerformance {
    pub roster_size: usize,
    pub ranked_count: usize,
    pub class_mean: Option<f64>,
    pub subject_means: BTreeMap<String, f64>,
    pub students: Vec<StudentPerformance>,
}

impl ClassPerformance {
    pub fn class_size(&self) -> usize {
        self.students.len()
    }

    pub fn student(&self, student_id: &str) -> Option<&StudentPerformance> {
        self.students.iter().find(|s| s.student_id == student_id)
    }
}

#[derive(Debug, Default)]
struct SubjectAccum {
    sum: f64,
    count: usize,
}

impl SubjectAccum {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        self.sum / (self.count as f64)
    }
}

/// One score per subject, records for the same subject averaged, in
/// first-seen order.
pub(super) fn subject_scores<'a, I>(records: I) -> Vec<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a MarkRecord>,
{
    let mut subjects: Vec<(&'a str, SubjectAccum)> = Vec::new();
    for r in records {
        match subjects.iter_mut().find(|(s, _)| *s == r.subject) {
            Some((_, acc)) => acc.push(r.total),
            None => {
                let mut acc = SubjectAccum::default();
                acc.push(r.total);
                subjects.push((r.subject.as_str(), acc));
            }
        }
    }
    subjects
        .into_iter()
        .map(|(name, acc)| (name, round_2_decimals(acc.mean())))
        .collect()
}

/// Per-student subject totals, subjects in first-seen order.
#[derive(Debug)]
struct StudentAccum<'a> {
    student_id: &'a str,
    subjects: Vec<(&'a str, SubjectAccum)>,
}

impl<'a> StudentAccum<'a> {
    fn push(&mut self, subject: &'a str, total: f64) {
        match self.subjects.iter_mut().find(|(s, _)| *s == subject) {
            Some((_, acc)) => acc.push(total),
            None => {
                let mut acc = SubjectAccum::default();
                acc.push(total);
                self.subjects.push((subject, acc));
            }
        }
    }
}

/// Builds a class snapshot from already-filtered mark records.
///
/// Several records for the same student and subject (e.g. more than one
/// exam type) are averaged into a single subject score first. Students are
/// ordered by descending mean with a stable sort, so equal means keep the
/// order in which their first record was encountered; positions run 1..N
/// with no gaps. Roster students without records follow as placeholders.
pub fn rank_class(records: &[MarkRecord], roster: &[StudentRef]) -> ClassPerformance {
    let mut by_student: Vec<StudentAccum<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for r in records {
        let i = *index.entry(r.student_id.as_str()).or_insert_with(|| {
            by_student.push(StudentAccum {
                student_id: r.student_id.as_str(),
                subjects: Vec::new(),
            });
            by_student.len() - 1
        });
        by_student[i].push(r.subject.as_str(), r.total);
    }

    let roster_by_id: HashMap<&str, &StudentRef> =
        roster.iter().map(|s| (s.student_id.as_str(), s)).collect();

    let mut subject_totals: BTreeMap<String, SubjectAccum> = BTreeMap::new();
    let mut ranked: Vec<StudentPerformance> = Vec::with_capacity(by_student.len());

    for acc in &by_student {
        let subjects: Vec<SubjectMark> = acc
            .subjects
            .iter()
            .map(|(name, s)| {
                let total = round_2_decimals(s.mean());
                let grade = classify(total);
                SubjectMark {
                    subject: name.to_string(),
                    total,
                    grade: grade.letter.to_string(),
                    points: grade.points,
                }
            })
            .collect();
        for s in &subjects {
            subject_totals
                .entry(s.subject.clone())
                .or_default()
                .push(s.total);
        }

        let total_marks: f64 = subjects.iter().map(|s| s.total).sum();
        let mean = round_2_decimals(total_marks / (subjects.len() as f64));
        let roster_entry = roster_by_id.get(acc.student_id);
        ranked.push(StudentPerformance {
            student_id: acc.student_id.to_string(),
            display_name: roster_entry.and_then(|s| s.display_name.clone()),
            admission_no: roster_entry.and_then(|s| s.admission_no.clone()),
            subject_count: subjects.len(),
            total_marks: round_2_decimals(total_marks),
            mean_score: Some(mean),
            grade: Some(classify(mean).letter.to_string()),
            subjects,
            position: None,
        });
    }

    // Vec::sort_by is stable.
    ranked.sort_by(|a, b| {
        let a_key = a.mean_score.unwrap_or(f64::MIN);
        let b_key = b.mean_score.unwrap_or(f64::MIN);
        b_key.total_cmp(&a_key)
    });
    for (i, s) in ranked.iter_mut().enumerate() {
        s.position = Some(i + 1);
    }

    // No class to average over without both a roster and records.
    let means: Vec<f64> = ranked.iter().filter_map(|s| s.mean_score).collect();
    let class_mean = if roster.is_empty() || records.is_empty() || means.is_empty() {
        None
    } else {
        Some(round_2_decimals(
            means.iter().sum::<f64>() / (means.len() as f64),
        ))
    };
    let ranked_count = ranked.len();

    let mut students = ranked;
    for s in roster {
        if index.contains_key(s.student_id.as_str()) {
            continue;
        }
        students.push(StudentPerformance {
            student_id: s.student_id.clone(),
            display_name: s.display_name.clone(),
            admission_no: s.admission_no.clone(),
            subject_count: 0,
            total_marks: 0.0,
            mean_score: None,
            grade: None,
            subjects: Vec::new(),
            position: None,
        });
    }

    ClassPerformance {
        roster_size: roster.len(),
        ranked_count,
        class_mean,
        subject_means: subject_totals
            .into_iter()
            .map(|(name, acc)| (name, round_2_decimals(acc.mean())))
            .collect(),
        students,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::test_record;

    fn roster(ids: &[&str]) -> Vec<StudentRef> {
        ids.iter()
            .map(|id| StudentRef {
                student_id: id.to_string(),
                display_name: Some(format!("Student {}", id)),
                admission_no: None,
            })
            .collect()
    }

    fn positions(cp: &ClassPerformance) -> Vec<(String, Option<usize>)> {
        cp.students
            .iter()
            .map(|s| (s.student_id.clone(), s.position))
            .collect()
    }

    #[test]
    fn ties_keep_encounter_order() {
        let records = vec![
            test_record("A", "Mathematics", 1, 2024, 90.0, true),
            test_record("B", "Mathematics", 1, 2024, 90.0, true),
            test_record("C", "Mathematics", 1, 2024, 70.0, true),
        ];
        let cp = rank_class(&records, &roster(&["A", "B", "C"]));
        assert_eq!(
            positions(&cp),
            vec![
                ("A".to_string(), Some(1)),
                ("B".to_string(), Some(2)),
                ("C".to_string(), Some(3)),
            ]
        );
    }

    #[test]
    fn tie_order_follows_records_not_roster() {
        let records = vec![
            test_record("B", "English", 1, 2024, 64.0, true),
            test_record("A", "English", 1, 2024, 64.0, true),
        ];
        let cp = rank_class(&records, &roster(&["A", "B"]));
        assert_eq!(cp.students[0].student_id, "B");
        assert_eq!(cp.students[1].student_id, "A");
    }

    #[test]
    fn higher_mean_ranks_first_regardless_of_order() {
        let records = vec![
            test_record("A", "Mathematics", 1, 2024, 40.0, true),
            test_record("A", "English", 1, 2024, 60.0, true),
            test_record("B", "Mathematics", 1, 2024, 80.0, true),
        ];
        let cp = rank_class(&records, &[]);
        assert_eq!(cp.students[0].student_id, "B");
        assert_eq!(cp.students[0].position, Some(1));
        let a = cp.student("A").expect("A");
        assert_eq!(a.position, Some(2));
        assert_eq!(a.total_marks, 100.0);
        assert_eq!(a.mean_score, Some(50.0));
        assert_eq!(a.grade.as_deref(), Some("C"));
        assert_eq!(a.subject_count, 2);
    }

    #[test]
    fn subject_mean_excludes_students_without_that_subject() {
        let records = vec![
            test_record("A", "Mathematics", 1, 2024, 85.5, true),
            test_record("B", "Mathematics", 1, 2024, 60.0, true),
            test_record("B", "Physics", 1, 2024, 40.0, true),
        ];
        let cp = rank_class(&records, &roster(&["A", "B", "C"]));
        assert_eq!(cp.subject_means.get("Mathematics"), Some(&72.75));
        assert_eq!(cp.subject_means.get("Physics"), Some(&40.0));
    }

    #[test]
    fn roster_students_without_marks_are_placeholders() {
        let records = vec![
            test_record("A", "Mathematics", 1, 2024, 85.5, true),
            test_record("B", "Mathematics", 1, 2024, 60.0, true),
        ];
        let cp = rank_class(&records, &roster(&["C", "A", "B"]));
        assert_eq!(cp.roster_size, 3);
        assert_eq!(cp.ranked_count, 2);
        assert_eq!(cp.class_size(), 3);
        assert_eq!(cp.subject_means.get("Mathematics"), Some(&72.75));
        assert_eq!(cp.class_mean, Some(72.75));

        let c = cp.students.last().expect("placeholder");
        assert_eq!(c.student_id, "C");
        assert_eq!(c.display_name.as_deref(), Some("Student C"));
        assert_eq!(c.mean_score, None);
        assert_eq!(c.position, None);
        assert!(c.subjects.is_empty());
    }

    #[test]
    fn duplicate_subject_records_are_averaged_once() {
        let mut mid = test_record("A", "Mathematics", 1, 2024, 50.0, true);
        mid.exam_type = "Mid Term".to_string();
        let records = vec![
            mid,
            test_record("A", "Mathematics", 1, 2024, 70.0, true),
            test_record("B", "Mathematics", 1, 2024, 90.0, true),
        ];
        let cp = rank_class(&records, &[]);
        let a = cp.student("A").expect("A");
        assert_eq!(a.subject_count, 1);
        assert_eq!(a.mean_score, Some(60.0));
        assert_eq!(cp.subject_means.get("Mathematics"), Some(&75.0));
    }

    #[test]
    fn empty_inputs_have_no_class_mean() {
        let cp = rank_class(&[], &[]);
        assert_eq!(cp.class_mean, None);
        assert!(cp.students.is_empty());
        assert!(cp.subject_means.is_empty());

        let cp = rank_class(&[], &roster(&["A"]));
        assert_eq!(cp.class_mean, None);
        assert_eq!(cp.students.len(), 1);
        assert_eq!(cp.ranked_count, 0);
    }

    #[test]
    fn empty_roster_reports_no_class_mean() {
        let records = vec![test_record("S1", "Mathematics", 1, 2024, 80.0, true)];
        let cp = rank_class(&records, &[]);
        assert_eq!(cp.class_mean, None);
        assert_eq!(cp.ranked_count, 1);
        assert_eq!(cp.students[0].mean_score, Some(80.0));
        assert_eq!(cp.students[0].position, Some(1));
        assert_eq!(cp.subject_means.get("Mathematics"), Some(&80.0));
    }

    #[test]
    fn students_missing_from_roster_are_still_ranked() {
        let records = vec![test_record("X", "Mathematics", 1, 2024, 55.0, true)];
        let cp = rank_class(&records, &roster(&["A"]));
        assert_eq!(cp.students[0].student_id, "X");
        assert_eq!(cp.students[0].display_name, None);
        assert_eq!(cp.students[0].position, Some(1));
        assert_eq!(cp.students[1].student_id, "A");
    }
}
