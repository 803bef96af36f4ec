use super::{classify, round_2_decimals, MarkRecord, GRADE_BANDS};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeCount {
    pub letter: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject: String,
    pub count: usize,
    pub mean: f64,
    pub highest: f64,
    pub lowest: f64,
    /// One entry per grade band, highest first, zero counts included.
    pub grade_distribution: Vec<GradeCount>,
}

/// Per-subject statistics over individual mark records, sorted by subject.
pub fn subject_stats(records: &[MarkRecord]) -> Vec<SubjectStats> {
    let mut by_subject: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in records {
        by_subject.entry(r.subject.as_str()).or_default().push(r.total);
    }

    by_subject
        .into_iter()
        .map(|(subject, totals)| {
            let mut grade_distribution: Vec<GradeCount> = GRADE_BANDS
                .iter()
                .map(|b| GradeCount {
                    letter: b.letter,
                    count: 0,
                })
                .collect();
            for t in &totals {
                let letter = classify(*t).letter;
                if let Some(slot) = grade_distribution.iter_mut().find(|g| g.letter == letter) {
                    slot.count += 1;
                }
            }
            let highest = totals.iter().copied().fold(f64::MIN, f64::max);
            let lowest = totals.iter().copied().fold(f64::MAX, f64::min);
            SubjectStats {
                subject: subject.to_string(),
                count: totals.len(),
                mean: round_2_decimals(totals.iter().sum::<f64>() / (totals.len() as f64)),
                highest,
                lowest,
                grade_distribution,
            }
        })
        .collect()
}
