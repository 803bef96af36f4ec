use super::{classify, round_2_decimals, CalcError, Grade};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const OPENING_WEIGHT: f64 = 0.15;
pub const MIDTERM_WEIGHT: f64 = 0.15;
pub const FINAL_WEIGHT: f64 = 0.70;

/// The three component scores of a mark, each out of 100 when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    pub opening: Option<f64>,
    pub midterm: Option<f64>,
    #[serde(rename = "final")]
    pub final_exam: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMark {
    pub total: f64,
    pub percentage: f64,
    pub grade: Grade,
}

impl ComponentScores {
    pub fn is_empty(&self) -> bool {
        self.opening.is_none() && self.midterm.is_none() && self.final_exam.is_none()
    }

    fn named(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("opening", self.opening),
            ("midterm", self.midterm),
            ("final", self.final_exam),
        ]
    }

    /// Every present component must be a finite number in `[0, 100]`.
    pub fn validate(&self) -> Result<(), CalcError> {
        for (name, value) in self.named() {
            let Some(v) = value else {
                continue;
            };
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(CalcError::new(
                    "bad_params",
                    format!("{} score must be between 0 and 100", name),
                )
                .with_details(json!({ "component": name, "value": v })));
            }
        }
        Ok(())
    }
}

/// Weighted total of the component scores, classified through the grade
/// table.
///
/// Absent components contribute 0; the weights are never re-normalized over
/// the components that are present. Percentage equals total because every
/// component is already expressed out of 100.
pub fn aggregate(scores: &ComponentScores) -> Result<AggregatedMark, CalcError> {
    scores.validate()?;

    let raw = OPENING_WEIGHT * scores.opening.unwrap_or(0.0)
        + MIDTERM_WEIGHT * scores.midterm.unwrap_or(0.0)
        + FINAL_WEIGHT * scores.final_exam.unwrap_or(0.0);
    let total = round_2_decimals(raw);

    Ok(AggregatedMark {
        total,
        percentage: total,
        grade: classify(total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(opening: Option<f64>, midterm: Option<f64>, final_exam: Option<f64>) -> ComponentScores {
        ComponentScores {
            opening,
            midterm,
            final_exam,
        }
    }

    #[test]
    fn weights_sum_to_one() {
        assert!((OPENING_WEIGHT + MIDTERM_WEIGHT + FINAL_WEIGHT - 1.0).abs() < 1e-12);
    }

    #[test]
    fn full_components_are_weighted() {
        let agg = aggregate(&scores(Some(80.0), Some(70.0), Some(90.0))).expect("aggregate");
        assert_eq!(agg.total, 85.5);
        assert_eq!(agg.percentage, 85.5);
        assert_eq!(agg.grade.letter, "A");
        assert_eq!(agg.grade.points, 12);
    }

    #[test]
    fn absent_components_count_as_zero() {
        let agg = aggregate(&scores(None, None, Some(50.0))).expect("aggregate");
        assert_eq!(agg.total, 35.0);
        assert_eq!(agg.grade.letter, "D");
        assert_eq!(agg.grade.points, 3);
    }

    #[test]
    fn opening_only_submission_is_a_low_provisional_total() {
        let agg = aggregate(&scores(Some(100.0), None, None)).expect("aggregate");
        assert_eq!(agg.total, 15.0);
        assert_eq!(agg.grade.letter, "E");
    }

    #[test]
    fn nothing_submitted_is_zero_e() {
        let agg = aggregate(&ComponentScores::default()).expect("aggregate");
        assert_eq!(agg.total, 0.0);
        assert_eq!(agg.grade.letter, "E");
        assert!(ComponentScores::default().is_empty());
    }

    #[test]
    fn total_is_rounded_to_two_decimals() {
        let agg = aggregate(&scores(Some(12.34), None, Some(61.11))).expect("aggregate");
        // 1.851 + 42.777
        assert_eq!(agg.total, 44.63);
        assert_eq!(agg.grade.letter, "D+");
    }

    #[test]
    fn out_of_range_component_is_a_validation_error() {
        let e = aggregate(&scores(Some(101.0), None, Some(50.0))).unwrap_err();
        assert_eq!(e.code, "bad_params");
        assert_eq!(
            e.details.as_ref().and_then(|d| d.get("component")).and_then(|v| v.as_str()),
            Some("opening")
        );

        let e = aggregate(&scores(None, Some(-0.5), None)).unwrap_err();
        assert_eq!(e.code, "bad_params");

        assert!(aggregate(&scores(None, None, Some(f64::NAN))).is_err());
    }

    #[test]
    fn boundary_components_are_accepted() {
        let agg = aggregate(&scores(Some(0.0), Some(100.0), Some(100.0))).expect("aggregate");
        assert_eq!(agg.total, 85.0);
    }
}
