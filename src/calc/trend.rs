use super::{round_2_decimals, validate_term, CalcError, MarkRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermMean {
    pub term: i64,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTrend {
    pub term_means: Vec<TermMean>,
    pub trend: Option<TrendDirection>,
    pub percentage_change: Option<f64>,
}

/// Classifies a year's trajectory from first to last term.
///
/// `term_means` must be strictly ascending by term. Fewer than two terms
/// leaves both the label and the change unset; a first-term mean of 0
/// leaves only the change unset.
pub fn analyze_trend(term_means: &[TermMean]) -> Result<PerformanceTrend, CalcError> {
    for t in term_means {
        validate_term(t.term)?;
    }
    if term_means.windows(2).any(|w| w[0].term >= w[1].term) {
        return Err(CalcError::new(
            "bad_params",
            "term means must be ordered by ascending term",
        )
        .with_details(json!({
            "terms": term_means.iter().map(|t| t.term).collect::<Vec<_>>()
        })));
    }

    let (first, last) = match (term_means.first(), term_means.last()) {
        (Some(first), Some(last)) if term_means.len() >= 2 => (first.mean_score, last.mean_score),
        _ => {
            return Ok(PerformanceTrend {
                term_means: term_means.to_vec(),
                trend: None,
                percentage_change: None,
            })
        }
    };

    let trend = if last > first {
        TrendDirection::Improving
    } else if last < first {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };
    let percentage_change = if first == 0.0 {
        None
    } else {
        Some(round_2_decimals((last - first) / first * 100.0))
    };

    Ok(PerformanceTrend {
        term_means: term_means.to_vec(),
        trend: Some(trend),
        percentage_change,
    })
}

/// Groups one student's records for a year into per-term means, ascending
/// by term. Within a term, records for the same subject are averaged first
/// so each subject counts once.
pub fn term_means(records: &[MarkRecord], student_id: &str, year: i64) -> Vec<TermMean> {
    let mut by_term: BTreeMap<i64, BTreeMap<&str, (f64, usize)>> = BTreeMap::new();
    for r in records
        .iter()
        .filter(|r| r.student_id == student_id && r.year == year)
    {
        let entry = by_term
            .entry(r.term)
            .or_default()
            .entry(r.subject.as_str())
            .or_insert((0.0, 0));
        entry.0 += r.total;
        entry.1 += 1;
    }

    by_term
        .into_iter()
        .filter(|(_, subjects)| !subjects.is_empty())
        .map(|(term, subjects)| {
            let sum: f64 = subjects
                .values()
                .map(|(sum, count)| sum / (*count as f64))
                .sum();
            TermMean {
                term,
                mean_score: round_2_decimals(sum / (subjects.len() as f64)),
            }
        })
        .collect()
}
