use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub lower: f64,
    pub upper: f64,
    pub letter: &'static str,
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Grade {
    pub letter: &'static str,
    pub points: i64,
}

const fn band(lower: f64, upper: f64, letter: &'static str, points: i64) -> GradeBand {
    GradeBand {
        lower,
        upper,
        letter,
        points,
    }
}

/// Highest band first.
///
/// | Range  | Grade | Points |
/// |--------|-------|--------|
/// | 80-100 | A     | 12     |
/// | 75-79  | A-    | 11     |
/// | 70-74  | B+    | 10     |
/// | 65-69  | B     | 9      |
/// | 60-64  | B-    | 8      |
/// | 55-59  | C+    | 7      |
/// | 50-54  | C     | 6      |
/// | 45-49  | C-    | 5      |
/// | 40-44  | D+    | 4      |
/// | 35-39  | D     | 3      |
/// | 30-34  | D-    | 2      |
/// | 0-29   | E     | 1      |
pub static GRADE_BANDS: [GradeBand; 12] = [
    band(80.0, 100.0, "A", 12),
    band(75.0, 79.0, "A-", 11),
    band(70.0, 74.0, "B+", 10),
    band(65.0, 69.0, "B", 9),
    band(60.0, 64.0, "B-", 8),
    band(55.0, 59.0, "C+", 7),
    band(50.0, 54.0, "C", 6),
    band(45.0, 49.0, "C-", 5),
    band(40.0, 44.0, "D+", 4),
    band(35.0, 39.0, "D", 3),
    band(30.0, 34.0, "D-", 2),
    band(0.0, 29.0, "E", 1),
];

impl GradeBand {
    fn grade(&self) -> Grade {
        Grade {
            letter: self.letter,
            points: self.points,
        }
    }
}

fn highest_band() -> &'static GradeBand {
    &GRADE_BANDS[0]
}

fn lowest_band() -> &'static GradeBand {
    &GRADE_BANDS[GRADE_BANDS.len() - 1]
}

/// Maps a percentage onto the grade table. Never fails.
///
/// Each band owns everything from its lower bound up to the next band's
/// lower bound, so fractional totals such as 79.5 land in A- instead of
/// falling between 79 and 80. Values above 100 get the top band; negative
/// values and NaN get E.
pub fn classify(percentage: f64) -> Grade {
    if percentage.is_nan() {
        return lowest_band().grade();
    }
    if percentage > highest_band().upper {
        return highest_band().grade();
    }
    GRADE_BANDS
        .iter()
        .find(|b| percentage >= b.lower)
        .unwrap_or_else(lowest_band)
        .grade()
}

/// Reverse lookup of a letter's points. Unknown letters score the minimum (1).
pub fn points_for(letter: &str) -> i64 {
    let wanted = letter.trim();
    GRADE_BANDS
        .iter()
        .find(|b| b.letter.eq_ignore_ascii_case(wanted))
        .map(|b| b.points)
        .unwrap_or(lowest_band().points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_cover_zero_to_hundred_without_gaps() {
        for pair in GRADE_BANDS.windows(2) {
            assert_eq!(pair[1].upper + 1.0, pair[0].lower);
            assert_eq!(pair[1].points + 1, pair[0].points);
        }
        assert_eq!(highest_band().upper, 100.0);
        assert_eq!(lowest_band().lower, 0.0);
    }

    #[test]
    fn every_integer_percentage_lands_in_its_own_band() {
        for p in 0..=100 {
            let p = p as f64;
            let grade = classify(p);
            let owning: Vec<&GradeBand> = GRADE_BANDS
                .iter()
                .filter(|b| p >= b.lower && p <= b.upper)
                .collect();
            assert_eq!(owning.len(), 1, "exactly one band must contain {}", p);
            assert_eq!(grade.letter, owning[0].letter, "percentage {}", p);
        }
    }

    #[test]
    fn boundaries_switch_at_lower_bounds() {
        assert_eq!(classify(80.0).letter, "A");
        assert_eq!(classify(79.0).letter, "A-");
        assert_eq!(classify(79.99).letter, "A-");
        assert_eq!(classify(60.0).letter, "B-");
        assert_eq!(classify(59.0).letter, "C+");
        assert_eq!(classify(35.0), Grade { letter: "D", points: 3 });
        assert_eq!(classify(34.5).letter, "D-");
        assert_eq!(classify(30.0).letter, "D-");
        assert_eq!(classify(29.99).letter, "E");
        assert_eq!(classify(0.0), Grade { letter: "E", points: 1 });
    }

    #[test]
    fn out_of_range_degrades_to_extreme_bands() {
        assert_eq!(classify(-5.0), Grade { letter: "E", points: 1 });
        assert_eq!(classify(150.0), Grade { letter: "A", points: 12 });
        assert_eq!(classify(f64::NAN).letter, "E");
        assert_eq!(classify(f64::INFINITY).letter, "A");
        assert_eq!(classify(f64::NEG_INFINITY).letter, "E");
    }

    #[test]
    fn points_for_round_trips_every_band() {
        for b in GRADE_BANDS.iter() {
            let g = classify(b.lower);
            assert_eq!(points_for(g.letter), g.points);
            let g = classify(b.upper);
            assert_eq!(points_for(g.letter), g.points);
        }
    }

    #[test]
    fn points_for_unknown_letter_is_minimum() {
        assert_eq!(points_for("Z"), 1);
        assert_eq!(points_for(""), 1);
        assert_eq!(points_for("A+"), 1);
        assert_eq!(points_for(" b+ "), 10);
    }
}
