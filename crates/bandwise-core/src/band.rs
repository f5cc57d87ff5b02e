//! Overall band aggregation.
//!
//! The overall band is the mean of the four criterion bands, rounded to a
//! half band: a mean ending in .25 rounds down, one ending in .75 rounds up,
//! anything else goes to the nearest half. Everything is computed in integer
//! half-band units so no floating point comparison is involved.

use serde::{Deserialize, Serialize};

use crate::model::{AssessmentResult, Band};

/// The rounding rule, verbatim as given to the examiner model.
pub const ROUNDING_RULE: &str = "The overall band is the arithmetic mean of the four criterion bands. \
If the mean ends in .25, round DOWN to the nearest half band (e.g. 7.25 becomes 7.0). \
If the mean ends in .75, round UP to the nearest half band (e.g. 6.75 becomes 7.0). \
Otherwise round to the nearest half band (e.g. 6.5 stays 6.5, 6.0 stays 6.0).";

/// Aggregate four criterion bands into an overall band.
pub fn aggregate_bands(bands: [Band; 4]) -> Band {
    // Mean in bands is sum_half / 8; `eighths` is its fractional part in 1/8 band.
    let sum_half: u32 = bands.iter().map(|b| u32::from(b.half_steps())).sum();
    let whole = sum_half / 8;
    let eighths = sum_half % 8;

    let extra_half_steps = match eighths {
        // .0, .125, .25 (the .25 case rounds down)
        0..=2 => 0,
        // .375, .5, .625
        3..=5 => 1,
        // .75 rounds up, .875 is nearest to the next whole band
        _ => 2,
    };

    let half_steps = whole * 2 + extra_half_steps;
    Band::from_half_steps(half_steps as u8).unwrap_or(Band::MAX)
}

/// Mean of the four bands as a plain number, for display.
pub fn mean_band(bands: [Band; 4]) -> f64 {
    bands.iter().map(|b| b.value()).sum::<f64>() / 4.0
}

/// A disagreement between the generator's overall band and the rounding rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandDiscrepancy {
    /// The band the generator reported (kept as authoritative).
    pub reported: Band,
    /// The band the rounding rule produces from the criterion bands.
    pub computed: Band,
    /// Unrounded mean of the criterion bands.
    pub mean: f64,
}

/// Recompute the overall band of a validated result and report a mismatch.
///
/// The reported band is never corrected; discrepancies are logged for operators.
pub fn cross_check(result: &AssessmentResult) -> Option<BandDiscrepancy> {
    let bands = result.criteria_bands().as_array();
    let computed = aggregate_bands(bands);
    if computed == result.overall_band {
        return None;
    }

    let discrepancy = BandDiscrepancy {
        reported: result.overall_band,
        computed,
        mean: mean_band(bands),
    };
    tracing::warn!(
        reported = %discrepancy.reported,
        computed = %discrepancy.computed,
        mean = discrepancy.mean,
        task = %result.task_type,
        "overall band disagrees with criterion bands"
    );
    Some(discrepancy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands(values: [f64; 4]) -> [Band; 4] {
        values.map(|v| Band::from_f64(v).unwrap())
    }

    fn overall(values: [f64; 4]) -> f64 {
        aggregate_bands(bands(values)).value()
    }

    #[test]
    fn reference_vectors() {
        assert_eq!(overall([6.0, 6.0, 7.0, 7.0]), 6.5);
        assert_eq!(overall([6.0, 7.0, 7.0, 7.0]), 7.0);
        assert_eq!(overall([5.0, 6.0, 6.0, 7.0]), 6.0);
        assert_eq!(overall([7.0, 7.0, 7.0, 8.0]), 7.0);
    }

    #[test]
    fn quarter_rounds_down_three_quarters_rounds_up() {
        // 6.25
        assert_eq!(overall([6.0, 6.0, 6.0, 7.0]), 6.0);
        // 5.75
        assert_eq!(overall([5.0, 6.0, 6.0, 6.0]), 6.0);
    }

    #[test]
    fn eighths_round_to_nearest_half() {
        // 6.125
        assert_eq!(overall([6.0, 6.0, 6.0, 6.5]), 6.0);
        // 6.375
        assert_eq!(overall([6.0, 6.0, 6.5, 7.0]), 6.5);
        // 6.625
        assert_eq!(overall([6.5, 6.5, 6.5, 7.0]), 6.5);
        // 6.875
        assert_eq!(overall([6.5, 7.0, 7.0, 7.0]), 7.0);
    }

    #[test]
    fn every_valid_tuple_lands_on_a_scored_band() {
        let scored: Vec<Band> = (8..=18).filter_map(Band::from_half_steps).collect();
        for &a in &scored {
            for &b in &scored {
                for &c in &scored {
                    for &d in &scored {
                        let first = aggregate_bands([a, b, c, d]);
                        assert!(first.is_scored(), "{a} {b} {c} {d} -> {first}");
                        assert_eq!(first, aggregate_bands([a, b, c, d]));
                        let lo = *[a, b, c, d].iter().min().unwrap();
                        let hi = *[a, b, c, d].iter().max().unwrap();
                        assert!(lo <= first && first <= hi);
                    }
                }
            }
        }
    }

    #[test]
    fn order_does_not_matter() {
        assert_eq!(
            aggregate_bands(bands([8.0, 5.5, 7.0, 6.0])),
            aggregate_bands(bands([5.5, 6.0, 7.0, 8.0]))
        );
    }
}
