// Confidence utilities
// Converts P(AI) into the reported percentage and its confidence bucket.

use crate::models::Confidence;

/// Scores above this or below `HIGH_LOWER` are `high`.
const HIGH_UPPER: f64 = 80.0;
const HIGH_LOWER: f64 = 20.0;
const MEDIUM_UPPER: f64 = 60.0;
const MEDIUM_LOWER: f64 = 40.0;

/// Round to two decimal places, ties to even
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// `round(p_ai * 100, 2)`, clamped to [0, 100]
pub fn ai_score(p_ai: f32) -> f64 {
    round2(f64::from(p_ai) * 100.0).clamp(0.0, 100.0)
}

/// Ordered checks; the first matching branch wins.
///
/// The `high` and `medium` conditions overlap (85 satisfies both `> 80` and
/// `> 60`), so evaluation order decides the label. Effective bands:
/// `high` outside [20, 80], `medium` in [20, 40) and (60, 80], `low` in [40, 60].
pub fn classify_confidence(score: f64) -> Confidence {
    if score > HIGH_UPPER || score < HIGH_LOWER {
        Confidence::High
    } else if score > MEDIUM_UPPER || score < MEDIUM_LOWER {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}
