// Detection Module
// AI text detection core logic:
// - confidence: percentage score and ordered confidence buckets
// - detector: readiness-gated detect operation over the loaded classifier

pub mod confidence;
pub mod detector;

pub use confidence::{ai_score, classify_confidence, round2};
pub use detector::{score_probabilities, DetectError, Detector};
