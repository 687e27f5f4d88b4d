// AI Detector Core Services

pub mod config_store;
pub mod detection;
pub mod model;

pub use config_store::*;

pub use detection::{
    ai_score,
    classify_confidence,
    score_probabilities,
    DetectError,
    Detector,
};
pub use model::{load_into, ModelError, ModelSlot, OnnxClassifier, TextClassifier};
