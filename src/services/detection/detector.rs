// Detector
// The detect operation: readiness gate -> classifier -> score + confidence

use super::confidence::{ai_score, classify_confidence};
use crate::models::{DetectResponse, LoadState};
use crate::services::model::{ModelError, ModelSlot};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum DetectError {
    /// The model is still loading; clients should retry later.
    #[error("Model loading")]
    ServiceNotReady,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Inference failed: {0}")]
    InferenceFailure(String),
}

impl From<ModelError> for DetectError {
    fn from(err: ModelError) -> Self {
        Self::InferenceFailure(err.to_string())
    }
}

#[derive(Clone)]
pub struct Detector {
    slot: Arc<ModelSlot>,
}

impl Detector {
    pub fn new(slot: Arc<ModelSlot>) -> Self {
        Self { slot }
    }

    pub fn state(&self) -> LoadState {
        self.slot.state()
    }

    /// Classify `text`. Fails with `ServiceNotReady` without touching the
    /// classifier while the model slot is empty.
    pub async fn detect(&self, text: String) -> Result<DetectResponse, DetectError> {
        let classifier = self.slot.get().ok_or(DetectError::ServiceNotReady)?;

        let t0 = Instant::now();
        let probs = tokio::task::spawn_blocking(move || classifier.predict_probabilities(&text))
            .await
            .map_err(|e| DetectError::InferenceFailure(format!("inference task failed: {e}")))??;

        let response = score_probabilities(probs)?;
        debug!(
            latency_ms = t0.elapsed().as_millis(),
            ai_score = response.ai_score,
            confidence = %response.confidence,
            "detect.scored"
        );
        Ok(response)
    }
}

/// Turn `[P(Human), P(AI)]` into the reported score and confidence
pub fn score_probabilities(probs: [f32; 2]) -> Result<DetectResponse, DetectError> {
    let p_ai = probs[1];
    if !p_ai.is_finite() || !(0.0..=1.0).contains(&p_ai) {
        warn!(p_ai, "detect.invalid_probability");
        return Err(DetectError::InferenceFailure(format!(
            "classifier returned invalid probability {p_ai}"
        )));
    }

    let score = ai_score(p_ai);
    Ok(DetectResponse {
        ai_score: score,
        confidence: classify_confidence(score),
    })
}
