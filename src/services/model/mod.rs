// Model Provider
// Text classification capability and its process-wide load slot:
// - artifacts: resolves/downloads the tokenizer and ONNX model files
// - onnx: tokenizer + ONNX Runtime session producing [P(Human), P(AI)]

pub mod artifacts;
pub mod onnx;

use crate::models::LoadState;
use crate::services::config_store::ModelConfig;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

pub use artifacts::{ArtifactFetcher, ModelArtifacts};
pub use onnx::OnnxClassifier;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Model hub returned {status} for {url}")]
    HubStatus { status: u16, url: String },
    #[error("Model artifact not found: {0}")]
    MissingArtifact(String),
    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("ONNX Runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Invalid model configuration: {0}")]
    Config(String),
    #[error("Model loader task failed: {0}")]
    Join(String),
    #[error("Model already loaded")]
    AlreadyLoaded,
}

/// Given text, return `[P(Human), P(AI)]`.
///
/// Implementations must be pure functions of their input once constructed;
/// the same handle serves every request concurrently.
pub trait TextClassifier: Send + Sync {
    fn predict_probabilities(&self, text: &str) -> Result<[f32; 2], ModelError>;
}

/// One-time slot for the loaded classifier. Empty is `LOADING`, filled is `READY`.
#[derive(Default)]
pub struct ModelSlot {
    classifier: OnceLock<Arc<dyn TextClassifier>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, classifier: Arc<dyn TextClassifier>) -> Result<(), ModelError> {
        self.classifier
            .set(classifier)
            .map_err(|_| ModelError::AlreadyLoaded)
    }

    pub fn get(&self) -> Option<Arc<dyn TextClassifier>> {
        self.classifier.get().cloned()
    }

    pub fn state(&self) -> LoadState {
        if self.classifier.get().is_some() {
            LoadState::Ready
        } else {
            LoadState::Loading
        }
    }
}

/// Fetch artifacts, build the ONNX classifier off the async workers, then fill the slot.
pub async fn load_into(config: &ModelConfig, slot: &ModelSlot) -> Result<(), ModelError> {
    let t0 = Instant::now();
    info!(model = %config.name, revision = %config.revision, "model.fetch");

    let fetcher = ArtifactFetcher::new(config.clone())?;
    let artifacts = fetcher.fetch().await?;

    let model_config = config.clone();
    let classifier = tokio::task::spawn_blocking(move || OnnxClassifier::load(&model_config, &artifacts))
        .await
        .map_err(|e| ModelError::Join(e.to_string()))??;

    slot.install(Arc::new(classifier))?;
    info!(
        model = %config.name,
        load_ms = t0.elapsed().as_millis(),
        "model.loaded"
    );
    Ok(())
}
