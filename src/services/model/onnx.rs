// ONNX Classifier
// Tokenizer + ONNX Runtime session for a two-class sequence classifier

use super::{ModelArtifacts, ModelError, TextClassifier};
use crate::services::config_store::ModelConfig;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

pub struct OnnxClassifier {
    tokenizer: Tokenizer,
    // ort sessions need exclusive access to run
    session: Mutex<Session>,
    input_names: Vec<String>,
    ai_class_index: usize,
}

impl OnnxClassifier {
    pub fn load(config: &ModelConfig, artifacts: &ModelArtifacts) -> Result<Self, ModelError> {
        if config.ai_class_index > 1 {
            return Err(ModelError::Config(format!(
                "aiClassIndex must be 0 or 1, got {}",
                config.ai_class_index
            )));
        }
        if config.max_length == 0 {
            return Err(ModelError::Config("maxLength must be positive".to_string()));
        }

        let tokenizer = load_tokenizer(&artifacts.tokenizer_path, config.max_length)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads.max(1))?
            .commit_from_file(&artifacts.model_path)?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        for name in &input_names {
            if !matches!(name.as_str(), "input_ids" | "attention_mask" | "token_type_ids") {
                return Err(ModelError::Config(format!("unsupported model input '{name}'")));
            }
        }
        info!(inputs = ?input_names, max_length = config.max_length, "onnx.session.ready");

        Ok(Self {
            tokenizer,
            session: Mutex::new(session),
            input_names,
            ai_class_index: config.ai_class_index,
        })
    }

    fn logits(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect();
        let len = ids.len();
        debug!(tokens = len, "onnx.encoded");

        let mut inputs: Vec<(String, SessionInputValue<'static>)> = Vec::with_capacity(self.input_names.len());
        for name in &self.input_names {
            let values = match name.as_str() {
                "input_ids" => ids.clone(),
                "attention_mask" => mask.clone(),
                _ => vec![0; len],
            };
            let tensor = Tensor::from_array((vec![1usize, len], values.into_boxed_slice()))?;
            inputs.push((name.clone(), tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::Output("session lock poisoned".to_string()))?;
        let outputs = session.run(inputs)?;
        let logits: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        Ok(logits)
    }
}

impl TextClassifier for OnnxClassifier {
    fn predict_probabilities(&self, text: &str) -> Result<[f32; 2], ModelError> {
        let logits = self.logits(text)?;
        order_classes(&softmax(&logits), self.ai_class_index)
    }
}

/// Tokenizer that keeps only the first `max_length` tokens, unpadded
pub fn load_tokenizer(path: &Path, max_length: usize) -> Result<Tokenizer, ModelError> {
    let mut tokenizer = Tokenizer::from_file(path).map_err(|e| ModelError::Tokenizer(e.to_string()))?;
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Arrange a two-class distribution as `[P(Human), P(AI)]`
pub fn order_classes(probs: &[f32], ai_class_index: usize) -> Result<[f32; 2], ModelError> {
    match (probs, ai_class_index) {
        ([first, second], 1) => Ok([*first, *second]),
        ([first, second], 0) => Ok([*second, *first]),
        ([_, _], idx) => Err(ModelError::Config(format!("aiClassIndex {idx} out of range"))),
        _ => Err(ModelError::Output(format!(
            "expected 2 class logits, got {}",
            probs.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {"type": "WordLevel", "vocab": {"[UNK]": 0, "word": 1}, "unk_token": "[UNK]"}
    }"#;

    fn word_level_tokenizer(max_length: usize) -> Tokenizer {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORD_LEVEL_TOKENIZER).unwrap();
        load_tokenizer(&path, max_length).unwrap()
    }

    #[test]
    fn test_long_input_is_truncated() {
        let tokenizer = word_level_tokenizer(512);
        let text = "word ".repeat(1000);
        let encoding = tokenizer.encode(text.as_str(), true).unwrap();
        assert_eq!(encoding.get_ids().len(), 512);
        assert_eq!(encoding.get_attention_mask().len(), 512);
    }

    #[test]
    fn test_short_input_is_not_padded() {
        let tokenizer = word_level_tokenizer(512);
        let encoding = tokenizer.encode("word word word", true).unwrap();
        assert_eq!(encoding.get_ids(), &[1, 1, 1]);
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tokenizer(&dir.path().join("absent.json"), 512).unwrap_err();
        assert!(matches!(err, ModelError::Tokenizer(_)));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[2.0, -1.0]);
        assert_eq!(probs.len(), 2);
        assert!((probs[0] + probs[1] - 1.0).abs() < 1e-6);
        assert!(probs[0] > probs[1]);
    }

    #[test]
    fn test_softmax_large_logits_stay_finite() {
        let probs = softmax(&[1000.0, 998.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!((probs[0] + probs[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_equal_logits() {
        let probs = softmax(&[0.3, 0.3]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_order_classes_default_index() {
        assert_eq!(order_classes(&[0.2, 0.8], 1).unwrap(), [0.2, 0.8]);
    }

    #[test]
    fn test_order_classes_swapped_index() {
        assert_eq!(order_classes(&[0.2, 0.8], 0).unwrap(), [0.8, 0.2]);
    }

    #[test]
    fn test_order_classes_rejects_wrong_arity() {
        assert!(matches!(order_classes(&[0.1, 0.2, 0.7], 1), Err(ModelError::Output(_))));
        assert!(matches!(order_classes(&[], 1), Err(ModelError::Output(_))));
    }
}
