// AI Detector Data Models
// Request/response payloads of the HTTP surface

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SERVICE_MESSAGE: &str = "AI Text Detector API";

// ============ Detection Request ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub text: String,
}

// ============ Detection Response ============

/// Coarse bucket derived from the AI score.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Percentage in [0, 100], two decimals.
    pub ai_score: f64,
    pub confidence: Confidence,
}

// ============ Service Info ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

impl Default for RootResponse {
    fn default() -> Self {
        Self {
            message: SERVICE_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Loading,
    Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: LoadState,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
