use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum Label {
    #[serde(rename = "Not Infected")]
    #[strum(serialize = "Not Infected")]
    NotInfected,
    #[serde(rename = "Infected")]
    #[strum(serialize = "Infected")]
    Infected,
}

/// Class order of the softmax head: index 0 is "Not Infected", index 1 is "Infected".
pub const CLASS_LABELS: [Label; 2] = [Label::NotInfected, Label::Infected];

/// Outcome of one classification. Serialized as `{"result": ..., "probability": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "result")]
    label: Label,
    #[serde(rename = "probability")]
    confidence: f32,
}

impl PredictionResult {
    pub fn new(label: Label, confidence: f32) -> Self {
        Self { label, confidence }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub model_path: String,
}
