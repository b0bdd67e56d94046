use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Message sent by a client on an open session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClassificationRequest {
    /// Base64 image, optionally prefixed with a `data:<mime>;base64,` header.
    pub image: String,
    pub threshold: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionItem {
    pub label: String,
    pub score: f32,
}

/// Predictions above the requested threshold, ordered by descending score.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    pub predictions: Vec<PredictionItem>,
    pub total_predictions: usize,
    pub filtered_predictions: usize,
}

impl ClassificationResult {
    pub fn new(predictions: Vec<PredictionItem>, total_predictions: usize) -> Self {
        let filtered_predictions = predictions.len();
        Self {
            predictions,
            total_predictions,
            filtered_predictions,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Anything the server can send back on a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    Result(ClassificationResult),
    Error(ErrorResponse),
}

impl From<ClassificationResult> for ServerMessage {
    fn from(result: ClassificationResult) -> Self {
        ServerMessage::Result(result)
    }
}

impl From<ErrorResponse> for ServerMessage {
    fn from(error: ErrorResponse) -> Self {
        ServerMessage::Error(error)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub model_loaded: bool,
    pub timestamp: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Static acknowledgment for the session preflight.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PreflightAck {
    pub message: String,
}
