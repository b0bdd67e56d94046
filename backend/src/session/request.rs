use serde_json::Value;
use shared::ClassificationRequest;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid JSON payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Request must be a JSON object")]
    NotAnObject,
    #[error("Invalid or missing 'image' data")]
    MissingImage,
    #[error("Invalid 'threshold' value: {0}")]
    InvalidThreshold(String),
    #[error("'threshold' must be between 0 and 1, got {0}")]
    ThresholdOutOfRange(f64),
}

impl RequestError {
    /// Text sent back to the caller. Parser internals stay in the log.
    pub fn client_message(&self) -> String {
        match self {
            RequestError::Malformed(_) => "Invalid JSON payload".to_string(),
            other => other.to_string(),
        }
    }
}

/// Parses one inbound frame into a validated request.
///
/// `image` must be a non-empty string. `threshold` defaults to 0, may be a
/// number or a numeric string, and must lie in `[0, 1]`. Other keys are ignored.
pub fn parse_request(payload: &[u8]) -> Result<ClassificationRequest, RequestError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(mut fields) = value else {
        return Err(RequestError::NotAnObject);
    };

    let image = match fields.remove("image") {
        Some(Value::String(image)) if !image.trim().is_empty() => image,
        _ => return Err(RequestError::MissingImage),
    };

    let threshold = match fields.remove("threshold") {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| RequestError::InvalidThreshold(n.to_string()))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| RequestError::InvalidThreshold(s.clone()))?,
        Some(other) => return Err(RequestError::InvalidThreshold(other.to_string())),
    };
    if !(0.0..=1.0).contains(&threshold) {
        return Err(RequestError::ThresholdOutOfRange(threshold));
    }

    let timestamp = match fields.remove("timestamp") {
        Some(Value::String(ts)) => Some(ts),
        _ => None,
    };

    Ok(ClassificationRequest {
        image,
        threshold: threshold as f32,
        timestamp,
    })
}
