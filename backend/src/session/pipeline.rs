use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use shared::ClassificationResult;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::request::{RequestError, parse_request};
use crate::inference::{DecodeError, InferenceError, decode_image, format_predictions};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("Image decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Inference exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
    #[error("Worker failure: {0}")]
    Worker(String),
}

impl ProcessingError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ProcessingError::Request(_))
    }

    /// Text sent back in `{"error": ...}`.
    pub fn client_message(&self) -> String {
        match self {
            ProcessingError::Request(e) => e.client_message(),
            ProcessingError::Decode(_) => "Failed to decode image".to_string(),
            ProcessingError::Inference(InferenceError::NotLoaded) => "Model not loaded".to_string(),
            ProcessingError::DeadlineExceeded(_) => "Inference timed out".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// One session's slot for blocking work. A job abandoned at the deadline keeps
/// the slot until it finishes, so the session's next request waits for it.
#[derive(Debug, Clone)]
pub struct InFlight(Arc<Semaphore>);

impl InFlight {
    pub fn new() -> Self {
        Self(Arc::new(Semaphore::new(1)))
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles one request payload end to end.
///
/// Decode and inference run on the blocking pool while holding the session's
/// slot and an admission permit; waiting for both and the work itself are
/// bounded by the inference deadline.
pub async fn process_message(
    state: &AppState,
    in_flight: &InFlight,
    payload: &[u8],
) -> Result<ClassificationResult, ProcessingError> {
    let request = parse_request(payload)?;
    let model = state.model.get()?;
    let preprocess = state.preprocess.clone();
    let permits = state.limits.permits.clone();
    let slot = in_flight.0.clone();
    let threshold = request.threshold;
    let image = request.image;

    let work = async move {
        let slot = slot
            .acquire_owned()
            .await
            .map_err(|_| ProcessingError::Worker("session slot closed".to_string()))?;
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|_| ProcessingError::Worker("admission semaphore closed".to_string()))?;
        web::block(move || {
            let _held = (slot, permit);
            let tensor = decode_image(&image, &preprocess)?;
            let probabilities = model.classify(&tensor)?;
            Ok::<_, ProcessingError>(probabilities)
        })
        .await
        .map_err(|e| ProcessingError::Worker(e.to_string()))?
    };

    let deadline = state.limits.deadline;
    let probabilities = timeout(deadline, work)
        .await
        .map_err(|_| ProcessingError::DeadlineExceeded(deadline))??;

    Ok(format_predictions(
        &probabilities,
        &state.labels,
        threshold,
        state.limits.top_k,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::inference::{Classifier, ImageTensor, LabelTable, ModelSlot, PreprocessConfig};
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Vec<f32>);

    impl Classifier for Fixed {
        fn classify(&self, _input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    struct Slow(Duration);

    impl Classifier for Slow {
        fn classify(&self, _input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            std::thread::sleep(self.0);
            Ok(vec![1.0])
        }
    }

    fn state_with(model: ModelSlot, config: &ServerConfig) -> AppState {
        AppState::new(config, model, LabelTable::synthetic(), PreprocessConfig::default())
    }

    fn red_pixel_uri() -> String {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
    }

    fn request(image: &str, threshold: f32) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({"image": image, "threshold": threshold})).unwrap()
    }

    fn ten_classes() -> ModelSlot {
        ModelSlot::with_model(Arc::new(Fixed(vec![
            0.02, 0.3, 0.05, 0.2, 0.1, 0.08, 0.15, 0.04, 0.03, 0.03,
        ])))
    }

    #[actix_web::test]
    async fn zero_threshold_admits_all_top_k() {
        let state = state_with(ten_classes(), &ServerConfig::default());
        let result = process_message(&state, &InFlight::new(), &request(&red_pixel_uri(), 0.0))
            .await
            .unwrap();
        assert_eq!(result.total_predictions, 5);
        assert_eq!(result.filtered_predictions, result.total_predictions);
        assert_eq!(result.predictions[0].label, "class_1");
    }

    #[actix_web::test]
    async fn filtered_count_matches_threshold() {
        let state = state_with(ten_classes(), &ServerConfig::default());
        let result = process_message(&state, &InFlight::new(), &request(&red_pixel_uri(), 0.15))
            .await
            .unwrap();
        assert_eq!(result.filtered_predictions, 3);
        assert!(result.filtered_predictions <= result.total_predictions);
        assert!(result.predictions.iter().all(|p| p.score >= 0.15));
    }

    #[actix_web::test]
    async fn missing_model_is_reported() {
        let state = state_with(ModelSlot::new(), &ServerConfig::default());
        let err = process_message(&state, &InFlight::new(), &request(&red_pixel_uri(), 0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Inference(InferenceError::NotLoaded)));
        assert_eq!(err.client_message(), "Model not loaded");
    }

    #[actix_web::test]
    async fn undecodable_image_gets_generic_message() {
        let state = state_with(ten_classes(), &ServerConfig::default());
        let err = process_message(&state, &InFlight::new(), &request("data:image/png;base64,AAAA", 0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));
        assert!(!err.is_validation());
        assert_eq!(err.client_message(), "Failed to decode image");
    }

    #[actix_web::test]
    async fn validation_errors_echo_detail() {
        let state = state_with(ten_classes(), &ServerConfig::default());
        let err = process_message(&state, &InFlight::new(), br#"{"image": "", "threshold": 0.5}"#)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.client_message(), "Invalid or missing 'image' data");
    }

    /// Tracks how many calls run at once.
    struct Overlap {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Classifier for Overlap {
        fn classify(&self, _input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![1.0])
        }
    }

    #[actix_web::test]
    async fn timed_out_job_keeps_session_slot() {
        let config = ServerConfig {
            inference_timeout: Duration::from_millis(50),
            max_concurrent_inferences: 4,
            ..ServerConfig::default()
        };
        let model = Arc::new(Overlap {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let state = state_with(ModelSlot::with_model(model.clone()), &config);
        let in_flight = InFlight::new();

        for _ in 0..2 {
            let err = process_message(&state, &in_flight, &request(&red_pixel_uri(), 0.0))
                .await
                .unwrap_err();
            assert!(matches!(err, ProcessingError::DeadlineExceeded(_)));
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn slow_inference_hits_deadline() {
        let config = ServerConfig {
            inference_timeout: Duration::from_millis(50),
            ..ServerConfig::default()
        };
        let state = state_with(
            ModelSlot::with_model(Arc::new(Slow(Duration::from_millis(500)))),
            &config,
        );
        let err = process_message(&state, &InFlight::new(), &request(&red_pixel_uri(), 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::DeadlineExceeded(_)));
        assert_eq!(err.client_message(), "Inference timed out");
    }
}
