use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use ndarray::Array4;

use super::config::PreprocessConfig;
use super::preprocess::ImageTensor;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model not loaded")]
    NotLoaded,
    #[error("Model already installed")]
    AlreadyLoaded,
    #[error("No model backend compiled in (enable the `torch` feature)")]
    BackendUnavailable,
    #[error("Model path not configured")]
    MissingModelPath,
    #[error("Failed to load model weights: {0}")]
    LoadFailed(String),
    #[error("Model produced an empty output")]
    EmptyOutput,
    #[error("Model execution failed: {0}")]
    ExecutionFailed(String),
}

/// The image-classification model boundary.
///
/// Implementations take a normalized `(1, H, W, 3)` tensor and return one
/// probability per class.
pub trait Classifier: Send + Sync {
    fn classify(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Write-once holder for the process-wide model handle.
#[derive(Default)]
pub struct ModelSlot {
    model: OnceLock<Arc<dyn Classifier>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<dyn Classifier>) -> Self {
        let slot = Self::new();
        let _ = slot.model.set(model);
        slot
    }

    pub fn install(&self, model: Arc<dyn Classifier>) -> Result<(), InferenceError> {
        self.model
            .set(model)
            .map_err(|_| InferenceError::AlreadyLoaded)
    }

    pub fn get(&self) -> Result<Arc<dyn Classifier>, InferenceError> {
        self.model.get().cloned().ok_or(InferenceError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }
}

/// Runs the model once on an all-zero input and returns the label-space size.
pub fn warm_up(model: &dyn Classifier, config: &PreprocessConfig) -> Result<usize, InferenceError> {
    let input = Array4::<f32>::zeros((1, config.height() as usize, config.width() as usize, 3));
    let output = model.classify(&input)?;
    if output.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }
    Ok(output.len())
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use std::sync::Mutex;

    use tch::{CModule, Device, Kind, TchError, Tensor};

    use super::{Classifier, ImageTensor, InferenceError, lock_recovering, softmax};

    /// TorchScript classifier. `CModule` is not `Sync`, hence the mutex.
    pub struct TorchClassifier {
        model: Mutex<CModule>,
        device: Device,
    }

    impl TorchClassifier {
        pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
            let device = Device::cuda_if_available();
            let model = CModule::load_on_device(model_path, device)
                .map_err(|e| InferenceError::LoadFailed(e.to_string()))?;
            log::info!("Loaded TorchScript model from {} on {:?}", model_path.display(), device);
            Ok(Self {
                model: Mutex::new(model),
                device,
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn classify(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            let shape: Vec<i64> = input.shape().iter().map(|d| *d as i64).collect();
            let data: Vec<f32> = input.iter().copied().collect();
            let tensor = Tensor::f_from_slice(&data)
                .and_then(|t| t.f_reshape(shape.as_slice()))
                .and_then(|t| t.f_permute([0, 3, 1, 2]))
                .and_then(|t| t.f_to_device_(self.device, Kind::Float, false, false))
                .map_err(execution_failed)?;

            let output = {
                let model = lock_recovering(&self.model);
                model.forward_ts(&[&tensor]).map_err(execution_failed)?
            };
            let output_flat = output
                .f_to_kind(Kind::Float)
                .and_then(|t| t.f_view([-1i64]))
                .map_err(execution_failed)?;
            let num_elements = output_flat.numel();
            let mut logits = vec![0.0f32; num_elements];
            output_flat
                .f_copy_data(&mut logits, num_elements)
                .map_err(execution_failed)?;
            Ok(softmax(&logits))
        }
    }

    fn execution_failed(e: TchError) -> InferenceError {
        InferenceError::ExecutionFailed(e.to_string())
    }
}

/// Locks a model handle, taking it back from a poisoned mutex. A failed forward
/// pass leaves no partial state in the module.
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether this build can load model weights at all.
pub fn backend_available() -> bool {
    cfg!(feature = "torch")
}

/// Loads the configured model backend.
pub fn load_classifier(model_path: Option<&Path>) -> Result<Arc<dyn Classifier>, InferenceError> {
    let model_path = model_path.ok_or(InferenceError::MissingModelPath)?;
    load_backend(model_path)
}

#[cfg(feature = "torch")]
fn load_backend(model_path: &Path) -> Result<Arc<dyn Classifier>, InferenceError> {
    Ok(Arc::new(TorchClassifier::load(model_path)?))
}

#[cfg(not(feature = "torch"))]
fn load_backend(model_path: &Path) -> Result<Arc<dyn Classifier>, InferenceError> {
    log::error!(
        "Cannot load {}: this build has no model backend",
        model_path.display()
    );
    Err(InferenceError::BackendUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uniform(usize);

    impl Classifier for Uniform {
        fn classify(&self, _input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![1.0 / self.0 as f32; self.0])
        }
    }

    #[test]
    fn slot_is_write_once() {
        let slot = ModelSlot::new();
        assert!(!slot.is_loaded());
        assert!(matches!(slot.get(), Err(InferenceError::NotLoaded)));

        slot.install(Arc::new(Uniform(3))).unwrap();
        assert!(slot.is_loaded());
        assert!(matches!(
            slot.install(Arc::new(Uniform(4))),
            Err(InferenceError::AlreadyLoaded)
        ));
    }

    #[test]
    fn warm_up_reports_label_space() {
        let config = PreprocessConfig::default();
        assert_eq!(warm_up(&Uniform(1000), &config).unwrap(), 1000);
        assert!(matches!(
            warm_up(&Uniform(0), &config),
            Err(InferenceError::EmptyOutput)
        ));
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn poisoned_model_lock_is_recovered() {
        let model = Arc::new(Mutex::new(Uniform(2)));
        let shared = model.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("forward pass failed");
        })
        .join();
        assert!(model.is_poisoned());

        let guard = lock_recovering(&model);
        let output = guard.classify(&Array4::zeros((1, 2, 2, 3))).unwrap();
        assert_eq!(output.len(), 2);
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn build_without_torch_cannot_load_weights() {
        assert!(!backend_available());
        assert!(matches!(
            load_classifier(Some(Path::new("model.pt"))),
            Err(InferenceError::BackendUnavailable)
        ));
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(matches!(
            load_classifier(None),
            Err(InferenceError::MissingModelPath)
        ));
    }
}
