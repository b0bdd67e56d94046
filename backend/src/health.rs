use chrono::{SecondsFormat, Utc};
use shared::{HealthStatus, ServiceStatus};

use crate::inference::ModelSlot;

/// Reads readiness from the model slot. Never triggers loading.
pub fn report(model: &ModelSlot) -> HealthStatus {
    let model_loaded = model.is_loaded();
    HealthStatus {
        status: if model_loaded {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        },
        model_loaded,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Classifier, ImageTensor, InferenceError};
    use std::sync::Arc;

    struct Noop;

    impl Classifier for Noop {
        fn classify(&self, _input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![1.0])
        }
    }

    #[test]
    fn reflects_model_state() {
        let slot = ModelSlot::new();
        let before = report(&slot);
        assert!(!before.model_loaded);
        assert_eq!(before.status, ServiceStatus::Unhealthy);

        slot.install(Arc::new(Noop)).unwrap();
        let after = report(&slot);
        assert!(after.model_loaded);
        assert!(after.is_healthy());
        assert!(chrono::DateTime::parse_from_rfc3339(&after.timestamp).is_ok());
    }
}
