use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::ServerConfig;
use crate::inference::{LabelTable, ModelSlot, PreprocessConfig};
use crate::session::origin::OriginGate;

/// Bounds on per-request work.
#[derive(Debug, Clone)]
pub struct InferenceLimits {
    pub top_k: usize,
    pub deadline: Duration,
    pub max_message_bytes: usize,
    pub permits: Arc<Semaphore>,
}

impl InferenceLimits {
    pub fn new(top_k: usize, deadline: Duration, max_message_bytes: usize, max_concurrent: usize) -> Self {
        Self {
            top_k,
            deadline,
            max_message_bytes,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }
}

/// Process-wide state shared by every session. Built once at startup; only the
/// model slot is filled in afterwards, exactly once.
pub struct AppState {
    pub model: ModelSlot,
    pub labels: LabelTable,
    pub preprocess: PreprocessConfig,
    pub origins: OriginGate,
    pub limits: InferenceLimits,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        model: ModelSlot,
        labels: LabelTable,
        preprocess: PreprocessConfig,
    ) -> Self {
        Self {
            model,
            labels,
            preprocess,
            origins: OriginGate::new(&config.allowed_origins, !config.require_origin),
            limits: InferenceLimits::new(
                config.top_k,
                config.inference_timeout,
                config.max_message_bytes,
                config.max_concurrent_inferences,
            ),
        }
    }
}
