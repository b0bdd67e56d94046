pub mod config;
pub mod formatter;
pub mod labels;
pub mod model;
pub mod preprocess;

pub use config::PreprocessConfig;
pub use formatter::format_predictions;
pub use labels::LabelTable;
pub use model::{Classifier, InferenceError, ModelSlot};
pub use preprocess::{DecodeError, ImageTensor, decode_image};
