pub mod handler;
pub mod origin;
pub mod pipeline;
pub mod request;

pub use handler::{ClassificationSession, LastActivity, SessionState};
pub use origin::{OriginDecision, OriginGate};
pub use pipeline::{InFlight, ProcessingError, process_message};
