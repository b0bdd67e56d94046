pub mod config;
pub mod driver;
pub mod encode;
pub mod error;

pub use config::ClientConfig;
pub use driver::RetryDriver;
pub use encode::{EncodedImage, encode_image_file};
pub use error::ClientError;
