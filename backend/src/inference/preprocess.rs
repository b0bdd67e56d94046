use base64::{Engine as _, engine::general_purpose::STANDARD};
use ndarray::Array4;

use super::config::PreprocessConfig;

/// Normalized model input with shape `(1, height, width, 3)`.
pub type ImageTensor = Array4<f32>;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Image payload is empty")]
    Empty,
    #[error("Unsupported data URI header: {0}")]
    UnsupportedDataUri(String),
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Unsupported or corrupt image: {0}")]
    Image(#[from] image::ImageError),
}

/// Strips an optional `data:<mime>;base64,` header and returns the base64 body.
pub fn strip_data_uri(payload: &str) -> Result<&str, DecodeError> {
    let payload = payload.trim();
    let Some(rest) = payload.strip_prefix("data:") else {
        return Ok(payload);
    };
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| DecodeError::UnsupportedDataUri(truncate(rest)))?;
    if !header.ends_with(";base64") {
        return Err(DecodeError::UnsupportedDataUri(header.to_string()));
    }
    Ok(body)
}

/// Runs the full decode pipeline: base64, image parse, RGB, resize, normalize.
pub fn decode_image(payload: &str, config: &PreprocessConfig) -> Result<ImageTensor, DecodeError> {
    let encoded = strip_data_uri(payload)?;
    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = STANDARD.decode(encoded)?;
    image_to_tensor(&bytes, config)
}

pub fn image_to_tensor(bytes: &[u8], config: &PreprocessConfig) -> Result<ImageTensor, DecodeError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = (config.width(), config.height());
    let resized = image::imageops::resize(
        &image,
        width,
        height,
        config.image.resize_method.filter(),
    );

    let mean = config.normalization.mean;
    let std = config.normalization.std;
    let mut tensor = Array4::<f32>::zeros((1, height as usize, width as usize, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            tensor[[0, y as usize, x as usize, channel]] = (value - mean[channel]) / std[channel];
        }
    }
    Ok(tensor)
}

fn truncate(value: &str) -> String {
    value.chars().take(32).collect()
}
