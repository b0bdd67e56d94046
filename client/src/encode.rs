use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Side length of the square image sent to the backend.
pub const UPLOAD_SIZE: u32 = 256;
pub const JPEG_QUALITY: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("File size {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("Failed to process image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data_uri: String,
    /// Dimensions before resizing.
    pub original_size: (u32, u32),
}

pub fn encode_image_file(path: &Path, max_bytes: u64) -> Result<EncodedImage, EncodeError> {
    check_size(std::fs::metadata(path)?.len(), max_bytes)?;
    let bytes = std::fs::read(path)?;
    encode_image_bytes(&bytes)
}

pub fn encode_image_bytes(bytes: &[u8]) -> Result<EncodedImage, EncodeError> {
    let image = image::load_from_memory(bytes)?;
    let original_size = image.dimensions();
    Ok(EncodedImage {
        data_uri: encode_image(&image)?,
        original_size,
    })
}

/// Center-crops to a square upload size, flattens to RGB and wraps the JPEG
/// bytes in a `data:image/jpeg;base64,` URI.
pub fn encode_image(image: &DynamicImage) -> Result<String, EncodeError> {
    let fitted = image.resize_to_fill(UPLOAD_SIZE, UPLOAD_SIZE, FilterType::Lanczos3);
    let rgb = DynamicImage::ImageRgb8(fitted.to_rgb8());

    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&buf)))
}

fn check_size(size: u64, limit: u64) -> Result<(), EncodeError> {
    if size > limit {
        return Err(EncodeError::TooLarge { size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 128])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn produces_square_jpeg_data_uri() {
        let encoded = encode_image_bytes(&png(640, 320)).unwrap();
        assert_eq!(encoded.original_size, (640, 320));

        let body = encoded
            .data_uri
            .strip_prefix("data:image/jpeg;base64,")
            .unwrap();
        let decoded = image::load_from_memory(&STANDARD.decode(body).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (UPLOAD_SIZE, UPLOAD_SIZE));
        assert!(decoded.color().has_color());
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn rejects_oversized_files() {
        assert!(check_size(5 * 1024 * 1024, 5 * 1024 * 1024).is_ok());
        assert!(matches!(
            check_size(5 * 1024 * 1024 + 1, 5 * 1024 * 1024),
            Err(EncodeError::TooLarge { .. })
        ));
    }

    #[test]
    fn rejects_non_images() {
        assert!(matches!(
            encode_image_bytes(b"plain text"),
            Err(EncodeError::Image(_))
        ));
    }
}
