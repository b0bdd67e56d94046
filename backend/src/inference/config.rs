use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessConfig {
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageConfig {
    /// Model input resolution as `[width, height]`.
    pub size: [u32; 2],
    #[serde(default)]
    pub resize_method: ResizeMethod,
}

/// Per-channel statistics applied to pixel values scaled to `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizationConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Area-aware resampling filters. Nearest-neighbour is deliberately absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    #[default]
    Lanczos3,
    CatmullRom,
    Gaussian,
    Triangle,
}

#[derive(Debug, thiserror::Error)]
pub enum PreprocessConfigError {
    #[error("Failed to read preprocessing config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse preprocessing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid preprocessing config: {0}")]
    Invalid(String),
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: [224, 224],
            resize_method: ResizeMethod::default(),
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        // MobileNetV2 expects inputs in [-1, 1].
        Self {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image: ImageConfig::default(),
            normalization: NormalizationConfig::default(),
        }
    }
}

impl ResizeMethod {
    pub fn filter(self) -> FilterType {
        match self {
            ResizeMethod::Lanczos3 => FilterType::Lanczos3,
            ResizeMethod::CatmullRom => FilterType::CatmullRom,
            ResizeMethod::Gaussian => FilterType::Gaussian,
            ResizeMethod::Triangle => FilterType::Triangle,
        }
    }
}

impl PreprocessConfig {
    pub fn load(path: &Path) -> Result<Self, PreprocessConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, PreprocessConfigError> {
        let config: PreprocessConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn width(&self) -> u32 {
        self.image.size[0]
    }

    pub fn height(&self) -> u32 {
        self.image.size[1]
    }

    fn validate(&self) -> Result<(), PreprocessConfigError> {
        if self.width() == 0 || self.height() == 0 {
            return Err(PreprocessConfigError::Invalid(
                "image.size must be non-zero".to_string(),
            ));
        }
        if self
            .normalization
            .std
            .iter()
            .any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(PreprocessConfigError::Invalid(
                "normalization.std must be positive".to_string(),
            ));
        }
        if self.normalization.mean.iter().any(|m| !m.is_finite()) {
            return Err(PreprocessConfigError::Invalid(
                "normalization.mean must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
