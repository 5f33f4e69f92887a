//! Face-detection capability consumed by the validator.

use crate::types::BoundingBox;
use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detection models unavailable at {location}: {reason}")]
    ModelsUnavailable { location: String, reason: String },
    #[error("detector not loaded")]
    NotLoaded,
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Injected face detector.
///
/// Implementations load their model once via [`load_models`](Self::load_models)
/// and then report every face found in an RGB image. Boxes are in the
/// image's own pixel coordinates.
#[async_trait]
pub trait FaceDetection: Send {
    async fn load_models(&mut self, location: &str) -> Result<(), DetectionError>;

    async fn detect_all_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectionError>;
}
