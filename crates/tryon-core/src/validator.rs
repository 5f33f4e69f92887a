//! Photo quality and face-content validation.
//!
//! Checks run in a fixed order and the first failure decides the outcome:
//! resolution, brightness, face count, face size. If the detection
//! capability is not ready the pipeline short-circuits before any check.

use crate::acquisition::SourcePhoto;
use crate::detection::{DetectionError, FaceDetection};
use crate::types::PhotoLifecycle;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Default thresholds ---
pub const MIN_DIMENSION: u32 = 300;
pub const MIN_MEAN_LUMINANCE: f32 = 70.0;
pub const MIN_FACE_RATIO: f32 = 0.3;

/// Limits applied by [`FaceValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationThresholds {
    pub min_width: u32,
    pub min_height: u32,
    /// Mean of per-pixel (R+G+B)/3 on a 0–255 scale.
    pub min_mean_luminance: f32,
    /// Minimum face-box size as a fraction of image width and of image height.
    pub min_face_ratio: f32,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            min_width: MIN_DIMENSION,
            min_height: MIN_DIMENSION,
            min_mean_luminance: MIN_MEAN_LUMINANCE,
            min_face_ratio: MIN_FACE_RATIO,
        }
    }
}

/// Why a photo was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    LowResolution,
    TooDark,
    NoFaceDetected,
    MultipleFacesDetected,
    FaceTooSmall,
    DetectionUnavailable,
    /// Bytes declared an image type but could not be decoded.
    Unreadable,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            InvalidReason::LowResolution => {
                "Image resolution too low. Please upload a photo at least 300x300 pixels."
            }
            InvalidReason::TooDark => "Image is too dark. Please upload a well-lit photo.",
            InvalidReason::NoFaceDetected => "No face detected. Please upload a clear photo.",
            InvalidReason::MultipleFacesDetected => {
                "Multiple faces detected. Please upload only one face."
            }
            InvalidReason::FaceTooSmall => "Face too small. Please upload a close-up photo.",
            InvalidReason::DetectionUnavailable => {
                "Face detection is unavailable right now. Please try again shortly."
            }
            InvalidReason::Unreadable => "Failed to load the image.",
        };
        f.write_str(msg)
    }
}

/// Outcome of validating one photo. A new photo gets a new report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ValidationReport {
    Valid,
    Invalid(InvalidReason),
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationReport::Valid)
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            ValidationReport::Valid => None,
            ValidationReport::Invalid(r) => Some(*r),
        }
    }
}

/// Lifecycle of the validator and its detection capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorState {
    Idle,
    CapabilityLoading,
    Ready,
    /// Model loading failed; every validation reports `DetectionUnavailable`.
    Unavailable,
    Validating,
    Valid,
    Invalid(InvalidReason),
}

impl ValidatorState {
    fn capability_ready(&self) -> bool {
        matches!(
            self,
            ValidatorState::Ready | ValidatorState::Valid | ValidatorState::Invalid(_)
        )
    }
}

/// Runs the validation pipeline against an injected detector.
pub struct FaceValidator<D> {
    detector: D,
    thresholds: ValidationThresholds,
    state: ValidatorState,
}

impl<D: FaceDetection> FaceValidator<D> {
    pub fn new(detector: D) -> Self {
        Self::with_thresholds(detector, ValidationThresholds::default())
    }

    pub fn with_thresholds(detector: D, thresholds: ValidationThresholds) -> Self {
        Self {
            detector,
            thresholds,
            state: ValidatorState::Idle,
        }
    }

    pub fn state(&self) -> &ValidatorState {
        &self.state
    }

    pub fn thresholds(&self) -> &ValidationThresholds {
        &self.thresholds
    }

    /// Load the detection models. On failure the validator stays usable but
    /// reports `DetectionUnavailable` for every photo.
    pub async fn load(&mut self, location: &str) -> Result<(), DetectionError> {
        self.state = ValidatorState::CapabilityLoading;
        match self.detector.load_models(location).await {
            Ok(()) => {
                tracing::info!(location, "face detection models loaded");
                self.state = ValidatorState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(location, error = %e, "face detection models failed to load");
                self.state = ValidatorState::Unavailable;
                Err(e)
            }
        }
    }

    /// Validate `photo` and record the outcome on its lifecycle. Never fails;
    /// every failure path is an `Invalid` report.
    pub async fn validate(&mut self, photo: &mut SourcePhoto) -> ValidationReport {
        let report = self.run(photo.bytes()).await;
        photo.set_lifecycle(match report {
            ValidationReport::Valid => PhotoLifecycle::Valid,
            ValidationReport::Invalid(_) => PhotoLifecycle::Invalid,
        });
        report
    }

    async fn run(&mut self, bytes: &[u8]) -> ValidationReport {
        if !self.state.capability_ready() {
            tracing::debug!(state = ?self.state, "validation requested without a ready detector");
            return ValidationReport::Invalid(InvalidReason::DetectionUnavailable);
        }

        let slot = ValidationSlot::enter(&mut self.state);
        let report = match check(&mut self.detector, self.thresholds, bytes).await {
            Ok(()) => ValidationReport::Valid,
            Err(reason) => ValidationReport::Invalid(reason),
        };
        slot.finish(report);
        tracing::info!(?report, "photo validated");
        report
    }
}

/// Holds `Validating` while a check runs. A validation whose future is
/// dropped leaves the validator `Ready` for the next photo.
struct ValidationSlot<'a> {
    state: &'a mut ValidatorState,
    finished: bool,
}

impl<'a> ValidationSlot<'a> {
    fn enter(state: &'a mut ValidatorState) -> Self {
        *state = ValidatorState::Validating;
        Self {
            state,
            finished: false,
        }
    }

    fn finish(mut self, report: ValidationReport) {
        *self.state = match report {
            ValidationReport::Valid => ValidatorState::Valid,
            ValidationReport::Invalid(r) => ValidatorState::Invalid(r),
        };
        self.finished = true;
    }
}

impl Drop for ValidationSlot<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("validation abandoned");
            *self.state = ValidatorState::Ready;
        }
    }
}

async fn check<D: FaceDetection>(
    detector: &mut D,
    t: ValidationThresholds,
    bytes: &[u8],
) -> Result<(), InvalidReason> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| {
            tracing::debug!(error = %e, "photo failed to decode");
            InvalidReason::Unreadable
        })?
        .to_rgb8();
    let (width, height) = image.dimensions();

    if width < t.min_width || height < t.min_height {
        return Err(InvalidReason::LowResolution);
    }

    let luminance = mean_luminance(&image);
    tracing::debug!(width, height, luminance, "photo metrics");
    if luminance < t.min_mean_luminance {
        return Err(InvalidReason::TooDark);
    }

    let faces = detector.detect_all_faces(&image).await.map_err(|e| {
        tracing::warn!(error = %e, "face detection failed");
        InvalidReason::DetectionUnavailable
    })?;

    let face = match faces.as_slice() {
        [] => return Err(InvalidReason::NoFaceDetected),
        [face] => face,
        _ => return Err(InvalidReason::MultipleFacesDetected),
    };

    let (width_ratio, height_ratio) = face.frame_ratios(width, height);
    tracing::debug!(width_ratio, height_ratio, "face size");
    if width_ratio < t.min_face_ratio || height_ratio < t.min_face_ratio {
        return Err(InvalidReason::FaceTooSmall);
    }

    Ok(())
}

/// Mean of per-pixel (R+G+B)/3 over the whole image, 0.0–255.0.
pub fn mean_luminance(image: &RgbImage) -> f32 {
    let pixels = image.width() as u64 * image.height() as u64;
    if pixels == 0 {
        return 0.0;
    }
    let total: u64 = image.as_raw().iter().map(|&c| c as u64).sum();
    (total as f64 / (3 * pixels) as f64) as f32
}
