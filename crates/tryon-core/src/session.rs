//! One try-on session: owns every component and threads outputs between them.

use crate::acquisition::{AcquisitionError, ImageAcquisition, PreviewRegistry, SourcePhoto};
use crate::camera::{CameraDevice, CameraError, LiveCamera};
use crate::detection::{DetectionError, FaceDetection};
use crate::orchestrator::{SubmitError, SynthesisTransport, TransferOrchestrator, TransferState};
use crate::parameters::{ParameterError, ParameterPanel};
use crate::reference::{AssetFetcher, ReferenceAsset, ReferenceResolver, ResolutionError, ShadeDescriptor};
use crate::types::Region;
use crate::validator::{FaceValidator, ValidationReport, ValidationThresholds};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Flow: acquire → validate → select shade → adjust intensity → submit.
///
/// Closing (or dropping) the session cancels any outstanding submission,
/// stops the camera, and releases every preview and cached asset.
pub struct TryOnSession<D> {
    id: Uuid,
    acquisition: ImageAcquisition,
    validator: FaceValidator<D>,
    photo: Option<SourcePhoto>,
    report: Option<ValidationReport>,
    camera: Option<LiveCamera>,
    resolver: ReferenceResolver,
    selected: Option<ReferenceAsset>,
    panel: ParameterPanel,
    orchestrator: TransferOrchestrator,
    cancel: CancellationToken,
}

impl<D: FaceDetection> TryOnSession<D> {
    pub fn new(
        detector: D,
        fetcher: Arc<dyn AssetFetcher>,
        transport: Arc<dyn SynthesisTransport>,
    ) -> Self {
        Self::with_thresholds(detector, fetcher, transport, ValidationThresholds::default())
    }

    pub fn with_thresholds(
        detector: D,
        fetcher: Arc<dyn AssetFetcher>,
        transport: Arc<dyn SynthesisTransport>,
        thresholds: ValidationThresholds,
    ) -> Self {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        tracing::info!(session = %id, "try-on session opened");
        Self {
            id,
            acquisition: ImageAcquisition::new(PreviewRegistry::new()),
            validator: FaceValidator::with_thresholds(detector, thresholds),
            photo: None,
            report: None,
            camera: None,
            resolver: ReferenceResolver::new(fetcher),
            selected: None,
            panel: ParameterPanel::new(),
            orchestrator: TransferOrchestrator::new(transport, cancel.clone()),
            cancel,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn photo(&self) -> Option<&SourcePhoto> {
        self.photo.as_ref()
    }

    pub fn report(&self) -> Option<ValidationReport> {
        self.report
    }

    pub fn selected(&self) -> Option<&ReferenceAsset> {
        self.selected.as_ref()
    }

    pub fn panel(&self) -> &ParameterPanel {
        &self.panel
    }

    pub fn validator(&self) -> &FaceValidator<D> {
        &self.validator
    }

    pub fn previews(&self) -> &Arc<PreviewRegistry> {
        self.acquisition.previews()
    }

    pub fn state(&self) -> TransferState {
        self.orchestrator.state()
    }

    /// Shared handle for observing transfer state from elsewhere.
    pub fn orchestrator(&self) -> TransferOrchestrator {
        self.orchestrator.clone()
    }

    /// Token that closes the session's outstanding work when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn load_detector(&mut self, location: &str) -> Result<(), DetectionError> {
        self.validator.load(location).await
    }

    /// Replace the source photo with an upload and validate it.
    pub async fn upload(
        &mut self,
        bytes: Vec<u8>,
        media_type: &str,
    ) -> Result<ValidationReport, AcquisitionError> {
        self.discard_photo();
        let photo = self.acquisition.acquire_from_file(bytes, media_type)?;
        Ok(self.adopt(photo).await)
    }

    pub async fn upload_path(&mut self, path: &Path) -> Result<ValidationReport, AcquisitionError> {
        self.discard_photo();
        let photo = self.acquisition.acquire_from_path(path).await?;
        Ok(self.adopt(photo).await)
    }

    /// Start streaming from `device`. Only one stream may be live per session.
    pub async fn start_camera(&mut self, device: Box<dyn CameraDevice>) -> Result<(), CameraError> {
        if self.camera.is_some() {
            return Err(CameraError::DeviceBusy);
        }
        self.camera = Some(self.acquisition.start_camera(device).await?);
        Ok(())
    }

    /// Capture a still from the live stream (which is then released) as the
    /// new source photo, and validate it.
    pub async fn capture_from_camera(&mut self) -> Result<ValidationReport, AcquisitionError> {
        let camera = self
            .camera
            .take()
            .ok_or_else(|| CameraError::CaptureFailed("no active camera stream".into()))?;
        self.discard_photo();
        let photo = camera.capture().await?;
        Ok(self.adopt(photo).await)
    }

    pub fn cancel_camera(&mut self) {
        if let Some(camera) = self.camera.take() {
            camera.cancel();
        }
    }

    pub fn camera_active(&self) -> bool {
        self.camera.is_some()
    }

    /// Resolve a shade's reference and make its region the active intensity.
    /// On failure the previous selection is kept.
    pub async fn select_shade(&mut self, shade: &ShadeDescriptor) -> Result<Region, ResolutionError> {
        let asset = self.resolver.resolve(shade).await?;
        let region = asset.region();
        self.panel.set_active_region(region);
        self.selected = Some(asset);
        self.refresh_readiness();
        Ok(region)
    }

    pub fn set_intensity(&mut self, region: Region, value: f32) -> Result<f32, ParameterError> {
        self.panel.set(region, value)
    }

    pub async fn submit(&self) -> Result<TransferState, SubmitError> {
        let photo = self.photo.as_ref().ok_or(SubmitError::PhotoNotValid)?;
        self.orchestrator
            .submit(photo, self.selected.as_ref(), self.panel.effective())
            .await
    }

    /// Whole-face transfer against a style photo. The style photo is not
    /// face-validated and is released once the request completes.
    pub async fn submit_global(
        &self,
        reference: Vec<u8>,
        media_type: &str,
    ) -> Result<TransferState, SubmitError> {
        let photo = self.photo.as_ref().ok_or(SubmitError::PhotoNotValid)?;
        let style = self
            .acquisition
            .acquire_from_file(reference, media_type)
            .map_err(|e| {
                tracing::warn!(error = %e, "global reference rejected");
                SubmitError::MissingReferenceAsset
            })?;
        self.orchestrator.submit_global(photo, Some(&style)).await
    }

    /// Tear the session down.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.cancel_camera();
        self.discard_photo();
        self.selected = None;
        self.resolver.clear();
        tracing::info!(session = %self.id, "try-on session closed");
    }

    async fn adopt(&mut self, mut photo: SourcePhoto) -> ValidationReport {
        let report = self.validator.validate(&mut photo).await;
        self.photo = Some(photo);
        self.report = Some(report);
        self.refresh_readiness();
        report
    }

    fn discard_photo(&mut self) {
        self.photo = None;
        self.report = None;
        self.refresh_readiness();
    }

    fn refresh_readiness(&self) {
        let ready = self.photo.as_ref().is_some_and(SourcePhoto::is_valid) && self.selected.is_some();
        self.orchestrator.mark_ready(ready);
    }
}

impl<D> Drop for TryOnSession<D> {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            tracing::debug!(session = %self.id, "try-on session dropped");
        }
    }
}
