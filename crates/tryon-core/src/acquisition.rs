//! Source photo acquisition from uploads, and the preview handles that go with it.

use crate::camera::{CameraDevice, CameraError, LiveCamera};
use crate::types::PhotoLifecycle;
use image::ImageFormat;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("not an image: declared media type is {0:?}")]
    NotAnImage(String),
    #[error("empty upload")]
    Empty,
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
}

/// Tracks which preview handles are still live.
///
/// A preview stands in for a locally displayable reference to photo bytes.
/// Handles revoke themselves on drop; the registry lets the owner observe
/// that nothing accumulates across repeated uploads.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    live: Mutex<HashSet<Uuid>>,
}

impl PreviewRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn issue(self: &Arc<Self>) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.entries().insert(id);
        tracing::trace!(%id, "preview issued");
        PreviewHandle {
            id,
            registry: Arc::clone(self),
        }
    }

    fn revoke(&self, id: Uuid) {
        if self.entries().remove(&id) {
            tracing::trace!(%id, "preview revoked");
        }
    }

    /// Number of previews issued and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    pub fn is_live(&self, id: Uuid) -> bool {
        self.entries().contains(&id)
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Revocable preview reference owned by a [`SourcePhoto`].
#[derive(Debug)]
pub struct PreviewHandle {
    id: Uuid,
    registry: Arc<PreviewRegistry>,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn uri(&self) -> String {
        format!("preview:{}", self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.revoke(self.id);
    }
}

/// A candidate photo of the user, plus its preview and validation status.
#[derive(Debug)]
pub struct SourcePhoto {
    bytes: Vec<u8>,
    media_type: String,
    preview: PreviewHandle,
    lifecycle: PhotoLifecycle,
}

impl SourcePhoto {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub fn lifecycle(&self) -> PhotoLifecycle {
        self.lifecycle
    }

    pub fn is_valid(&self) -> bool {
        self.lifecycle == PhotoLifecycle::Valid
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: PhotoLifecycle) {
        self.lifecycle = lifecycle;
    }
}

/// Produces [`SourcePhoto`]s from uploads or a camera.
///
/// Performs no quality or face checks; that is the validator's job.
#[derive(Debug, Clone)]
pub struct ImageAcquisition {
    previews: Arc<PreviewRegistry>,
}

impl ImageAcquisition {
    pub fn new(previews: Arc<PreviewRegistry>) -> Self {
        Self { previews }
    }

    pub fn previews(&self) -> &Arc<PreviewRegistry> {
        &self.previews
    }

    /// Wrap uploaded bytes. The declared media type must be `image/*`.
    pub fn acquire_from_file(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
    ) -> Result<SourcePhoto, AcquisitionError> {
        let essence = media_type.trim().to_ascii_lowercase();
        if !essence.starts_with("image/") {
            return Err(AcquisitionError::NotAnImage(media_type.to_string()));
        }
        if bytes.is_empty() {
            return Err(AcquisitionError::Empty);
        }
        Ok(self.wrap(bytes, essence))
    }

    /// Read a photo from disk, taking its media type from the file extension.
    pub async fn acquire_from_path(&self, path: &Path) -> Result<SourcePhoto, AcquisitionError> {
        let media_type = ImageFormat::from_path(path)
            .map(|f| f.to_mime_type().to_string())
            .map_err(|_| AcquisitionError::NotAnImage(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(path = %path.display(), len = bytes.len(), %media_type, "photo read");
        self.acquire_from_file(bytes, &media_type)
    }

    /// Start a live stream on `device`. The returned guard releases the
    /// device when it captures, is cancelled, or is dropped.
    pub async fn start_camera(
        &self,
        device: Box<dyn CameraDevice>,
    ) -> Result<LiveCamera, CameraError> {
        LiveCamera::start(device, Arc::clone(&self.previews)).await
    }

    pub(crate) fn wrap(&self, bytes: Vec<u8>, media_type: String) -> SourcePhoto {
        wrap_photo(&self.previews, bytes, media_type)
    }
}

pub(crate) fn wrap_photo(
    previews: &Arc<PreviewRegistry>,
    bytes: Vec<u8>,
    media_type: String,
) -> SourcePhoto {
    SourcePhoto {
        bytes,
        media_type,
        preview: previews.issue(),
        lifecycle: PhotoLifecycle::Unvalidated,
    }
}
