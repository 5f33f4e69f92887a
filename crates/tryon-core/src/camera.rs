//! Camera capability and the live-stream guard that owns it.

use crate::acquisition::{wrap_photo, AcquisitionError, PreviewRegistry, SourcePhoto};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Injected camera device.
///
/// Calls may block; the core only invokes them off the async executor.
/// `stop` must release the hardware handle and be safe to call twice.
pub trait CameraDevice: Send {
    fn start(&mut self) -> Result<(), CameraError>;
    fn capture_frame(&mut self) -> Result<RgbImage, CameraError>;
    fn stop(&mut self);
    fn name(&self) -> &str;
}

/// An active camera stream.
///
/// The device is stopped on [`capture`](Self::capture), on
/// [`cancel`](Self::cancel), or when the guard is dropped.
pub struct LiveCamera {
    device: Option<Box<dyn CameraDevice>>,
    previews: Arc<PreviewRegistry>,
}

impl LiveCamera {
    pub(crate) async fn start(
        device: Box<dyn CameraDevice>,
        previews: Arc<PreviewRegistry>,
    ) -> Result<Self, CameraError> {
        let guard = Self {
            device: Some(device),
            previews,
        };
        // The guard travels through the blocking task, so a failed start or
        // an abandoned caller still stops the device when it drops.
        let live = tokio::task::spawn_blocking(move || {
            let mut live = guard;
            if let Some(device) = live.device.as_mut() {
                device.start()?;
            }
            Ok::<_, CameraError>(live)
        })
        .await
        .map_err(|e| CameraError::CaptureFailed(format!("camera task failed: {e}")))??;

        tracing::info!(device = live.device_name().unwrap_or_default(), "camera stream started");
        Ok(live)
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_deref().map(|d| d.name())
    }

    /// Grab one still frame as a PNG-encoded [`SourcePhoto`], then stop the stream.
    pub async fn capture(mut self) -> Result<SourcePhoto, AcquisitionError> {
        let Some(device) = self.device.take() else {
            return Err(CameraError::CaptureFailed("stream already released".into()).into());
        };

        let (_device, encoded) = blocking(device, |d| {
            let frame = d.capture_frame();
            d.stop();
            frame.and_then(encode_png)
        })
        .await?;

        let bytes = encoded?;
        tracing::info!(len = bytes.len(), "camera frame captured");
        Ok(wrap_photo(&self.previews, bytes, "image/png".to_string()))
    }

    /// Stop the stream without capturing.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop();
            tracing::info!(device = device.name(), "camera stream stopped");
        }
    }
}

impl Drop for LiveCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run a device call on the blocking pool, handing the device back afterwards.
async fn blocking<T, F>(
    mut device: Box<dyn CameraDevice>,
    f: F,
) -> Result<(Box<dyn CameraDevice>, T), CameraError>
where
    T: Send + 'static,
    F: FnOnce(&mut (dyn CameraDevice + 'static)) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let out = f(device.as_mut());
        (device, out)
    })
    .await
    .map_err(|e| CameraError::CaptureFailed(format!("camera task failed: {e}")))
}

fn encode_png(frame: RgbImage) -> Result<Vec<u8>, CameraError> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(frame)
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| CameraError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
