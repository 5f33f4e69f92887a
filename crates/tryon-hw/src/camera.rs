//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, PixelFormat};
use image::RgbImage;
use std::path::Path;
use tryon_core::camera::{CameraDevice, CameraError};
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Requested capture size; the driver may negotiate something else.
const REQUEST_WIDTH: u32 = 640;
const REQUEST_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const DARK_FRAME_PCT: f32 = 0.95;
/// Non-dark frames to wait for when a still is requested.
const MAX_CAPTURE_ATTEMPTS: usize = 10;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// V4L2 camera implementing the try-on [`CameraDevice`] capability.
pub struct V4l2Camera {
    device: Device,
    stream: Option<MmapStream<'static>>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
    label: String,
    warmup_frames: usize,
}

impl V4l2Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    ///
    /// `warmup_frames` are read and discarded when the stream starts.
    pub fn open(device_path: &str, warmup_frames: usize) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUEST_WIDTH;
        fmt.height = REQUEST_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        let pixel_format = PixelFormat::from_fourcc(&negotiated.fourcc.repr).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or Y16)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            format = ?pixel_format,
            "opened camera"
        );

        Ok(Self {
            device,
            stream: None,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
            label: format!("{} ({device_path})", caps.card),
            warmup_frames,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::CaptureFailed("stream not started".into()))?;
        let (buf, _meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        self.pixel_format
            .decode(buf, self.width, self.height)
            .map_err(|e| CameraError::CaptureFailed(format!("frame conversion failed: {e}")))
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl CameraDevice for V4l2Camera {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| {
                if e.raw_os_error() == Some(16) {
                    CameraError::DeviceBusy
                } else {
                    CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
                }
            })?;
        self.stream = Some(stream);

        for _ in 0..self.warmup_frames {
            self.next_frame()?;
        }
        tracing::debug!(device = %self.device_path, warmup = self.warmup_frames, "stream warm");
        Ok(())
    }

    /// Grab a still, skipping dark frames. If every attempt is dark the last
    /// frame is returned and left for validation to reject.
    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        let mut last = None;
        for attempt in 0..MAX_CAPTURE_ATTEMPTS {
            let frame = self.next_frame()?;
            if !frame::is_dark_frame(&frame, DARK_FRAME_PCT) {
                return Ok(frame);
            }
            tracing::debug!(attempt, "skipping dark frame");
            last = Some(frame);
        }
        last.ok_or_else(|| CameraError::CaptureFailed("no frame captured".into()))
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(device = %self.device_path, "stream stopped");
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let result = V4l2Camera::open("/dev/tryon-no-such-camera", 0);
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_list_devices_only_reports_existing_paths() {
        for info in V4l2Camera::list_devices() {
            assert!(Path::new(&info.path).exists());
            assert!(info.path.starts_with("/dev/video"));
        }
    }
}
