//! tryon-hw: Hardware abstraction for camera capture.
//!
//! Provides a V4L2-backed [`CameraDevice`](tryon_core::CameraDevice) that
//! delivers RGB stills for face validation.

pub mod camera;
pub mod frame;

pub use camera::{DeviceInfo, V4l2Camera};
pub use frame::{FrameError, PixelFormat};
pub use tryon_core::camera::CameraError;
