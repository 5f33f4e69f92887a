//! tryon-detect: Face detection capability for photo validation.
//!
//! Runs SCRFD via ONNX Runtime on CPU.

pub mod scrfd;

pub use scrfd::{ScrfdDetector, SCRFD_MODEL_FILE};
