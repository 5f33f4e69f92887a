//! tryon-core: Virtual makeup try-on flow.
//!
//! Acquires a face photo, gates it through face validation, binds shade
//! references to a facial region, and drives single-flight submission to
//! the makeup synthesis endpoint. Face detection, camera hardware, asset
//! fetching, and HTTP transport are injected capabilities.

pub mod acquisition;
pub mod camera;
pub mod detection;
pub mod orchestrator;
pub mod parameters;
pub mod reference;
pub mod region;
pub mod request;
pub mod session;
pub mod types;
pub mod validator;

#[cfg(test)]
mod testing;

pub use acquisition::{AcquisitionError, ImageAcquisition, PreviewHandle, PreviewRegistry, SourcePhoto};
pub use camera::{CameraDevice, CameraError, LiveCamera};
pub use detection::{DetectionError, FaceDetection};
pub use orchestrator::{
    SubmitError, SynthesisResponse, SynthesisTransport, TransferError, TransferOrchestrator,
    TransferState, TransportError,
};
pub use parameters::{EffectiveParameters, ParameterError, ParameterPanel};
pub use reference::{
    AssetFetcher, FetchError, ReferenceAsset, ReferenceResolver, ResolutionError, ShadeDescriptor,
};
pub use region::classify;
pub use request::{FormField, FormValue};
pub use session::TryOnSession;
pub use types::{BoundingBox, PhotoLifecycle, Region};
pub use validator::{
    FaceValidator, InvalidReason, ValidationReport, ValidationThresholds, ValidatorState,
};

#[cfg(test)]
mod tests {
    #[test]
    fn test_signature_types_reexported() {
        let state: crate::ValidatorState = crate::ValidatorState::Idle;
        assert_eq!(state, crate::ValidatorState::Idle);
        let _: fn(crate::ParameterError) -> String = |e| e.to_string();
        let _: fn(crate::ResolutionError) -> String = |e| e.to_string();
    }
}
