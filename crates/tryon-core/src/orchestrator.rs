//! Single-flight transfer submission against the synthesis endpoint.

use crate::acquisition::SourcePhoto;
use crate::parameters::EffectiveParameters;
use crate::reference::ReferenceAsset;
use crate::request::{
    FormField, GlobalTransferRequest, TransferRequest, GLOBAL_TRANSFER_PATH, REGION_TRANSFER_PATH,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Raw reply from the synthesis endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl SynthesisResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No response was received.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
}

/// Injected HTTP transport that posts a multipart form.
#[async_trait]
pub trait SynthesisTransport: Send + Sync {
    async fn post_form(
        &self,
        path: &str,
        fields: Vec<FormField>,
    ) -> Result<SynthesisResponse, TransportError>;
}

/// Why a submitted transfer failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Non-2xx reply; carries the server's `detail` text verbatim.
    #[error("{0}")]
    ServerError(String),
    #[error("Could not reach the makeup service. Please try again.")]
    NetworkFailure,
    /// The session closed while the request was outstanding.
    #[error("transfer cancelled")]
    Cancelled,
}

/// A submission rejected before any network call; state is unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("photo has not passed validation")]
    PhotoNotValid,
    #[error("no reference asset selected")]
    MissingReferenceAsset,
    #[error("a transfer is already in progress")]
    InFlight,
    #[error("session closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    ReadyToSubmit,
    Submitting,
    Succeeded(Arc<[u8]>),
    Failed(TransferError),
}

impl TransferState {
    pub fn is_submitting(&self) -> bool {
        matches!(self, TransferState::Submitting)
    }

    pub fn result(&self) -> Option<&[u8]> {
        match self {
            TransferState::Succeeded(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Drives the request lifecycle. Clones share state, so any clone can
/// observe an in-flight submission.
#[derive(Clone)]
pub struct TransferOrchestrator {
    transport: Arc<dyn SynthesisTransport>,
    state: Arc<Mutex<TransferState>>,
    cancel: CancellationToken,
}

impl TransferOrchestrator {
    pub fn new(transport: Arc<dyn SynthesisTransport>, cancel: CancellationToken) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(TransferState::Idle)),
            cancel,
        }
    }

    pub fn state(&self) -> TransferState {
        self.lock().clone()
    }

    /// Move between `Idle` and `ReadyToSubmit` after inputs change. A
    /// finished outcome is discarded; an in-flight submission is left alone.
    pub fn mark_ready(&self, ready: bool) {
        let mut state = self.lock();
        if state.is_submitting() {
            return;
        }
        *state = if ready {
            TransferState::ReadyToSubmit
        } else {
            TransferState::Idle
        };
    }

    pub fn reset(&self) {
        self.mark_ready(false);
    }

    /// Submit a region-scoped transfer and wait for its outcome.
    ///
    /// Returns the terminal state (`Succeeded` or `Failed`). Precondition
    /// violations return `Err` without touching state or the network.
    pub async fn submit(
        &self,
        photo: &SourcePhoto,
        reference: Option<&ReferenceAsset>,
        parameters: EffectiveParameters,
    ) -> Result<TransferState, SubmitError> {
        if !photo.is_valid() {
            return Err(SubmitError::PhotoNotValid);
        }
        let reference = reference.ok_or(SubmitError::MissingReferenceAsset)?;
        let slot = self.begin()?;

        let request = TransferRequest::new(photo, reference, parameters);
        tracing::info!(
            region = %request.region(),
            shade = reference.id(),
            lip = request.parameters().lip,
            skin = request.parameters().skin,
            eye = request.parameters().eye,
            "submitting region transfer"
        );
        Ok(self.dispatch(slot, REGION_TRANSFER_PATH, request.form_fields()).await)
    }

    /// Submit a whole-face transfer from a reference photo.
    pub async fn submit_global(
        &self,
        photo: &SourcePhoto,
        reference: Option<&SourcePhoto>,
    ) -> Result<TransferState, SubmitError> {
        if !photo.is_valid() {
            return Err(SubmitError::PhotoNotValid);
        }
        let reference = reference.ok_or(SubmitError::MissingReferenceAsset)?;
        let slot = self.begin()?;

        tracing::info!("submitting global transfer");
        let request = GlobalTransferRequest::new(photo, reference);
        Ok(self.dispatch(slot, GLOBAL_TRANSFER_PATH, request.form_fields()).await)
    }

    /// Claim the single in-flight slot. The slot is released when the
    /// returned guard is committed or dropped.
    fn begin(&self) -> Result<InFlightSlot<'_>, SubmitError> {
        let mut state = self.lock();
        if state.is_submitting() {
            tracing::debug!("submission rejected: already in flight");
            return Err(SubmitError::InFlight);
        }
        if self.cancel.is_cancelled() {
            return Err(SubmitError::Closed);
        }
        *state = TransferState::Submitting;
        Ok(InFlightSlot {
            state: &self.state,
            committed: false,
        })
    }

    async fn dispatch(&self, slot: InFlightSlot<'_>, path: &str, fields: Vec<FormField>) -> TransferState {
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::info!(path, "transfer abandoned: session closed");
                TransferState::Failed(TransferError::Cancelled)
            }
            reply = self.transport.post_form(path, fields) => outcome_of(reply),
        };

        match &outcome {
            TransferState::Succeeded(bytes) => {
                tracing::info!(path, len = bytes.len(), "transfer succeeded")
            }
            TransferState::Failed(e) => tracing::warn!(path, error = %e, "transfer failed"),
            _ => {}
        }
        slot.commit(outcome.clone());
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, TransferState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<TransferState>) -> MutexGuard<'_, TransferState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds `Submitting` for one request. If the submitting future is dropped
/// before an outcome is committed, the state becomes `Failed(Cancelled)`.
struct InFlightSlot<'a> {
    state: &'a Mutex<TransferState>,
    committed: bool,
}

impl InFlightSlot<'_> {
    fn commit(mut self, outcome: TransferState) {
        *lock_state(self.state) = outcome;
        self.committed = true;
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut state = lock_state(self.state);
        if state.is_submitting() {
            tracing::info!("transfer abandoned: submission dropped");
            *state = TransferState::Failed(TransferError::Cancelled);
        }
    }
}

fn outcome_of(reply: Result<SynthesisResponse, TransportError>) -> TransferState {
    match reply {
        Ok(response) if response.is_success() => TransferState::Succeeded(response.body.into()),
        Ok(response) => TransferState::Failed(TransferError::ServerError(error_detail(
            response.status,
            &response.body,
        ))),
        Err(e) => {
            tracing::warn!(error = %e, "synthesis transport failed");
            TransferState::Failed(TransferError::NetworkFailure)
        }
    }
}

/// Extract `detail` from a JSON error body. Non-string details (validation
/// error lists) are rendered as compact JSON; anything else falls back to
/// the status code.
pub fn error_detail(status: u16, body: &[u8]) -> String {
    let detail = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());
    match detail {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => format!("HTTP {status}"),
        Some(other) => other.to_string(),
    }
}
