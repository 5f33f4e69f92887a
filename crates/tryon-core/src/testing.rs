//! In-crate fakes for the injected capabilities, plus image helpers.

use crate::acquisition::{ImageAcquisition, PreviewRegistry, SourcePhoto};
use crate::camera::{CameraDevice, CameraError};
use crate::detection::{DetectionError, FaceDetection};
use crate::orchestrator::{SynthesisResponse, SynthesisTransport, TransportError};
use crate::reference::{AssetFetcher, FetchError, ReferenceAsset, ShadeDescriptor};
use crate::request::FormField;
use crate::types::{BoundingBox, PhotoLifecycle, Region};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// A face box centered in a `width`×`height` image covering `ratio` of each axis.
pub fn centered_face(width: u32, height: u32, ratio: f32) -> BoundingBox {
    let w = width as f32 * ratio;
    let h = height as f32 * ratio;
    BoundingBox {
        x: (width as f32 - w) / 2.0,
        y: (height as f32 - h) / 2.0,
        width: w,
        height: h,
        confidence: 0.95,
    }
}

pub fn valid_photo() -> SourcePhoto {
    let mut photo = ImageAcquisition::new(PreviewRegistry::new())
        .acquire_from_file(png_bytes(4, 4, [200, 180, 170]), "image/png")
        .unwrap();
    photo.set_lifecycle(PhotoLifecycle::Valid);
    photo
}

pub fn shade(id: &str, name: &str, source: &str, category: Option<&str>) -> ShadeDescriptor {
    ShadeDescriptor {
        id: id.into(),
        name: name.into(),
        source: source.into(),
        category: category.map(Into::into),
    }
}

pub fn reference_asset(id: &str, name: &str, region: Region, bytes: &[u8]) -> ReferenceAsset {
    let category = match region {
        Region::Lip => "lipstick",
        Region::Eye => "eyeshadow",
        Region::Skin => "foundation",
    };
    ReferenceAsset::from_bytes(
        &shade(id, name, &format!("https://cdn/{id}.jpg"), Some(category)),
        bytes.to_vec(),
    )
}

/// Shared call counter handed out by fakes.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeDetector {
    faces: Vec<BoundingBox>,
    fail_load: bool,
    fail_detect: bool,
    stall: bool,
    calls: Calls,
}

impl FakeDetector {
    pub fn with_faces(faces: Vec<BoundingBox>) -> Self {
        Self {
            faces,
            fail_load: false,
            fail_detect: false,
            stall: false,
            calls: Calls::default(),
        }
    }

    pub fn unloadable() -> Self {
        Self {
            fail_load: true,
            ..Self::with_faces(vec![])
        }
    }

    pub fn failing_detect() -> Self {
        Self {
            fail_detect: true,
            ..Self::with_faces(vec![])
        }
    }

    /// Detection never completes.
    pub fn stalled(faces: Vec<BoundingBox>) -> Self {
        Self {
            stall: true,
            ..Self::with_faces(faces)
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }
}

#[async_trait]
impl FaceDetection for FakeDetector {
    async fn load_models(&mut self, location: &str) -> Result<(), DetectionError> {
        if self.fail_load {
            return Err(DetectionError::ModelsUnavailable {
                location: location.into(),
                reason: "missing".into(),
            });
        }
        Ok(())
    }

    async fn detect_all_faces(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectionError> {
        self.calls.bump();
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.fail_detect {
            return Err(DetectionError::Failed("boom".into()));
        }
        Ok(self.faces.clone())
    }
}

/// Observes a [`FakeCamera`] after it has been boxed away.
#[derive(Clone, Default)]
pub struct CameraProbe {
    streaming: Arc<AtomicBool>,
    stops: Calls,
}

impl CameraProbe {
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.get()
    }
}

pub struct FakeCamera {
    frame: RgbImage,
    busy: bool,
    fail_capture: bool,
    start_delay: Option<Duration>,
    probe: CameraProbe,
}

impl FakeCamera {
    pub fn new(width: u32, height: u32, rgb: [u8; 3]) -> (Self, CameraProbe) {
        let probe = CameraProbe::default();
        let camera = Self {
            frame: RgbImage::from_pixel(width, height, Rgb(rgb)),
            busy: false,
            fail_capture: false,
            start_delay: None,
            probe: probe.clone(),
        };
        (camera, probe)
    }

    pub fn busy() -> (Self, CameraProbe) {
        let (mut camera, probe) = Self::new(1, 1, [0, 0, 0]);
        camera.busy = true;
        (camera, probe)
    }

    /// `start` blocks for `delay` before the stream comes up.
    pub fn slow_start(delay: Duration) -> (Self, CameraProbe) {
        let (mut camera, probe) = Self::new(1, 1, [0, 0, 0]);
        camera.start_delay = Some(delay);
        (camera, probe)
    }

    pub fn failing_capture() -> (Self, CameraProbe) {
        let (mut camera, probe) = Self::new(1, 1, [0, 0, 0]);
        camera.fail_capture = true;
        (camera, probe)
    }
}

impl CameraDevice for FakeCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        if let Some(delay) = self.start_delay {
            std::thread::sleep(delay);
        }
        if self.busy {
            return Err(CameraError::DeviceBusy);
        }
        self.probe.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        if self.fail_capture {
            return Err(CameraError::CaptureFailed("no frame".into()));
        }
        Ok(self.frame.clone())
    }

    fn stop(&mut self) {
        self.probe.streaming.store(false, Ordering::SeqCst);
        self.probe.stops.bump();
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    assets: Mutex<HashMap<String, Vec<u8>>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, locator: &str, bytes: &[u8]) -> Self {
        self.insert(locator, bytes);
        self
    }

    pub fn insert(&self, locator: &str, bytes: &[u8]) {
        self.assets.lock().unwrap().insert(locator.into(), bytes.to_vec());
    }

    pub fn fetches(&self, locator: &str) -> usize {
        self.fetches.lock().unwrap().get(locator).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        *self.fetches.lock().unwrap().entry(locator.into()).or_default() += 1;
        self.assets
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                locator: locator.into(),
                status: 404,
            })
    }
}

/// Scripted synthesis endpoint. Replies are consumed in order; a gated
/// transport holds each request until [`release`](Self::release).
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<VecDeque<SynthesisResponse>>,
    unreachable: bool,
    gated: bool,
    entered: Notify,
    gate: Notify,
    requests: Mutex<Vec<(String, Vec<FormField>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: &[u8]) -> Self {
        self.replies.lock().unwrap().push_back(SynthesisResponse {
            status,
            body: body.to_vec(),
        });
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub async fn wait_for_request(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn requests(&self) -> Vec<(String, Vec<FormField>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisTransport for FakeTransport {
    async fn post_form(
        &self,
        path: &str,
        fields: Vec<FormField>,
    ) -> Result<SynthesisResponse, TransportError> {
        self.requests.lock().unwrap().push((path.into(), fields));
        self.entered.notify_one();
        if self.gated {
            self.gate.notified().await;
        }
        if self.unreachable {
            return Err(TransportError::Request("connection refused".into()));
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Request("no scripted reply".into()))
    }
}
