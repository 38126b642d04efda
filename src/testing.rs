//! Fakes shared by the unit tests

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use crate::capture::{CameraStream, CaptureDevice, CaptureRequest, Facing};
use crate::decoder::FrameDecoder;
use crate::error::{CaptureError, StoreError};
use crate::redeem::{CodeRecord, CodeStore, MemoryCodeStore, Redemption};

/// Observations shared between a fake camera and its streams
#[derive(Debug, Default)]
pub struct CameraStats {
    acquisitions: AtomicUsize,
    live_tracks: AtomicUsize,
    last_facing: Mutex<Option<Facing>>,
    torch_on: Mutex<bool>,
}

impl CameraStats {
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    pub fn last_facing(&self) -> Option<Facing> {
        *self.last_facing.lock()
    }

    pub fn torch_on(&self) -> bool {
        *self.torch_on.lock()
    }
}

pub struct FakeCamera {
    stats: Arc<CameraStats>,
    facings: Vec<Facing>,
    torch: bool,
    warmup: u32,
    acquire_delay: Option<Duration>,
    faulty_sensor: bool,
}

impl FakeCamera {
    /// Both facings available, no torch, frames ready immediately
    pub fn new() -> Self {
        Self {
            stats: Arc::new(CameraStats::default()),
            facings: vec![Facing::User, Facing::Environment],
            torch: false,
            warmup: 0,
            acquire_delay: None,
            faulty_sensor: false,
        }
    }

    pub fn with_facings(mut self, facings: &[Facing]) -> Self {
        self.facings = facings.to_vec();
        self
    }

    pub fn with_torch(mut self) -> Self {
        self.torch = true;
        self
    }

    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup = frames;
        self
    }

    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = Some(delay);
        self
    }

    /// Streams panic on every snapshot
    pub fn with_faulty_sensor(mut self) -> Self {
        self.faulty_sensor = true;
        self
    }

    pub fn stats(&self) -> Arc<CameraStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl CaptureDevice for FakeCamera {
    async fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CameraStream>, CaptureError> {
        if let Some(delay) = self.acquire_delay {
            tokio::time::sleep(delay).await;
        }
        if !self.facings.contains(&request.facing) {
            return Err(CaptureError::unavailable(request.facing, "no device matches"));
        }
        self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.stats.live_tracks.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_facing.lock() = Some(request.facing);
        *self.stats.torch_on.lock() = false;

        Ok(Box::new(FakeStream {
            stats: Arc::clone(&self.stats),
            facing: request.facing,
            live: true,
            warmup: self.warmup,
            torch: self.torch,
            faulty: self.faulty_sensor,
        }))
    }
}

struct FakeStream {
    stats: Arc<CameraStats>,
    facing: Facing,
    live: bool,
    warmup: u32,
    torch: bool,
    faulty: bool,
}

impl CameraStream for FakeStream {
    fn facing(&self) -> Facing {
        self.facing
    }

    fn is_ready(&mut self) -> bool {
        if self.warmup > 0 {
            self.warmup -= 1;
            return false;
        }
        self.live
    }

    fn resolution(&self) -> (u32, u32) {
        (8, 8)
    }

    fn snapshot(&mut self, frame: &mut RgbaImage) -> bool {
        if self.faulty {
            panic!("sensor fault");
        }
        for pixel in frame.pixels_mut() {
            *pixel = Rgba([128, 128, 128, 255]);
        }
        self.live
    }

    fn torch_supported(&self) -> bool {
        self.torch
    }

    fn set_torch(&mut self, on: bool) -> Result<(), CaptureError> {
        if !self.torch {
            return Err(CaptureError::Torch("unsupported".into()));
        }
        *self.stats.torch_on.lock() = on;
        Ok(())
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.stats.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn active_tracks(&self) -> usize {
        self.live as usize
    }
}

/// Decoder replaying a script of results, then a fallback
pub struct ScriptedDecoder {
    script: Mutex<VecDeque<Option<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedDecoder {
    pub fn new(script: &[Option<&str>], fallback: Option<&str>) -> Self {
        Self {
            script: Mutex::new(script.iter().map(|s| s.map(str::to_string)).collect()),
            fallback: fallback.map(str::to_string),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Never finds a code
    pub fn never() -> Self {
        Self::new(&[], None)
    }

    /// Finds `payload` in every frame
    pub fn always(payload: &str) -> Self {
        Self::new(&[], Some(payload))
    }

    /// Block the calling thread this long inside every decode
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(&self, _pixels: &[u8], _width: u32, _height: u32) -> Option<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let result = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Render `payload` as a QR code with 4 px modules and a 4-module quiet zone
pub fn qr_frame(payload: &str) -> RgbaImage {
    const SCALE: u32 = 4;
    const QUIET: u32 = 4;

    let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET) * SCALE;

    RgbaImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / SCALE, y / SCALE);
        let inside = (QUIET..QUIET + modules).contains(&mx) && (QUIET..QUIET + modules).contains(&my);
        let dark = inside && colors[((my - QUIET) * modules + (mx - QUIET)) as usize] == qrcode::Color::Dark;
        if dark { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
    })
}

pub struct PanickingDecoder;

impl FrameDecoder for PanickingDecoder {
    fn decode(&self, _pixels: &[u8], _width: u32, _height: u32) -> Option<String> {
        panic!("corrupt frame");
    }
}

/// Store whose redemption primitive always fails
#[derive(Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeStore for FailingStore {
    async fn find_code(&self, _id: &str) -> Result<Option<CodeRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn redeem_if_unredeemed(&self, _id: &str) -> Result<Redemption, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn list_codes(&self) -> Result<Vec<CodeRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// In-memory store that parks every redemption until released
pub struct GatedStore {
    inner: MemoryCodeStore,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedStore {
    pub fn with_codes(ids: &[&str]) -> Self {
        Self {
            inner: MemoryCodeStore::with_codes(ids.iter().copied()),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl CodeStore for GatedStore {
    async fn find_code(&self, id: &str) -> Result<Option<CodeRecord>, StoreError> {
        self.inner.find_code(id).await
    }

    async fn redeem_if_unredeemed(&self, id: &str) -> Result<Redemption, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.redeem_if_unredeemed(id).await
    }

    async fn list_codes(&self) -> Result<Vec<CodeRecord>, StoreError> {
        self.inner.list_codes().await
    }
}
