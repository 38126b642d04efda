//! Capture loop for the scan pipeline
//!
//! Owns one camera stream, samples it on a repeating timer and hands at most
//! one decoded payload upward before suspending itself.
//!
//! # Ordering
//!
//! Every tick runs under the sampler lock, so at most one decode is in flight.
//! When a tick finds a payload it marks the sampler as pending (no further
//! decode until [`CaptureLoop::resume`]) and cancels the timer *before* the
//! payload is sent, so one physical scan can never produce two redemptions.
//!
//! Each stream (re)acquisition and each stop bumps an epoch. Detections carry
//! the epoch they were produced in, letting the consumer drop stale ones.

use image::RgbaImage;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::frame_pool::FramePool;
use super::traits::{CameraStream, CaptureDevice, CaptureRequest, Facing};
use crate::assets::{MIN_SCAN_INTERVAL, SCAN_INTERVAL};
use crate::decoder::FrameDecoder;
use crate::error::CaptureError;
use crate::pipeline::ScanHealth;

/// Why a tick did not reach the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No stream is open
    NoStream,
    /// The source is not yet providing full frames
    Buffering,
    /// A previous detection has not been released by `resume`
    DetectionPending,
}

/// Result of one sampling tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// Frame decoded, no code in it
    NoResult,
    Detected(String),
}

/// A payload handed up by the capture loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub payload: String,
    pub epoch: u64,
}

struct Sampler {
    stream: Option<Box<dyn CameraStream>>,
    decoder: Arc<dyn FrameDecoder>,
    pool: FramePool,
    pending: bool,
    health: Arc<ScanHealth>,
}

impl Sampler {
    fn tick(&mut self) -> TickOutcome {
        let Some(stream) = self.stream.as_mut() else {
            return TickOutcome::Skipped(SkipReason::NoStream);
        };
        if self.pending {
            self.health.record_busy_skip();
            return TickOutcome::Skipped(SkipReason::DetectionPending);
        }
        if !stream.is_ready() {
            self.health.record_buffering_skip();
            return TickOutcome::Skipped(SkipReason::Buffering);
        }

        let (w, h) = stream.resolution();
        let mut frame = self.pool.take(w, h);
        let captured = stream.snapshot(&mut frame);
        self.health.record_tick();

        let payload = if captured {
            decode_contained(self.decoder.as_ref(), &frame, &self.health)
        } else {
            None
        };
        self.pool.put(frame);

        match payload {
            Some(payload) if !payload.is_empty() => {
                self.pending = true;
                self.health.record_detection();
                TickOutcome::Detected(payload)
            }
            _ => {
                self.health.record_decode_miss();
                TickOutcome::NoResult
            }
        }
    }

    /// Close the stream, if any. Returns whether one was open.
    fn release(&mut self) -> bool {
        self.pending = false;
        self.pool.clear();
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                true
            }
            None => false,
        }
    }
}

/// Run the decoder, treating a panic as "no code found"
fn decode_contained(
    decoder: &dyn FrameDecoder,
    frame: &RgbaImage,
    health: &ScanHealth,
) -> Option<String> {
    let (w, h) = frame.dimensions();
    match catch_unwind(AssertUnwindSafe(|| decoder.decode(frame.as_raw(), w, h))) {
        Ok(payload) => payload,
        Err(_) => {
            health.record_decoder_panic();
            error!("CaptureLoop: decoder panicked on a {}x{} frame, skipping it", w, h);
            None
        }
    }
}

/// The running sampling task
struct SamplingTimer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SamplingTimer {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

/// Camera stream lifecycle plus periodic sampling
pub struct CaptureLoop {
    device: Arc<dyn CaptureDevice>,
    sampler: Arc<Mutex<Sampler>>,
    timer: Mutex<Option<SamplingTimer>>,
    facing: Mutex<Facing>,
    epoch: AtomicU64,
    period: Duration,
    detections: mpsc::UnboundedSender<Detection>,
}

impl CaptureLoop {
    /// Create a capture loop and the channel its detections arrive on
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        decoder: Arc<dyn FrameDecoder>,
        health: Arc<ScanHealth>,
    ) -> (Self, mpsc::UnboundedReceiver<Detection>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sampler = Sampler {
            stream: None,
            decoder,
            pool: FramePool::new(2),
            pending: false,
            health,
        };

        let capture = Self {
            device,
            sampler: Arc::new(Mutex::new(sampler)),
            timer: Mutex::new(None),
            facing: Mutex::new(Facing::default()),
            epoch: AtomicU64::new(0),
            period: SCAN_INTERVAL,
            detections: tx,
        };
        (capture, rx)
    }

    /// Configure the sampling interval
    pub fn with_period(mut self, period: Duration) -> Self {
        self.set_period(period);
        self
    }

    /// Takes effect the next time sampling (re)starts.
    /// Periods shorter than [`MIN_SCAN_INTERVAL`] are raised to it.
    pub fn set_period(&mut self, period: Duration) {
        if period < MIN_SCAN_INTERVAL {
            warn!("CaptureLoop: sampling period {:?} too short, using {:?}", period, MIN_SCAN_INTERVAL);
        }
        self.period = period.max(MIN_SCAN_INTERVAL);
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Facing of the current (or last requested) stream
    pub fn facing(&self) -> Facing {
        *self.facing.lock()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Acquire a stream with the given facing and start sampling
    pub async fn start(&self, facing: Facing) -> Result<(), CaptureError> {
        self.acquire(facing, true).await
    }

    /// Acquire a stream without sampling it; [`resume`](Self::resume)
    /// starts the timer.
    pub async fn open(&self, facing: Facing) -> Result<(), CaptureError> {
        self.acquire(facing, false).await
    }

    async fn acquire(&self, facing: Facing, sample: bool) -> Result<(), CaptureError> {
        let ticket = self.epoch();
        *self.facing.lock() = facing;
        let mut stream = self.device.acquire(CaptureRequest::new(facing)).await?;

        let epoch = {
            let mut sampler = self.sampler.lock();
            if self.epoch() != ticket {
                // stopped or re-acquired while the device was opening
                stream.stop();
                debug!("CaptureLoop: acquisition superseded, stream released");
                return Err(CaptureError::Interrupted);
            }
            sampler.release();
            sampler.stream = Some(stream);
            self.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };
        info!("CaptureLoop: camera acquired ({})", facing);

        if sample {
            self.spawn_timer(epoch);
        }
        Ok(())
    }

    /// Tear down the stream and re-acquire it with the opposite facing.
    /// Any detection in flight is dropped.
    pub async fn switch_facing(&self, resume_sampling: bool) -> Result<Facing, CaptureError> {
        let next = self.facing().toggled();
        self.stop();
        info!("CaptureLoop: switching camera to {}", next);
        self.acquire(next, resume_sampling).await?;
        Ok(next)
    }

    /// Clear a pending detection and restart the timer.
    /// Returns false when there is no stream to sample.
    pub fn resume(&self) -> bool {
        let epoch = {
            let mut sampler = self.sampler.lock();
            if sampler.stream.is_none() {
                return false;
            }
            sampler.pending = false;
            self.epoch()
        };
        self.spawn_timer(epoch);
        true
    }

    /// Cancel the sampling timer; the stream stays open
    pub fn suspend(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel.cancel();
        }
    }

    /// Cancel the timer and release every camera track.
    /// Safe to call repeatedly and from any state.
    pub fn stop(&self) {
        self.suspend();
        let released = {
            let mut sampler = self.sampler.lock();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            sampler.release()
        };
        if released {
            info!("CaptureLoop: camera released");
        }
    }

    /// Run one sampling step now, outside the timer
    pub fn tick(&self) -> TickOutcome {
        let outcome = self.sampler.lock().tick();
        if let TickOutcome::Detected(payload) = &outcome {
            self.suspend();
            let detection = Detection {
                payload: payload.clone(),
                epoch: self.epoch(),
            };
            if self.detections.send(detection).is_err() {
                debug!("CaptureLoop: detection dropped, nobody is listening");
            }
        }
        outcome
    }

    /// Whether a timer task is alive and not cancelled
    pub fn is_sampling(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(SamplingTimer::is_live)
    }

    pub fn has_stream(&self) -> bool {
        self.sampler.lock().stream.is_some()
    }

    /// Live tracks of the open stream (0 when none is open)
    pub fn active_tracks(&self) -> usize {
        self.sampler
            .lock()
            .stream
            .as_ref()
            .map_or(0, |stream| stream.active_tracks())
    }

    /// Whether the open stream offers an illumination aid
    pub fn torch_supported(&self) -> bool {
        self.sampler
            .lock()
            .stream
            .as_ref()
            .is_some_and(|stream| stream.torch_supported())
    }

    pub fn set_torch(&self, on: bool) -> Result<(), CaptureError> {
        match self.sampler.lock().stream.as_mut() {
            Some(stream) => stream.set_torch(on),
            None => Err(CaptureError::Torch("no open stream".into())),
        }
    }

    fn spawn_timer(&self, epoch: u64) {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let sampler = Arc::clone(&self.sampler);
        let detections = self.detections.clone();
        let period = self.period;
        debug!("CaptureLoop: sampling every {:?}", period);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let outcome = {
                    let mut sampler = sampler.lock();
                    // stop() may have won the race for the lock
                    if cancel.is_cancelled() {
                        break;
                    }
                    sampler.tick()
                };

                match outcome {
                    TickOutcome::Detected(payload) => {
                        cancel.cancel();
                        debug!("CaptureLoop: payload detected, sampling suspended");
                        if detections.send(Detection { payload, epoch }).is_err() {
                            debug!("CaptureLoop: detection dropped, nobody is listening");
                        }
                        break;
                    }
                    TickOutcome::NoResult => trace!("CaptureLoop: no code in frame"),
                    TickOutcome::Skipped(reason) => trace!("CaptureLoop: tick skipped ({:?})", reason),
                }
            }
        });
        *timer = Some(SamplingTimer { cancel: token, task });
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
