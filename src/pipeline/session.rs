//! Scan session
//!
//! Drives a [`CaptureLoop`] and a [`RedemptionCoordinator`] through the
//! user-facing lifecycle: start, pause on detection, resume, hard stop.
//!
//! A redemption runs on its own task and publishes its outcome into the
//! shared session state when it completes. Neither [`ScanSession::stop`] nor
//! a caller dropping [`ScanSession::next_outcome`] interrupts a store call.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::health::ScanHealth;
use super::state::SessionState;
use crate::capture::{CaptureDevice, CaptureLoop, Detection, Facing};
use crate::decoder::FrameDecoder;
use crate::error::{CaptureError, SessionError};
use crate::redeem::{RedemptionCoordinator, ScanOutcome};

/// Session state reachable from redemption tasks
struct Shared {
    state: Mutex<SessionState>,
    last_outcome: Mutex<Option<ScanOutcome>>,
    health: Arc<ScanHealth>,
    shutdown: CancellationToken,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn transition(&self, target: SessionState) -> bool {
        let mut state = self.state.lock();
        if state.can_transition_to(&target) {
            debug!("ScanSession: {} -> {}", *state, target);
            *state = target;
            true
        } else {
            false
        }
    }

    /// `Scanning → Detected`; hands back the current state otherwise
    fn accept_detection(&self) -> Result<(), SessionState> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Scanning { .. } => {
                *state = SessionState::detected();
                debug!("ScanSession: Scanning -> {}", *state);
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Publish a finished redemption (`Processing → Detected`).
    /// Returns `None` when the session stopped in the meantime.
    fn settle(&self, outcome: ScanOutcome) -> Option<ScanOutcome> {
        let mut state = self.state.lock();
        if self.shutdown.is_cancelled() || *state != SessionState::Processing {
            debug!("ScanSession: redemption finished while {}, outcome discarded", *state);
            return None;
        }
        *state = SessionState::detected();
        self.health.record_outcome(&outcome);
        *self.last_outcome.lock() = Some(outcome.clone());
        info!("ScanSession: {}", outcome.message());
        Some(outcome)
    }
}

/// Detection queue plus the redemption whose outcome no caller has taken yet
struct Consumer {
    detections: mpsc::UnboundedReceiver<Detection>,
    settling: Option<JoinHandle<Option<ScanOutcome>>>,
}

/// One scanning session over one camera
///
/// All methods take `&self`; share the session through an `Arc` to stop it
/// from another task while [`next_outcome`](Self::next_outcome) is pending.
pub struct ScanSession {
    capture: CaptureLoop,
    consumer: tokio::sync::Mutex<Consumer>,
    coordinator: Arc<RedemptionCoordinator>,
    shared: Arc<Shared>,
    facing: Mutex<Facing>,
    torch_on: AtomicBool,
    started: AtomicBool,
}

impl ScanSession {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        decoder: Arc<dyn FrameDecoder>,
        coordinator: Arc<RedemptionCoordinator>,
    ) -> Self {
        let health = Arc::new(ScanHealth::new());
        let (capture, detections) = CaptureLoop::new(device, decoder, health.clone());

        Self {
            capture,
            consumer: tokio::sync::Mutex::new(Consumer {
                detections,
                settling: None,
            }),
            coordinator,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::Idle),
                last_outcome: Mutex::new(None),
                health,
                shutdown: CancellationToken::new(),
            }),
            facing: Mutex::new(Facing::default()),
            torch_on: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    /// Configure the sampling interval
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.capture.set_period(interval);
        self
    }

    /// Configure the initial facing preference
    pub fn with_facing(self, facing: Facing) -> Self {
        *self.facing.lock() = facing;
        self
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn facing(&self) -> Facing {
        *self.facing.lock()
    }

    pub fn health(&self) -> &Arc<ScanHealth> {
        &self.shared.health
    }

    pub fn capture(&self) -> &CaptureLoop {
        &self.capture
    }

    pub fn coordinator(&self) -> &Arc<RedemptionCoordinator> {
        &self.coordinator
    }

    /// The outcome currently on display, if any
    pub fn last_outcome(&self) -> Option<ScanOutcome> {
        self.shared.last_outcome.lock().clone()
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on.load(Ordering::SeqCst)
    }

    /// Acquire the camera and begin sampling (`Idle → Scanning`).
    ///
    /// A camera failure is fatal: the session ends up `Stopped`.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.state().is_stopped() {
            return Err(SessionError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyStarted);
        }

        // sampling starts only once the session is Scanning
        match self.capture.open(self.facing()).await {
            Ok(()) => {
                if !self.shared.transition(SessionState::scanning()) {
                    // stopped between acquisition and now
                    self.capture.stop();
                    return Err(SessionError::Stopped);
                }
                if !self.capture.resume() {
                    return Err(SessionError::Stopped);
                }
                info!("ScanSession: scanning ({})", self.facing());
                Ok(())
            }
            Err(CaptureError::Interrupted) => Err(SessionError::Stopped),
            Err(e) => {
                error!("ScanSession: {}", e);
                self.stop();
                Err(e.into())
            }
        }
    }

    /// Wait for the next detection and redeem it.
    ///
    /// Returns `None` once the session is stopped. An outcome whose
    /// redemption was still in flight when the session stopped is discarded.
    ///
    /// Cancel safe: if the returned future is dropped mid-redemption, the
    /// redemption still completes, the session still settles in `Detected`,
    /// and the outcome is returned by the next call.
    pub async fn next_outcome(&self) -> Option<ScanOutcome> {
        let mut consumer = self.consumer.lock().await;

        loop {
            if let Some(settling) = consumer.settling.as_mut() {
                let joined = tokio::select! {
                    _ = self.shared.shutdown.cancelled() => return None,
                    joined = settling => joined,
                };
                consumer.settling = None;
                return match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("ScanSession: redemption task failed: {}", e);
                        None
                    }
                };
            }
            if self.state().is_stopped() {
                return None;
            }

            let detection = tokio::select! {
                _ = self.shared.shutdown.cancelled() => return None,
                detection = consumer.detections.recv() => detection?,
            };
            if detection.epoch != self.capture.epoch() {
                self.shared.health.record_stale_detection();
                debug!("ScanSession: dropping detection from epoch {}", detection.epoch);
                continue;
            }
            match self.shared.accept_detection() {
                Ok(()) => {}
                Err(SessionState::Stopped) => return None,
                Err(state) => {
                    // the loop was sampling when this fired; put it back
                    self.shared.health.record_stale_detection();
                    warn!("ScanSession: detection while {}, dropped and sampling re-armed", state);
                    self.capture.resume();
                    continue;
                }
            }

            info!("ScanSession: code detected");
            if !self.shared.transition(SessionState::Processing) {
                return None;
            }
            consumer.settling = Some(self.spawn_redemption(detection.payload));
        }
    }

    fn spawn_redemption(&self, payload: String) -> JoinHandle<Option<ScanOutcome>> {
        let coordinator = Arc::clone(&self.coordinator);
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let redemption = tokio::spawn(async move { coordinator.process(&payload).await });
            let outcome = redemption.await.unwrap_or_else(|e| {
                ScanOutcome::Failure(format!("redemption task failed: {}", e))
            });
            shared.settle(outcome)
        })
    }

    /// Clear the held outcome and restart sampling (`Detected → Scanning`).
    /// A no-op while already scanning.
    pub fn resume(&self) -> Result<(), SessionError> {
        {
            let mut state = self.shared.state.lock();
            match *state {
                SessionState::Scanning { .. } => return Ok(()),
                SessionState::Detected { .. } => *state = SessionState::scanning(),
                SessionState::Stopped => return Err(SessionError::Stopped),
                other => {
                    return Err(SessionError::InvalidTransition {
                        from: other.description(),
                        action: "resume",
                    });
                }
            }
        }

        *self.shared.last_outcome.lock() = None;
        if !self.capture.resume() {
            warn!("ScanSession: resumed without an open stream");
        }
        info!("ScanSession: scanning resumed");
        Ok(())
    }

    /// Release the camera and end the session. Terminal, safe from any
    /// state and safe to call repeatedly.
    pub fn stop(&self) {
        self.shared.shutdown.cancel();
        self.capture.stop();
        self.torch_on.store(false, Ordering::SeqCst);

        let previous = std::mem::replace(&mut *self.shared.state.lock(), SessionState::Stopped);
        if !previous.is_stopped() {
            info!("ScanSession: stopped from {}. {}", previous, self.shared.health.summary());
        }
    }

    /// Flip the facing preference. While a stream is open it is re-acquired
    /// with the new facing; the held outcome is cleared and the torch resets.
    pub async fn switch_facing(&self) -> Result<Facing, SessionError> {
        let state = self.state();
        match state {
            SessionState::Idle => {
                let mut facing = self.facing.lock();
                *facing = facing.toggled();
                Ok(*facing)
            }
            SessionState::Scanning { .. } | SessionState::Detected { .. } => {
                self.torch_on.store(false, Ordering::SeqCst);
                *self.shared.last_outcome.lock() = None;

                match self.capture.switch_facing(state.is_scanning()).await {
                    Ok(facing) => {
                        *self.facing.lock() = facing;
                        if self.state().is_stopped() {
                            return Err(SessionError::Stopped);
                        }
                        info!("ScanSession: switched to {} camera", facing);
                        Ok(facing)
                    }
                    Err(CaptureError::Interrupted) => Err(SessionError::Stopped),
                    Err(e) => {
                        error!("ScanSession: {}", e);
                        self.stop();
                        Err(e.into())
                    }
                }
            }
            SessionState::Stopped => Err(SessionError::Stopped),
            SessionState::Processing => Err(SessionError::InvalidTransition {
                from: state.description(),
                action: "switch camera",
            }),
        }
    }

    /// Whether the open stream offers an illumination aid
    pub fn torch_supported(&self) -> bool {
        self.capture.torch_supported()
    }

    /// Flip the illumination aid and return its new state.
    /// Without support (or without an open stream) this is a no-op returning `false`.
    pub fn toggle_torch(&self) -> Result<bool, SessionError> {
        let state = self.state();
        if state.is_stopped() {
            return Err(SessionError::Stopped);
        }
        if !state.allows_device_controls() {
            return Err(SessionError::InvalidTransition {
                from: state.description(),
                action: "toggle torch",
            });
        }
        if !self.capture.torch_supported() {
            return Ok(false);
        }

        let next = !self.torch_on();
        self.capture.set_torch(next)?;
        self.torch_on.store(next, Ordering::SeqCst);
        debug!("ScanSession: torch {}", if next { "on" } else { "off" });
        Ok(next)
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
    }
}
