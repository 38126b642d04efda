//! Traits for camera capture functionality

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::assets::{IDEAL_FRAME_HEIGHT, IDEAL_FRAME_WIDTH};
use crate::error::CaptureError;

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front camera, towards the user
    User,
    /// Rear camera, towards the scene
    #[default]
    Environment,
}

impl Facing {
    /// The opposite facing preference
    pub fn toggled(self) -> Self {
        match self {
            Facing::User => Facing::Environment,
            Facing::Environment => Facing::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::User => "user",
            Facing::Environment => "environment",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(Facing::User),
            "environment" | "back" | "rear" => Ok(Facing::Environment),
            other => Err(format!("unknown facing '{}'", other)),
        }
    }
}

/// Constraints passed to the device when a stream is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl CaptureRequest {
    pub fn new(facing: Facing) -> Self {
        Self {
            facing,
            ideal_width: IDEAL_FRAME_WIDTH,
            ideal_height: IDEAL_FRAME_HEIGHT,
        }
    }
}

/// Source of camera streams (the hardware boundary)
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire a video stream matching the request.
    ///
    /// Fails with [`CaptureError::CameraUnavailable`] when permission is denied
    /// or no device matches the facing preference.
    async fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// An open video stream, exclusively owned by one capture loop
pub trait CameraStream: Send {
    fn facing(&self) -> Facing;

    /// Whether the source is providing full frames yet (false while buffering)
    fn is_ready(&mut self) -> bool;

    /// Dimensions of the current frame in (width, height)
    fn resolution(&self) -> (u32, u32);

    /// Copy the current frame into `frame`, which is sized to [`resolution`].
    /// Returns false when no frame could be produced.
    ///
    /// [`resolution`]: CameraStream::resolution
    fn snapshot(&mut self, frame: &mut RgbaImage) -> bool;

    /// Capability query for the illumination aid
    fn torch_supported(&self) -> bool {
        false
    }

    fn set_torch(&mut self, _on: bool) -> Result<(), CaptureError> {
        Err(CaptureError::Torch("illumination control not supported".into()))
    }

    /// Release every track of the stream. Must be idempotent.
    fn stop(&mut self);

    /// Number of tracks still live
    fn active_tracks(&self) -> usize;
}
