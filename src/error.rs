//! Error types shared across the capture, store and session layers

use thiserror::Error;

use crate::capture::Facing;

/// Failures at the hardware boundary
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Permission denied or no device matches the requested facing.
    /// Fatal to the owning session.
    #[error("camera unavailable ({facing}): {reason}")]
    CameraUnavailable { facing: Facing, reason: String },

    /// The capture loop was stopped while a stream was being acquired
    #[error("capture interrupted by stop")]
    Interrupted,

    /// The illumination aid rejected the requested state
    #[error("torch control failed: {0}")]
    Torch(String),
}

impl CaptureError {
    pub fn unavailable(facing: Facing, reason: impl Into<String>) -> Self {
        CaptureError::CameraUnavailable {
            facing,
            reason: reason.into(),
        }
    }
}

/// Failures reported by a code store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Misuse of the session lifecycle, or a fatal camera failure
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,

    #[error("session is stopped; start a fresh session")]
    Stopped,

    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error(transparent)]
    Camera(#[from] CaptureError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CaptureError::unavailable(Facing::User, "permission denied");
        assert_eq!(err.to_string(), "camera unavailable (user): permission denied");

        let err = SessionError::InvalidTransition {
            from: "Processing",
            action: "switch facing",
        };
        assert_eq!(err.to_string(), "cannot switch facing while Processing");

        let err: SessionError = CaptureError::Interrupted.into();
        assert_eq!(err.to_string(), "capture interrupted by stop");
    }
}
