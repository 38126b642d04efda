//! Camera capture module
//!
//! The hardware boundary ([`CaptureDevice`] / [`CameraStream`]) plus the
//! [`CaptureLoop`] that samples an open stream on a timer. [`StillImageDevice`]
//! is a file-backed device for running without a physical camera.

mod capture_loop;
mod frame_pool;
mod still;
mod traits;

pub use capture_loop::{CaptureLoop, Detection, SkipReason, TickOutcome};
pub use still::StillImageDevice;
pub use traits::{CameraStream, CaptureDevice, CaptureRequest, Facing};
