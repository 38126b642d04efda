//! Camera scan capture and first-scan arbitration for single-use codes.
//!
//! A [`ScanSession`] samples a camera through a [`CaptureLoop`], decodes
//! frames with a [`FrameDecoder`] and hands each payload to a
//! [`RedemptionCoordinator`], which decides through a [`CodeStore`] whether
//! this is the first scan of the code.

pub mod assets;
pub mod capture;
pub mod config;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod redeem;

#[cfg(test)]
mod testing;

pub use capture::{CaptureDevice, CaptureLoop, Facing, StillImageDevice};
pub use config::Config;
pub use decoder::{FrameDecoder, QrFrameDecoder};
pub use error::{CaptureError, SessionError, StoreError};
pub use pipeline::{ScanHealth, ScanSession, SessionState};
pub use redeem::{CodeStore, JsonFileCodeStore, MemoryCodeStore, RedemptionCoordinator, ScanOutcome};
