use std::time::Duration;

/// Reference sampling cadence of the capture loop.
pub const SCAN_INTERVAL_MS: u64 = 300;
pub const SCAN_INTERVAL: Duration = Duration::from_millis(SCAN_INTERVAL_MS);
/// Shortest sampling period the capture loop accepts.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(1);

// capture constraints requested from the device
pub const IDEAL_FRAME_WIDTH: u32 = 1280;
pub const IDEAL_FRAME_HEIGHT: u32 = 720;

/// Frames a still-image stream withholds before it reports full frames.
pub const DEFAULT_WARMUP_FRAMES: u32 = 2;

// code urls
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";
pub const SCAN_PATH: &str = "scan";

pub const STILL_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];
