//! Still-image capture device
//!
//! Replays image files as if they were a camera feed. Each facing has its own
//! list of frames; a facing without frames behaves like a missing camera.

use async_trait::async_trait;
use image::RgbaImage;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::traits::{CameraStream, CaptureDevice, CaptureRequest, Facing};
use crate::assets::{DEFAULT_WARMUP_FRAMES, STILL_IMAGE_EXTENSIONS};
use crate::error::CaptureError;

/// Capture device backed by image files on disk
#[derive(Debug, Clone)]
pub struct StillImageDevice {
    frames: HashMap<Facing, Vec<PathBuf>>,
    warmup: u32,
}

impl Default for StillImageDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl StillImageDevice {
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            warmup: DEFAULT_WARMUP_FRAMES,
        }
    }

    /// Serve `paths` (in order, looping) for the given facing
    pub fn with_frames<I, P>(mut self, facing: Facing, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.frames
            .entry(facing)
            .or_default()
            .extend(paths.into_iter().map(Into::into));
        self
    }

    /// Serve every image file in `dir`, sorted by name
    pub fn from_dir(self, facing: Facing, dir: &Path) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_still_image(path))
            .collect();
        paths.sort();
        debug!("StillImageDevice: {} frames in {}", paths.len(), dir.display());
        Ok(self.with_frames(facing, paths))
    }

    /// Number of snapshots the stream withholds before reporting full frames
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup = frames;
        self
    }

    pub fn facings(&self) -> Vec<Facing> {
        let mut facings: Vec<Facing> = self
            .frames
            .iter()
            .filter(|(_, paths)| !paths.is_empty())
            .map(|(facing, _)| *facing)
            .collect();
        facings.sort_by_key(|f| f.as_str());
        facings
    }
}

fn is_still_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                STILL_IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
}

fn load_frames(paths: &[PathBuf]) -> Result<Vec<RgbaImage>, String> {
    paths
        .iter()
        .map(|path| {
            image::open(path)
                .map(|img| img.to_rgba8())
                .map_err(|e| format!("{}: {}", path.display(), e))
        })
        .collect()
}

#[async_trait]
impl CaptureDevice for StillImageDevice {
    async fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CameraStream>, CaptureError> {
        let facing = request.facing;
        let paths = match self.frames.get(&facing) {
            Some(paths) if !paths.is_empty() => paths.clone(),
            _ => return Err(CaptureError::unavailable(facing, "no frames for this facing")),
        };

        let frames = tokio::task::spawn_blocking(move || load_frames(&paths))
            .await
            .map_err(|e| CaptureError::unavailable(facing, e.to_string()))?
            .map_err(|e| {
                warn!("StillImageDevice: {}", e);
                CaptureError::unavailable(facing, e)
            })?;

        info!(
            "StillImageDevice: opened {} stream with {} frames (ideal {}x{})",
            facing,
            frames.len(),
            request.ideal_width,
            request.ideal_height
        );

        Ok(Box::new(StillImageStream {
            facing,
            frames,
            cursor: 0,
            warmup: self.warmup,
            live: true,
        }))
    }
}

struct StillImageStream {
    facing: Facing,
    frames: Vec<RgbaImage>,
    cursor: usize,
    warmup: u32,
    live: bool,
}

impl StillImageStream {
    fn current(&self) -> Option<&RgbaImage> {
        self.frames.get(self.cursor % self.frames.len().max(1))
    }
}

impl CameraStream for StillImageStream {
    fn facing(&self) -> Facing {
        self.facing
    }

    fn is_ready(&mut self) -> bool {
        if !self.live {
            return false;
        }
        if self.warmup > 0 {
            self.warmup -= 1;
            return false;
        }
        true
    }

    fn resolution(&self) -> (u32, u32) {
        self.current().map_or((0, 0), |frame| frame.dimensions())
    }

    fn snapshot(&mut self, frame: &mut RgbaImage) -> bool {
        if !self.live {
            return false;
        }
        let Some(source) = self.current() else {
            return false;
        };
        if source.dimensions() != frame.dimensions() {
            return false;
        }
        frame.copy_from_slice(source.as_raw());
        self.cursor = self.cursor.wrapping_add(1);
        true
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            debug!("StillImageStream: {} track stopped", self.facing);
        }
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn write_png(dir: &Path, name: &str, w: u32, h: u32, shade: u8) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(w, h, Rgba([shade, shade, shade, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_frames_cycle_after_warmup() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 4, 3, 10);
        let b = write_png(dir.path(), "b.png", 4, 3, 200);

        let device = StillImageDevice::new()
            .with_warmup(1)
            .with_frames(Facing::Environment, [a, b]);
        let mut stream = device.acquire(CaptureRequest::new(Facing::Environment)).await.unwrap();

        assert_eq!(stream.facing(), Facing::Environment);
        assert!(!stream.is_ready());
        assert!(stream.is_ready());
        assert_eq!(stream.resolution(), (4, 3));

        let mut frame = RgbaImage::new(4, 3);
        let shades: Vec<u8> = (0..3)
            .map(|_| {
                assert!(stream.snapshot(&mut frame));
                frame.get_pixel(0, 0)[0]
            })
            .collect();
        assert_eq!(shades, vec![10, 200, 10]);

        assert_eq!(stream.active_tracks(), 1);
        stream.stop();
        assert_eq!(stream.active_tracks(), 0);
        assert!(!stream.snapshot(&mut frame));
        assert!(!stream.torch_supported());
    }

    #[tokio::test]
    async fn test_missing_facing_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 2, 2, 0);
        let device = StillImageDevice::new().with_frames(Facing::User, [a]);

        let err = device
            .acquire(CaptureRequest::new(Facing::Environment))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::CameraUnavailable { facing: Facing::Environment, .. }));
        assert_eq!(device.facings(), vec![Facing::User]);
    }

    #[tokio::test]
    async fn test_unreadable_frame_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"not an image").unwrap();

        let device = StillImageDevice::new().with_frames(Facing::User, [bogus]);
        let result = device.acquire(CaptureRequest::new(Facing::User)).await;
        assert!(matches!(result, Err(CaptureError::CameraUnavailable { .. })));
    }

    #[test]
    fn test_from_dir_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 1, 1, 0);
        std::fs::write(dir.path().join("a.PNG"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let device = StillImageDevice::new().from_dir(Facing::Environment, dir.path()).unwrap();
        let names: Vec<_> = device.frames[&Facing::Environment]
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
    }
}
