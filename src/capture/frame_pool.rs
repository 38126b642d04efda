use image::RgbaImage;
use std::collections::VecDeque;

/// Reusable RGBA snapshot buffers.
///
/// The capture loop takes one buffer per tick and puts it back once the
/// decoder is done with it, so steady-state sampling never allocates.
pub(crate) struct FramePool {
    frames: VecDeque<RgbaImage>,
    capacity: usize,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Put a given frame back to the pool after it was used.
    pub fn put(&mut self, frame: RgbaImage) {
        if self.frames.len() < self.capacity {
            self.frames.push_back(frame);
        }
    }

    /// Take a writable frame of the given size, reusing a pooled one when the
    /// dimensions match. Buffers of a stale size are dropped.
    pub fn take(&mut self, w: u32, h: u32) -> RgbaImage {
        while let Some(frame) = self.frames.pop_front() {
            if frame.dimensions() == (w, h) {
                return frame;
            }
        }
        RgbaImage::new(w, h)
    }

    /// Drop every pooled buffer (e.g. after the stream changed).
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }
}
