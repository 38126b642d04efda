//! Frame decoding
//!
//! A [`FrameDecoder`] turns one RGBA snapshot into at most one payload string.
//! Decoders are pure and stateless: a frame without a decodable code, a
//! zero-sized frame or a truncated buffer all yield `None`, never an error.

mod qr;

pub use qr::QrFrameDecoder;

/// Bytes per pixel of the buffers handed to a decoder (RGBA8)
pub const BYTES_PER_PIXEL: usize = 4;

/// Locates and decodes one machine-readable payload in a frame
pub trait FrameDecoder: Send + Sync {
    /// Decode `pixels` (tightly packed RGBA8, `width * height * 4` bytes).
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<String>;
}

/// Length in bytes of a well-formed frame, or `None` for degenerate sizes
pub fn frame_len(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// Integer luma approximation: Y = (76*R + 150*G + 29*B) >> 8
#[inline]
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((76 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(0, 10), None);
        assert_eq!(frame_len(10, 0), None);
        assert_eq!(frame_len(3, 2), Some(24));
    }

    #[test]
    fn test_luma_bounds() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 254);
        assert!(luma(0, 255, 0) > luma(255, 0, 0));
    }
}
