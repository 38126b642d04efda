use log::{debug, trace};

use super::{BYTES_PER_PIXEL, FrameDecoder, frame_len, luma};

/// QR code decoder backed by `rqrr`
///
/// The frame is converted to luma on the fly while the detector samples it,
/// then every detected grid is tried until one decodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrFrameDecoder;

impl QrFrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for QrFrameDecoder {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<String> {
        let expected = frame_len(width, height)?;
        if pixels.len() < expected {
            debug!(
                "QrFrameDecoder: truncated frame ({} of {} bytes)",
                pixels.len(),
                expected
            );
            return None;
        }

        let stride = width as usize * BYTES_PER_PIXEL;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                let i = y * stride + x * BYTES_PER_PIXEL;
                luma(pixels[i], pixels[i + 1], pixels[i + 2])
            });

        let grids = prepared.detect_grids();
        trace!("QrFrameDecoder: {} candidate grids", grids.len());

        grids.iter().find_map(|grid| match grid.decode() {
            Ok((_meta, content)) => Some(content),
            Err(e) => {
                debug!("QrFrameDecoder: grid rejected: {:?}", e);
                None
            }
        })
    }
}
