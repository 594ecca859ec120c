//! Still-image encoding for captured frames.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

use crate::source::Frame;

/// JPEG quality used for captured stills.
pub const SNAPSHOT_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height} RGB")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Encode an RGB8 frame as JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.data.len() != expected {
        return Err(CaptureError::BufferSize {
            width: frame.width,
            height: frame.height,
            expected,
            actual: frame.data.len(),
        });
    }

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)?;
    Ok(buf)
}
