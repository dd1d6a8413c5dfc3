//! A deterministic in-memory stand-in for the real PNG/JPEG/WebP codecs,
//! which live outside this crate's scope. Rather than encoding anything,
//! it tags each payload with the format and pixel count so tests can
//! assert on which encoding a rectangle took without depending on any
//! actual image library.

use gw_display::{EncodeError, ImageEncoder, PixelBuffer};

pub struct FakeEncoder;

fn tagged(tag: &str, image: &PixelBuffer) -> Vec<u8> {
    format!("{tag}:{}x{}", image.width(), image.height()).into_bytes()
}

impl ImageEncoder for FakeEncoder {
    fn encode_png(&self, image: &PixelBuffer) -> Result<Vec<u8>, EncodeError> {
        Ok(tagged("png", image))
    }

    fn encode_jpeg(&self, image: &PixelBuffer, _quality: u8) -> Result<Vec<u8>, EncodeError> {
        Ok(tagged("jpeg", image))
    }

    fn encode_webp(&self, image: &PixelBuffer, _quality: u8) -> Result<Vec<u8>, EncodeError> {
        Ok(tagged("webp", image))
    }
}

/// An encoder whose PNG path always fails, for exercising the
/// encode-failure logging paths without needing a real broken codec.
pub struct FailingEncoder;

impl ImageEncoder for FailingEncoder {
    fn encode_png(&self, _image: &PixelBuffer) -> Result<Vec<u8>, EncodeError> {
        Err(EncodeError::Rejected("fake encoder always fails".into()))
    }

    fn encode_jpeg(&self, _image: &PixelBuffer, _quality: u8) -> Result<Vec<u8>, EncodeError> {
        Err(EncodeError::Rejected("fake encoder always fails".into()))
    }

    fn encode_webp(&self, _image: &PixelBuffer, _quality: u8) -> Result<Vec<u8>, EncodeError> {
        Err(EncodeError::Rejected("fake encoder always fails".into()))
    }
}
