use crate::error::EncodeError;
use crate::pixels::PixelBuffer;

/// Boundary trait for the PNG/JPEG/WebP codecs, which are out of scope for
/// this crate — only the encoding *choice* lives here.
pub trait ImageEncoder: Send + Sync {
    fn encode_png(&self, image: &PixelBuffer) -> Result<Vec<u8>, EncodeError>;
    fn encode_jpeg(&self, image: &PixelBuffer, quality: u8) -> Result<Vec<u8>, EncodeError>;
    fn encode_webp(&self, image: &PixelBuffer, quality: u8) -> Result<Vec<u8>, EncodeError>;
}

/// The encoding chosen for one flushed rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Png,
    Jpeg,
    WebP,
}

/// Inputs needed to pick an encoding for one dirty rectangle, gathered by
/// the caller (a [`crate::display::Display`] or session driver) from
/// session-wide state this crate does not itself track (user
/// capabilities, processing lag).
#[derive(Debug, Clone, Copy)]
pub struct EncodingContext {
    pub all_users_support_webp: bool,
    pub local_framerate_hz: f64,
    pub min_framerate_hz: f64,
    pub jpeg_min_area: i64,
    /// `now - last_frame_duration`, feeding the quality formula.
    pub processing_lag_ms: i64,
}

/// Walk `image`'s pixels and return the PNG-optimality score: positive
/// favors PNG, negative favors a lossy encoding.
///
/// Counts adjacent horizontal pixels equal when masked to RGB (`num_same`)
/// vs. not (`num_different`), returning `256 * num_same / num_different -
/// 1024`. A perfectly flat image has no "different" pairs and returns
/// `i64::MAX` (always choose PNG); this matches treating an all-same image
/// as maximally PNG-friendly.
#[must_use]
pub fn png_optimality(image: &PixelBuffer) -> i64 {
    let mut num_same: i64 = 0;
    let mut num_different: i64 = 0;

    for y in 0..image.height() {
        for x in 1..image.width() {
            let a = image.get_pixel(x - 1, y);
            let b = image.get_pixel(x, y);
            if a[..3] == b[..3] {
                num_same += 1;
            } else {
                num_different += 1;
            }
        }
    }

    if num_different == 0 {
        return i64::MAX;
    }

    256 * num_same / num_different - 1024
}

/// JPEG/WebP quality derived from processing lag, per the formula
/// `quality = clamp(90 - (lag_ms - 20), 30, 90)`.
#[must_use]
pub fn quality_for_lag(lag_ms: i64) -> u8 {
    let raw = 90 - (lag_ms - 20);
    raw.clamp(30, 90) as u8
}

/// Choose an encoding for a dirty rectangle given whether it is fully
/// opaque and the current encoding context.
#[must_use]
pub fn choose_encoding(image: &PixelBuffer, opaque: bool, ctx: &EncodingContext) -> Encoding {
    let lossy_eligible = ctx.local_framerate_hz >= ctx.min_framerate_hz;
    let optimality = png_optimality(image);

    if ctx.all_users_support_webp && lossy_eligible && optimality < 0 {
        return Encoding::WebP;
    }

    if opaque
        && image.width() as i64 * image.height() as i64 > ctx.jpeg_min_area
        && lossy_eligible
        && optimality < 0
    {
        return Encoding::Jpeg;
    }

    Encoding::Png
}
