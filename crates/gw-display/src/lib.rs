//! In-memory surface/cursor/display state for one remote-desktop session:
//! pixel buffers, dirty-rectangle tracking, heat-map-driven encoding
//! choice, and the flush sequence that turns dirty pixels into wire
//! instructions.

mod config;
mod cursor;
mod display;
mod error;
mod heatmap;
mod pixels;
mod surface;

pub use config::SurfaceConfig;
pub use cursor::Cursor;
pub use display::Display;
pub use error::{DisplayError, EncodeError};
pub use pixels::{PixelBuffer, PixelFormat};
pub use surface::{choose_encoding, png_optimality, quality_for_lag, Encoding, EncodingContext, ImageEncoder, Surface, SurfaceKind};
