use serde::Deserialize;

/// Tunables for surfaces created under a given display.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Heat-map cell size in pixels, used for local-framerate estimation.
    pub heat_map_cell_size: u32,
    /// Grid size lossy encoders align dirty rectangles to (WebP).
    pub webp_grid_size: i32,
    /// Grid size lossy encoders align dirty rectangles to (JPEG).
    pub jpeg_grid_size: i32,
    /// Minimum framerate (Hz) before lossy encoding is considered.
    pub lossy_min_framerate_hz: f64,
    /// Minimum opaque area before JPEG is considered over PNG.
    pub jpeg_min_area: i64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            heat_map_cell_size: 64,
            webp_grid_size: 8,
            jpeg_grid_size: 16,
            lossy_min_framerate_hz: 3.0,
            jpeg_min_area: 4096,
        }
    }
}
