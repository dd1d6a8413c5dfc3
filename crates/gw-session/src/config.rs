use std::time::Duration;

use serde::Deserialize;

/// Session-wide tunables, advertised to joining users via `args` during
/// the handshake.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Parameter names advertised in the `args` instruction, in order.
    pub arg_names: Vec<String>,
    /// How often the pending-users promotion loop wakes, in milliseconds.
    pub pending_loop_interval_ms: u64,
    pub default_width: u32,
    pub default_height: u32,
    pub surface: gw_display::SurfaceConfig,
}

impl SessionConfig {
    #[must_use]
    pub fn pending_loop_interval(&self) -> Duration {
        Duration::from_millis(self.pending_loop_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            arg_names: Vec::new(),
            pending_loop_interval_ms: 250,
            default_width: 1024,
            default_height: 768,
            surface: gw_display::SurfaceConfig::default(),
        }
    }
}
