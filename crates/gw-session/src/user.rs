//! Per-viewer state: identity, capabilities, timing stats, and the
//! stream/object tables scoped to one user.

use std::fmt;
use std::time::Instant;

use gw_wire::ProtocolVersion;

use crate::streams::{ObjectTable, StreamTable};

/// A 37-character prefixed UUID, e.g. `$<uuid>` for a normal user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn generate(prefix: char) -> Self {
        Self(format!("{prefix}{}", uuid::Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability/environment info a user reports during the handshake.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub optimal_width: u32,
    pub optimal_height: u32,
    pub optimal_dpi: u32,
    pub image_mimetypes: Vec<String>,
    pub audio_mimetypes: Vec<String>,
    pub video_mimetypes: Vec<String>,
    pub timezone: Option<String>,
    pub protocol_version: Option<ProtocolVersion>,
}

impl ConnectionInfo {
    #[must_use]
    pub fn supports_webp(&self) -> bool {
        self.image_mimetypes.iter().any(|m| m == "image/webp")
    }
}

/// Running timing statistics, updated on each `sync` from the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingStats {
    pub last_received_ms: u64,
    pub last_frame_duration_ms: Option<i64>,
    pub processing_lag_ms: i64,
}

impl TimingStats {
    /// Record a `sync(timestamp)` response, updating `last_frame_duration`
    /// and the derived `processing_lag`.
    pub fn record_sync(&mut self, now_ms: u64, client_timestamp_ms: u64) {
        let frame_duration = now_ms.saturating_sub(client_timestamp_ms) as i64;
        if let Some(previous) = self.last_frame_duration_ms {
            self.processing_lag_ms = (frame_duration - previous).max(0);
        }
        self.last_frame_duration_ms = Some(frame_duration);
        self.last_received_ms = now_ms;
    }
}

/// One connected viewer.
pub struct User {
    pub id: UserId,
    pub owner: bool,
    pub info: ConnectionInfo,
    pub streams: StreamTable,
    pub objects: ObjectTable,
    pub timing: TimingStats,
    pub joined_at: Instant,
    socket: std::sync::Arc<dyn gw_wire::Socket>,
}

impl User {
    #[must_use]
    pub fn new(id: UserId, owner: bool, socket: std::sync::Arc<dyn gw_wire::Socket>) -> Self {
        Self {
            id,
            owner,
            info: ConnectionInfo::default(),
            streams: StreamTable::new(),
            objects: ObjectTable::new(),
            timing: TimingStats::default(),
            joined_at: Instant::now(),
            socket,
        }
    }

    #[must_use]
    pub fn socket(&self) -> &std::sync::Arc<dyn gw_wire::Socket> {
        &self.socket
    }
}
