//! End-to-end check that a pending user receives no broadcast traffic
//! until the next promotion tick, then gets a full state replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gw_display::{EncodeError, ImageEncoder, PixelBuffer};
use gw_session::{Session, SessionConfig};
use gw_wire::Socket;

struct RecordingSocket {
    received: Mutex<Vec<String>>,
    open: AtomicBool,
}

impl RecordingSocket {
    fn new() -> Arc<Self> {
        Arc::new(Self { received: Mutex::new(Vec::new()), open: AtomicBool::new(true) })
    }
}

impl Socket for RecordingSocket {
    fn write_instruction(&self, rendered: &str) {
        self.received.lock().unwrap().push(rendered.to_string());
    }
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

struct NoopEncoder;
impl ImageEncoder for NoopEncoder {
    fn encode_png(&self, _: &PixelBuffer) -> Result<Vec<u8>, EncodeError> {
        Ok(Vec::new())
    }
    fn encode_jpeg(&self, _: &PixelBuffer, _: u8) -> Result<Vec<u8>, EncodeError> {
        Ok(Vec::new())
    }
    fn encode_webp(&self, _: &PixelBuffer, _: u8) -> Result<Vec<u8>, EncodeError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn pending_user_misses_updates_until_promoted() {
    let mut config = SessionConfig::default();
    config.pending_loop_interval_ms = 250;
    let session = Session::new("s1".to_string(), config);

    let owner_socket = RecordingSocket::new();
    session.join(true, owner_socket.clone()).await;
    session.promote_pending(&NoopEncoder).await;
    owner_socket.received.lock().unwrap().clear();

    let joiner_socket = RecordingSocket::new();
    session.join(false, joiner_socket.clone()).await;

    // t=100ms: a drawing-driven frame boundary fires while X is still pending.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let ctx = gw_display::EncodingContext {
        all_users_support_webp: false,
        local_framerate_hz: 0.0,
        min_framerate_hz: 3.0,
        jpeg_min_area: 4096,
        processing_lag_ms: 0,
    };
    session.end_frame(&NoopEncoder, &ctx);
    assert!(
        joiner_socket.received.lock().unwrap().is_empty(),
        "pending user must not receive broadcast traffic before promotion"
    );

    // t=300ms: promotion has happened by now; replay has reached the joiner.
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.promote_pending(&NoopEncoder).await;
    assert!(
        !joiner_socket.received.lock().unwrap().is_empty(),
        "promoted user should have received a state replay"
    );

    // Subsequent frame boundaries now reach the promoted user too.
    joiner_socket.received.lock().unwrap().clear();
    session.end_frame(&NoopEncoder, &ctx);
    assert!(joiner_socket.received.lock().unwrap().iter().any(|r| r.contains("sync")));
}
