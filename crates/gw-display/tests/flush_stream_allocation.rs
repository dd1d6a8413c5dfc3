//! Exercises `Surface::flush_bitmaps`/`Display::flush` against a real
//! `StreamPool`, the way a session driver's frame-end path actually wires
//! one up, rather than the hardcoded stream index the unit tests stub out.

mod support;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use gw_display::{Display, EncodingContext, PixelBuffer, PixelFormat, SurfaceConfig};
use gw_wire::{Socket, StreamPool};
use support::fake_encoder::FakeEncoder;

struct RecordingSocket {
    received: StdMutex<Vec<String>>,
    open: AtomicBool,
}

impl RecordingSocket {
    fn new() -> Arc<Self> {
        Arc::new(Self { received: StdMutex::new(Vec::new()), open: AtomicBool::new(true) })
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

fn ctx() -> EncodingContext {
    EncodingContext {
        all_users_support_webp: false,
        local_framerate_hz: 10.0,
        min_framerate_hz: 3.0,
        jpeg_min_area: 4096,
        processing_lag_ms: 0,
    }
}

/// A pool that hands out odd indices starting at 1, the way
/// `SessionStreamTable::allocate` does, and asserts nothing ever reuses an
/// index still held by a concurrent sequence.
fn tracked_pool() -> (StreamPool<'static>, Arc<StdMutex<HashSet<i32>>>) {
    let next: &'static StdMutex<i32> = Box::leak(Box::new(StdMutex::new(1)));
    let in_use: Arc<StdMutex<HashSet<i32>>> = Arc::new(StdMutex::new(HashSet::new()));
    let in_use_acquire = in_use.clone();
    let in_use_release = in_use.clone();
    let acquire: &'static dyn Fn() -> i32 = Box::leak(Box::new(move || {
        let mut n = next.lock().unwrap();
        let v = *n;
        *n += 2;
        assert!(in_use_acquire.lock().unwrap().insert(v), "stream index reused while in use");
        v
    }));
    let release: &'static dyn Fn(i32) = Box::leak(Box::new(move |stream: i32| {
        assert!(in_use_release.lock().unwrap().remove(&stream), "released a stream index that wasn't held");
    }));
    (StreamPool::new(acquire, release), in_use)
}

#[test]
fn flushing_several_dirty_layers_never_collides_on_a_stream_index() {
    let socket = RecordingSocket::new();
    let display = Display::new(socket.clone(), 200, 200, SurfaceConfig::default());

    let layer_a = display.alloc_layer(64, 64);
    let layer_b = display.alloc_layer(64, 64);
    // Rgb24 forces an opaque copy-in regardless of pixel content, so this
    // draw always marks the target dirty even though every byte is zero.
    let noisy = PixelBuffer::new(16, 16, PixelFormat::Rgb24);
    layer_a.draw(0, 0, &noisy);
    layer_b.draw(0, 0, &noisy);

    let (pool, in_use) = tracked_pool();
    display.flush(&FakeEncoder, &ctx(), &pool);

    assert!(in_use.lock().unwrap().is_empty(), "every acquired stream must be released by the end of flush");

    let received = socket.received.lock().unwrap();
    assert!(received.iter().any(|r| r.contains("img")));
    assert!(received.iter().any(|r| r.contains("blob")));
    assert!(received.iter().any(|r| r.contains("end")));
}

#[test]
fn dup_to_a_fresh_joiner_replays_cursor_then_every_surface_without_colliding_streams() {
    let socket = RecordingSocket::new();
    let display = Display::new(socket, 200, 200, SurfaceConfig::default());
    let layer = display.alloc_layer(32, 32);
    let noisy = PixelBuffer::new(8, 8, PixelFormat::Rgb24);
    layer.draw(0, 0, &noisy);

    display.cursor().set_pointer(&FakeEncoder, &tracked_pool().0);

    let joiner = RecordingSocket::new();
    let (pool, in_use) = tracked_pool();
    display.dup(&*joiner, &FakeEncoder, &pool);

    assert!(in_use.lock().unwrap().is_empty());
    let received = joiner.received.lock().unwrap();
    let cursor_pos = received.iter().position(|r| r.contains("cursor")).expect("cursor replayed");
    let size_pos = received.iter().position(|r| r.contains("size")).expect("a size instruction replayed");
    assert!(size_pos < cursor_pos, "cursor's own size must precede its cursor instruction");
}
