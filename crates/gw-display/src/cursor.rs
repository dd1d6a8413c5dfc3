//! Synchronized mouse cursor state, shared across every connected user of
//! a display.

use std::sync::{Arc, Mutex};

use gw_wire::{CompositeMode, InstructionBuilder, Socket, StreamPool};

use crate::pixels::{PixelBuffer, PixelFormat};
use crate::surface::ImageEncoder;

struct CursorInner {
    image: PixelBuffer,
    hotspot_x: i32,
    hotspot_y: i32,
    x: i32,
    y: i32,
    mask: u8,
    last_mover: Option<i64>,
}

/// The cursor image and position shared by every user of a `Display`.
/// Whichever user last moved the mouse is exempted from receiving the
/// resulting `mouse` broadcast, since they already know where it is.
///
/// The cursor's image is itself backed by a dedicated off-screen buffer
/// index (allocated by `Display` the same way `alloc_buffer` allocates
/// any other scratch buffer), so its `size`/`img`/`cursor` instructions
/// reference a layer of their own rather than aliasing layer 0.
pub struct Cursor {
    inner: Mutex<CursorInner>,
    socket: Arc<dyn Socket>,
    buffer_index: i32,
}

fn lock(inner: &Mutex<CursorInner>) -> std::sync::MutexGuard<'_, CursorInner> {
    inner.lock().unwrap_or_else(|e| {
        tracing::warn!("cursor mutex was poisoned, recovering");
        e.into_inner()
    })
}

impl Cursor {
    #[must_use]
    pub fn new(socket: Arc<dyn Socket>, buffer_index: i32) -> Self {
        Self {
            inner: Mutex::new(CursorInner {
                image: PixelBuffer::new(1, 1, PixelFormat::Argb32),
                hotspot_x: 0,
                hotspot_y: 0,
                x: 0,
                y: 0,
                mask: 0,
                last_mover: None,
            }),
            socket,
            buffer_index,
        }
    }

    /// Update the cursor's position and button mask for `user`. The caller
    /// is responsible for fanning a `mouse(x, y)` instruction out to every
    /// *other* user afterward, using [`Cursor::is_last_mover`] to decide
    /// which user to skip.
    pub fn update(&self, user: i64, x: i32, y: i32, mask: u8) {
        let mut inner = lock(&self.inner);
        inner.last_mover = Some(user);
        inner.x = x;
        inner.y = y;
        inner.mask = mask;
    }

    #[must_use]
    pub fn position(&self) -> (i32, i32) {
        let inner = lock(&self.inner);
        (inner.x, inner.y)
    }

    #[must_use]
    pub fn button_mask(&self) -> u8 {
        lock(&self.inner).mask
    }

    /// Whether `user` is the one who last moved the cursor (and so should
    /// be skipped when broadcasting its new position).
    #[must_use]
    pub fn is_last_mover(&self, user: i64) -> bool {
        lock(&self.inner).last_mover == Some(user)
    }

    /// Remove `user` as the cursor's last mover, if they were it.
    pub fn remove_user(&self, user: i64) {
        let mut inner = lock(&self.inner);
        if inner.last_mover == Some(user) {
            inner.last_mover = None;
        }
    }

    /// Replace the cursor image with `data` (ARGB32, row-major, `stride`
    /// bytes per row) and broadcast `size` -> `img(PNG)` -> `cursor` to
    /// every connected user.
    pub fn set_argb(
        &self,
        hx: i32,
        hy: i32,
        data: &[u8],
        width: u32,
        height: u32,
        stride: u32,
        encoder: &dyn ImageEncoder,
        streams: &StreamPool<'_>,
    ) {
        let mut inner = lock(&self.inner);
        let mut image = PixelBuffer::new(width, height, PixelFormat::Argb32);
        for row in 0..height {
            let src_start = (row * stride) as usize;
            let dst_start = (row * image.stride()) as usize;
            let row_bytes = (width * 4) as usize;
            if src_start + row_bytes > data.len() || dst_start + row_bytes > image.data().len() {
                break;
            }
            image.data_mut()[dst_start..dst_start + row_bytes].copy_from_slice(&data[src_start..src_start + row_bytes]);
        }
        inner.image = image;
        inner.hotspot_x = hx;
        inner.hotspot_y = hy;
        drop(inner);

        self.broadcast_image(encoder, streams);
    }

    /// Adopt `surface`'s current pixels as the cursor image.
    pub fn set_surface(&self, hx: i32, hy: i32, surface: &PixelBuffer, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        self.set_argb(hx, hy, surface.data(), surface.width(), surface.height(), surface.stride(), encoder, streams);
    }

    fn broadcast_image(&self, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let inner = lock(&self.inner);
        let (width, height) = (inner.image.width(), inner.image.height());

        let size = InstructionBuilder::new("size").int(i64::from(self.buffer_index)).int(i64::from(width)).int(i64::from(height)).build();
        self.socket.write_instruction(&size);

        if let Ok(png) = encoder.encode_png(&inner.image) {
            streams.with(|stream| {
                let img = InstructionBuilder::new("img")
                    .int(i64::from(stream))
                    .int(CompositeMode::Src.code().into())
                    .int(i64::from(self.buffer_index))
                    .str("image/png")
                    .int(0)
                    .int(0)
                    .build();
                self.socket.write_instruction(&img);
                let blob = InstructionBuilder::new("blob").int(i64::from(stream)).blob(&png).build();
                self.socket.write_instruction(&blob);
                let end = InstructionBuilder::new("end").int(i64::from(stream)).build();
                self.socket.write_instruction(&end);
            });
        } else {
            tracing::debug!("cursor broadcast: png encode failed");
        }

        let rendered = InstructionBuilder::new("cursor")
            .int(i64::from(inner.hotspot_x))
            .int(i64::from(inner.hotspot_y))
            .int(i64::from(self.buffer_index))
            .int(0)
            .int(0)
            .int(i64::from(width))
            .int(i64::from(height))
            .build();
        self.socket.write_instruction(&rendered);
    }

    /// Synchronize the full cursor state (image, hotspot, position) to a
    /// newly-joined user's `socket`.
    pub fn dup(&self, socket: &dyn Socket, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let inner = lock(&self.inner);

        let mouse = InstructionBuilder::new("mouse").int(i64::from(inner.x)).int(i64::from(inner.y)).build();
        socket.write_instruction(&mouse);

        if inner.image.width() == 0 || inner.image.height() == 0 {
            return;
        }

        let size = InstructionBuilder::new("size")
            .int(i64::from(self.buffer_index))
            .int(i64::from(inner.image.width()))
            .int(i64::from(inner.image.height()))
            .build();
        socket.write_instruction(&size);

        let Ok(png) = encoder.encode_png(&inner.image) else {
            tracing::debug!("cursor dup: png encode failed");
            return;
        };

        streams.with(|stream| {
            let img = InstructionBuilder::new("img")
                .int(i64::from(stream))
                .int(CompositeMode::Src.code().into())
                .int(i64::from(self.buffer_index))
                .str("image/png")
                .int(0)
                .int(0)
                .build();
            socket.write_instruction(&img);
            let blob = InstructionBuilder::new("blob").int(i64::from(stream)).blob(&png).build();
            socket.write_instruction(&blob);
            let end = InstructionBuilder::new("end").int(i64::from(stream)).build();
            socket.write_instruction(&end);
        });

        let cursor = InstructionBuilder::new("cursor")
            .int(i64::from(inner.hotspot_x))
            .int(i64::from(inner.hotspot_y))
            .int(i64::from(self.buffer_index))
            .int(0)
            .int(0)
            .int(i64::from(inner.image.width()))
            .int(i64::from(inner.image.height()))
            .build();
        socket.write_instruction(&cursor);
    }

    pub fn set_pointer(&self, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let (w, h, data) = predefined::pointer();
        self.set_argb(0, 0, &data, w, h, w * 4, encoder, streams);
    }

    pub fn set_dot(&self, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let (w, h, data) = predefined::dot();
        self.set_argb(2, 2, &data, w, h, w * 4, encoder, streams);
    }

    pub fn set_ibar(&self, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let (w, h, data) = predefined::ibar();
        self.set_argb((w / 2) as i32, (h / 2) as i32, &data, w, h, w * 4, encoder, streams);
    }

    pub fn set_blank(&self, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let (w, h, data) = predefined::blank();
        self.set_argb(0, 0, &data, w, h, w * 4, encoder, streams);
    }
}

/// Small procedurally-built placeholder cursor glyphs, standing in for the
/// fixed embedded cursor images a full gateway ships (pointer arrow,
/// blinking-text I-bar, drag dot, blank/hidden). Each returns
/// `(width, height, argb32_data)`.
mod predefined {
    const SIZE: u32 = 32;

    fn canvas() -> Vec<u8> {
        vec![0u8; (SIZE * SIZE * 4) as usize]
    }

    fn set(data: &mut [u8], x: u32, y: u32, bgra: [u8; 4]) {
        let idx = ((y * SIZE + x) * 4) as usize;
        data[idx..idx + 4].copy_from_slice(&bgra);
    }

    /// A simple diagonal arrow, white fill with a black outline.
    pub(super) fn pointer() -> (u32, u32, Vec<u8>) {
        let mut data = canvas();
        for y in 0..SIZE {
            for x in 0..=y.min(SIZE - 1 - y) {
                if x <= y {
                    let color = if x == 0 || x == y { [0, 0, 0, 0xFF] } else { [0xFF, 0xFF, 0xFF, 0xFF] };
                    set(&mut data, x, y, color);
                }
            }
        }
        (SIZE, SIZE, data)
    }

    /// A small filled black circle.
    pub(super) fn dot() -> (u32, u32, Vec<u8>) {
        let mut data = canvas();
        let (cx, cy, r) = (SIZE as i32 / 2, SIZE as i32 / 2, 4i32);
        for y in 0..SIZE as i32 {
            for x in 0..SIZE as i32 {
                if (x - cx).pow(2) + (y - cy).pow(2) <= r * r {
                    set(&mut data, x as u32, y as u32, [0, 0, 0, 0xFF]);
                }
            }
        }
        (SIZE, SIZE, data)
    }

    /// A vertical black bar centered in the image, as a text caret.
    pub(super) fn ibar() -> (u32, u32, Vec<u8>) {
        let mut data = canvas();
        let cx = SIZE / 2;
        for y in 2..SIZE - 2 {
            set(&mut data, cx, y, [0, 0, 0, 0xFF]);
        }
        (SIZE, SIZE, data)
    }

    /// Fully transparent: hides the cursor entirely.
    pub(super) fn blank() -> (u32, u32, Vec<u8>) {
        (SIZE, SIZE, canvas())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

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

    struct NoopEncoder;
    impl ImageEncoder for NoopEncoder {
        fn encode_png(&self, _: &PixelBuffer) -> Result<Vec<u8>, crate::error::EncodeError> {
            Ok(vec![0u8; 4])
        }
        fn encode_jpeg(&self, _: &PixelBuffer, _: u8) -> Result<Vec<u8>, crate::error::EncodeError> {
            Ok(Vec::new())
        }
        fn encode_webp(&self, _: &PixelBuffer, _: u8) -> Result<Vec<u8>, crate::error::EncodeError> {
            Ok(Vec::new())
        }
    }

    fn stream_pool() -> (impl Fn() -> i32, impl Fn(i32)) {
        (|| 7, |_| {})
    }

    #[test]
    fn update_tracks_last_mover() {
        let socket = RecordingSocket::new();
        let cursor = Cursor::new(socket, -1);
        cursor.update(1, 10, 20, 0);
        assert_eq!(cursor.position(), (10, 20));
        assert!(cursor.is_last_mover(1));
        assert!(!cursor.is_last_mover(2));
    }

    #[test]
    fn remove_user_clears_last_mover_only_for_that_user() {
        let socket = RecordingSocket::new();
        let cursor = Cursor::new(socket, -1);
        cursor.update(1, 0, 0, 0);
        cursor.remove_user(2);
        assert!(cursor.is_last_mover(1));
        cursor.remove_user(1);
        assert!(!cursor.is_last_mover(1));
    }

    #[test]
    fn set_argb_broadcasts_size_img_and_cursor_instructions() {
        let socket = RecordingSocket::new();
        let cursor = Cursor::new(socket.clone(), -1);
        let data = vec![0xFFu8; 4 * 4 * 4];
        let (acquire, release) = stream_pool();
        let streams = StreamPool::new(&acquire, &release);
        cursor.set_argb(1, 1, &data, 4, 4, 16, &NoopEncoder, &streams);
        let received = socket.received.lock().unwrap();
        assert!(received.iter().any(|r| r.starts_with("4.size")));
        assert!(received.iter().any(|r| r.starts_with("3.img")));
        assert!(received.iter().any(|r| r.starts_with("6.cursor")));
    }

    #[test]
    fn predefined_cursors_have_expected_dimensions() {
        let (w, h, data) = predefined::pointer();
        assert_eq!((w, h), (32, 32));
        assert_eq!(data.len(), (32 * 32 * 4) as usize);
    }
}
