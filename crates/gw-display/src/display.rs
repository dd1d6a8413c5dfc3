//! `Display`: a session-scoped aggregator of the default surface, extra
//! visible layers, off-screen buffers, and the shared cursor.

use std::sync::{Arc, Mutex};

use gw_geom::IntegerPool;
use gw_wire::{Socket, StreamPool};

use crate::config::SurfaceConfig;
use crate::cursor::Cursor;
use crate::error::DisplayError;
use crate::surface::{EncodingContext, ImageEncoder, Surface, SurfaceKind};

/// One arena slot: either a live surface or a hole left by a freed one.
/// Indexing directly into a `Vec` instead of threading prev/next pointers
/// through a linked list avoids any possibility of a reference cycle.
enum Slot {
    Occupied(Arc<Surface>),
    Empty,
}

struct DisplayInner {
    default_surface: Arc<Surface>,
    /// Indexed by `layer_index` directly (always >= 1 here; index 0 is
    /// `default_surface`).
    layers: Vec<Slot>,
    /// Indexed by `-buffer_index - 1` (buffer indices are negative).
    buffers: Vec<Slot>,
    lossless: bool,
}

/// Session-scoped registry of every surface plus the shared cursor.
pub struct Display {
    inner: Mutex<DisplayInner>,
    cursor: Cursor,
    layer_pool: IntegerPool,
    buffer_pool: IntegerPool,
    socket: Arc<dyn Socket>,
    config: SurfaceConfig,
}

fn lock(inner: &Mutex<DisplayInner>) -> std::sync::MutexGuard<'_, DisplayInner> {
    inner.lock().unwrap_or_else(|e| {
        tracing::warn!("display mutex was poisoned, recovering");
        e.into_inner()
    })
}

impl Display {
    #[must_use]
    pub fn new(socket: Arc<dyn Socket>, default_width: u32, default_height: u32, config: SurfaceConfig) -> Self {
        let default_surface =
            Arc::new(Surface::new(SurfaceKind::Default, 0, default_width, default_height, socket.clone(), config.clone()));
        // Layer/buffer index 0 is reserved for the default surface, so both
        // pools start allocating from 1. The cursor's image is itself
        // backed by a buffer, allocated from the same pool as any other
        // off-screen buffer.
        let buffer_pool = IntegerPool::new(64);
        let cursor_buffer_index = -(buffer_pool.next() + 1);
        Self {
            inner: Mutex::new(DisplayInner { default_surface, layers: Vec::new(), buffers: Vec::new(), lossless: false }),
            cursor: Cursor::new(socket.clone(), cursor_buffer_index),
            layer_pool: IntegerPool::new(64),
            buffer_pool,
            socket,
            config,
        }
    }

    #[must_use]
    pub fn default_surface(&self) -> Arc<Surface> {
        lock(&self.inner).default_surface.clone()
    }

    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Allocate a new visible layer, picking the next positive index.
    pub fn alloc_layer(&self, width: u32, height: u32) -> Arc<Surface> {
        let index = self.layer_pool.next() + 1;
        let surface = Arc::new(Surface::new(SurfaceKind::Layer, index, width, height, self.socket.clone(), self.config.clone()));

        let mut inner = lock(&self.inner);
        if inner.lossless {
            surface.set_lossless(true);
        }
        let slot_index = (index - 1) as usize;
        if slot_index >= inner.layers.len() {
            inner.layers.resize_with(slot_index + 1, || Slot::Empty);
        }
        inner.layers[slot_index] = Slot::Occupied(surface.clone());
        surface
    }

    /// Allocate a new off-screen scratch buffer, picking the next negative
    /// index.
    pub fn alloc_buffer(&self, width: u32, height: u32) -> Arc<Surface> {
        let pool_index = self.buffer_pool.next();
        let index = -(pool_index + 1);
        let surface = Arc::new(Surface::new(SurfaceKind::Buffer, index, width, height, self.socket.clone(), self.config.clone()));

        let mut inner = lock(&self.inner);
        let slot_index = pool_index as usize;
        if slot_index >= inner.buffers.len() {
            inner.buffers.resize_with(slot_index + 1, || Slot::Empty);
        }
        inner.buffers[slot_index] = Slot::Occupied(surface.clone());
        surface
    }

    /// Unlink and free a visible layer's index, emitting `dispose`.
    pub fn free_layer(&self, index: i32) -> Result<(), DisplayError> {
        if index < 1 {
            return Err(DisplayError::UnknownIndex(index));
        }
        let slot_index = (index - 1) as usize;
        let mut inner = lock(&self.inner);
        let Some(slot) = inner.layers.get_mut(slot_index) else {
            return Err(DisplayError::UnknownIndex(index));
        };
        if matches!(slot, Slot::Empty) {
            return Err(DisplayError::UnknownIndex(index));
        }
        *slot = Slot::Empty;
        drop(inner);

        let rendered = gw_wire::InstructionBuilder::new("dispose").int(i64::from(index)).build();
        self.socket.write_instruction(&rendered);
        self.layer_pool.free(index - 1);
        Ok(())
    }

    /// Unlink and free a buffer's index, emitting `dispose`.
    pub fn free_buffer(&self, index: i32) -> Result<(), DisplayError> {
        if index >= 0 {
            return Err(DisplayError::UnknownIndex(index));
        }
        let pool_index = -index - 1;
        let mut inner = lock(&self.inner);
        let Some(slot) = inner.buffers.get_mut(pool_index as usize) else {
            return Err(DisplayError::UnknownIndex(index));
        };
        if matches!(slot, Slot::Empty) {
            return Err(DisplayError::UnknownIndex(index));
        }
        *slot = Slot::Empty;
        drop(inner);

        let rendered = gw_wire::InstructionBuilder::new("dispose").int(i64::from(index)).build();
        self.socket.write_instruction(&rendered);
        self.buffer_pool.free(pool_index);
        Ok(())
    }

    #[must_use]
    pub fn layer(&self, index: i32) -> Option<Arc<Surface>> {
        if index == 0 {
            return Some(self.default_surface());
        }
        if index < 1 {
            return None;
        }
        let inner = lock(&self.inner);
        match inner.layers.get((index - 1) as usize) {
            Some(Slot::Occupied(surface)) => Some(surface.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn buffer(&self, index: i32) -> Option<Arc<Surface>> {
        if index >= 0 {
            return None;
        }
        let inner = lock(&self.inner);
        match inner.buffers.get((-index - 1) as usize) {
            Some(Slot::Occupied(surface)) => Some(surface.clone()),
            _ => None,
        }
    }

    /// Flush the default surface and every visible layer. Buffers are
    /// scratch and are never flushed. `streams` supplies a fresh,
    /// immediately-released stream index for each `img`/`blob`/`end`
    /// sequence this emits.
    pub fn flush(&self, encoder: &dyn ImageEncoder, ctx: &EncodingContext, streams: &StreamPool<'_>) {
        let inner = lock(&self.inner);
        inner.default_surface.flush_properties();
        inner.default_surface.flush_bitmaps(encoder, ctx, streams);
        for slot in &inner.layers {
            if let Slot::Occupied(surface) = slot {
                surface.flush_properties();
                surface.flush_bitmaps(encoder, ctx, streams);
            }
        }
    }

    /// Serialize the full current state to a newly-joined user's socket,
    /// in order: cursor, default surface, every visible layer, every
    /// buffer. `streams` supplies stream indices the same way as [`Display::flush`].
    pub fn dup(&self, socket: &dyn Socket, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let inner = lock(&self.inner);
        self.cursor.dup(socket, encoder, streams);
        inner.default_surface.dup(socket, encoder, streams);
        for slot in &inner.layers {
            if let Slot::Occupied(surface) = slot {
                surface.dup(socket, encoder, streams);
            }
        }
        for slot in &inner.buffers {
            if let Slot::Occupied(surface) = slot {
                surface.dup(socket, encoder, streams);
            }
        }
    }

    /// Force every current and future surface into lossless-only encoding.
    pub fn set_lossless(&self, lossless: bool) {
        let mut inner = lock(&self.inner);
        inner.lossless = lossless;
        inner.default_surface.set_lossless(lossless);
        for slot in &inner.layers {
            if let Slot::Occupied(surface) = slot {
                surface.set_lossless(lossless);
            }
        }
    }
}
