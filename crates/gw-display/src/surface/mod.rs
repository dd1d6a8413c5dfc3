mod draw;
pub mod flush;
mod queue;

pub use flush::{choose_encoding, png_optimality, quality_for_lag, Encoding, EncodingContext, ImageEncoder};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use gw_geom::Rect;
use gw_wire::{CompositeMode, InstructionBuilder, Socket, StreamPool, TransferFunction};

use crate::config::SurfaceConfig;
use crate::heatmap::HeatMap;
use crate::pixels::{PixelBuffer, PixelFormat};
use queue::QueueEntry;

/// What role a surface plays in its `Display`: layers are flushed and
/// visible, buffers are off-screen scratch and never flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// The always-present default layer, index 0.
    Default,
    /// An extra visible layer, positive index.
    Layer,
    /// An off-screen compositing scratch buffer, negative index.
    Buffer,
}

impl SurfaceKind {
    fn is_realized(self) -> bool {
        !matches!(self, Self::Buffer)
    }
}

struct SurfaceInner {
    pixels: PixelBuffer,
    clip: Option<Rect>,
    dirty: Option<Rect>,
    dirty_rect_only: bool,
    queue: VecDeque<QueueEntry>,
    heat_map: HeatMap,
    location_dirty: bool,
    opacity_dirty: bool,
    parent: i32,
    x: i32,
    y: i32,
    z: i32,
    opacity: u8,
    touches: i32,
    lossless: bool,
}

impl SurfaceInner {
    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.pixels.width() as i32, self.pixels.height() as i32)
    }

    fn effective_clip(&self) -> Rect {
        let mut clip = self.clip.unwrap_or_else(|| self.bounds());
        clip.constrain(&self.bounds());
        clip
    }

    /// Record `touched` (already clipped) as a newly-dirty region, either
    /// merging it into the existing dirty rect or deferring the existing
    /// one to the queue, per the combine heuristic.
    fn mark_dirty(&mut self, touched: Rect, rect_only: bool, realized: bool, max_queue: usize) {
        if touched.is_empty() {
            return;
        }

        match self.dirty {
            None => {
                self.dirty = Some(touched);
                self.dirty_rect_only = rect_only;
            }
            Some(mut dirty) => {
                if queue::should_combine(&dirty, &touched, rect_only || self.dirty_rect_only, realized) {
                    dirty.extend(&touched);
                    self.dirty = Some(dirty);
                    self.dirty_rect_only = self.dirty_rect_only && rect_only;
                } else {
                    if self.queue.len() < max_queue {
                        self.queue.push_back(QueueEntry {
                            rect: dirty,
                            rect_only: self.dirty_rect_only,
                            flushed: false,
                        });
                    }
                    self.dirty = Some(touched);
                    self.dirty_rect_only = rect_only;
                }
            }
        }
    }
}

/// The in-memory pixel backing of a layer, plus its dirty-rectangle queue
/// and flush pipeline.
pub struct Surface {
    inner: Mutex<SurfaceInner>,
    socket: Arc<dyn Socket>,
    kind: SurfaceKind,
    layer_index: i32,
    config: SurfaceConfig,
}

/// Maximum number of rectangles retained in the flush queue before older
/// entries are merged away rather than grown without bound.
const MAX_QUEUE_LEN: usize = 256;

fn lock(inner: &Mutex<SurfaceInner>) -> std::sync::MutexGuard<'_, SurfaceInner> {
    inner.lock().unwrap_or_else(|e| {
        tracing::warn!("surface mutex was poisoned, recovering");
        e.into_inner()
    })
}

impl Surface {
    #[must_use]
    pub fn new(
        kind: SurfaceKind,
        layer_index: i32,
        width: u32,
        height: u32,
        socket: Arc<dyn Socket>,
        config: SurfaceConfig,
    ) -> Self {
        let format = PixelFormat::Argb32;
        Self {
            inner: Mutex::new(SurfaceInner {
                pixels: PixelBuffer::new(width, height, format),
                clip: None,
                dirty: None,
                dirty_rect_only: false,
                queue: VecDeque::new(),
                heat_map: HeatMap::new(width.max(1), height.max(1), config.heat_map_cell_size),
                location_dirty: false,
                opacity_dirty: false,
                parent: 0,
                x: 0,
                y: 0,
                z: 0,
                opacity: 0xFF,
                touches: 1,
                lossless: false,
            }),
            socket,
            kind,
            layer_index,
            config,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    #[must_use]
    pub fn layer_index(&self) -> i32 {
        self.layer_index
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.kind.is_realized()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        lock(&self.inner).pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        lock(&self.inner).pixels.height()
    }

    /// Install a clipping rectangle constraining all subsequent drawing.
    pub fn clip(&self, x: i32, y: i32, w: i32, h: i32) {
        let mut inner = lock(&self.inner);
        inner.clip = Some(Rect::new(x, y, w, h));
    }

    /// Remove the clipping rectangle.
    pub fn reset_clip(&self) {
        lock(&self.inner).clip = None;
    }

    /// Composite `src` at `(x, y)`.
    pub fn draw(&self, x: i32, y: i32, src: &PixelBuffer) {
        let mut inner = lock(&self.inner);
        let clip = inner.effective_clip();
        let Some((tx, ty, tw, th)) = inner.pixels.draw_over(x, y, src) else {
            return;
        };
        let mut touched = Rect::new(tx as i32, ty as i32, tw as i32, th as i32);
        touched.constrain(&clip);
        if touched.is_empty() {
            return;
        }
        inner.heat_map.touch(&touched, now_ms());
        let realized = self.is_realized();
        inner.mark_dirty(touched, false, realized, MAX_QUEUE_LEN);
    }

    /// Stencil fill: paint `color` through the alpha channel of `stencil`.
    pub fn paint(&self, x: i32, y: i32, mask: &PixelBuffer, r: u8, g: u8, b: u8) {
        let mut inner = lock(&self.inner);
        let clip = inner.effective_clip();
        let Some((tx, ty, tw, th)) = inner.pixels.paint_mask(x, y, mask, r, g, b) else {
            return;
        };
        let mut touched = Rect::new(tx as i32, ty as i32, tw as i32, th as i32);
        touched.constrain(&clip);
        if touched.is_empty() {
            return;
        }
        inner.heat_map.touch(&touched, now_ms());
        let realized = self.is_realized();
        inner.mark_dirty(touched, false, realized, MAX_QUEUE_LEN);
    }

    /// Copy a rectangle from `self` onto itself, overlap-safe (see
    /// [`PixelBuffer::copy_within`]).
    pub fn copy_within(&self, sx: i32, sy: i32, w: i32, h: i32, dx: i32, dy: i32) {
        if w <= 0 || h <= 0 {
            return;
        }
        let mut inner = lock(&self.inner);
        let clip = inner.effective_clip();
        inner.pixels.copy_within(sx as u32, sy as u32, w as u32, h as u32, dx as u32, dy as u32);
        let mut touched = Rect::new(dx, dy, w, h);
        touched.constrain(&clip);
        if touched.is_empty() {
            return;
        }
        inner.heat_map.touch(&touched, now_ms());
        let realized = self.is_realized();
        inner.mark_dirty(touched, false, realized, MAX_QUEUE_LEN);
    }

    /// Copy a rectangle from `src` onto `self` (distinct surfaces). Locks
    /// both surfaces in a fixed address order to avoid deadlock against a
    /// concurrent reverse copy.
    pub fn copy_from(src: &Surface, sx: i32, sy: i32, w: i32, h: i32, dst: &Surface, dx: i32, dy: i32) {
        if w <= 0 || h <= 0 {
            return;
        }
        let (first, second, reversed) = order_surfaces(src, dst);
        let mut first_guard = lock(&first.inner);
        let mut second_guard = lock(&second.inner);
        let (src_inner, dst_inner) = if reversed {
            (&mut *second_guard, &mut *first_guard)
        } else {
            (&mut *first_guard, &mut *second_guard)
        };

        let clip = dst_inner.effective_clip();
        dst_inner.pixels.copy_from(&src_inner.pixels, sx as u32, sy as u32, w as u32, h as u32, dx as u32, dy as u32);
        let mut touched = Rect::new(dx, dy, w, h);
        touched.constrain(&clip);
        if touched.is_empty() {
            return;
        }
        dst_inner.heat_map.touch(&touched, now_ms());
        let realized = dst.is_realized();
        dst_inner.mark_dirty(touched, false, realized, MAX_QUEUE_LEN);
    }

    /// Apply a transfer function from `src` onto `self`, `src == dst` case.
    pub fn transfer_within(&self, sx: i32, sy: i32, w: i32, h: i32, op: TransferFunction, dx: i32, dy: i32) {
        if w <= 0 || h <= 0 {
            return;
        }
        let mut inner = lock(&self.inner);
        let clip = inner.effective_clip();
        let snapshot = inner.pixels.clone();
        let Some((tx, ty, tw, th)) =
            inner.pixels.transfer_from(&snapshot, sx as u32, sy as u32, w as u32, h as u32, dx as u32, dy as u32, op)
        else {
            return;
        };
        let mut touched = Rect::new(tx as i32, ty as i32, tw as i32, th as i32);
        touched.constrain(&clip);
        if touched.is_empty() {
            return;
        }
        inner.heat_map.touch(&touched, now_ms());
        let realized = self.is_realized();
        inner.mark_dirty(touched, false, realized, MAX_QUEUE_LEN);
    }

    /// Apply a transfer function from `src` onto `dst`, distinct surfaces.
    pub fn transfer_from(
        src: &Surface,
        sx: i32,
        sy: i32,
        w: i32,
        h: i32,
        op: TransferFunction,
        dst: &Surface,
        dx: i32,
        dy: i32,
    ) {
        if w <= 0 || h <= 0 {
            return;
        }
        let (first, second, reversed) = order_surfaces(src, dst);
        let mut first_guard = lock(&first.inner);
        let mut second_guard = lock(&second.inner);
        let (src_inner, dst_inner) = if reversed {
            (&mut *second_guard, &mut *first_guard)
        } else {
            (&mut *first_guard, &mut *second_guard)
        };

        let clip = dst_inner.effective_clip();
        let Some((tx, ty, tw, th)) = dst_inner.pixels.transfer_from(
            &src_inner.pixels,
            sx as u32,
            sy as u32,
            w as u32,
            h as u32,
            dx as u32,
            dy as u32,
            op,
        ) else {
            return;
        };
        let mut touched = Rect::new(tx as i32, ty as i32, tw as i32, th as i32);
        touched.constrain(&clip);
        if touched.is_empty() {
            return;
        }
        dst_inner.heat_map.touch(&touched, now_ms());
        let realized = dst.is_realized();
        dst_inner.mark_dirty(touched, false, realized, MAX_QUEUE_LEN);
    }

    /// Fill a rectangle with an exact color.
    /// Returns `true` if the caller should emit the `rect`+`cfill` fast
    /// path immediately (fully opaque fill), `false` if it was only queued
    /// as a deferred drawing update.
    pub fn set(&self, x: i32, y: i32, w: i32, h: i32, r: u8, g: u8, b: u8, a: u8) -> bool {
        if w <= 0 || h <= 0 {
            return false;
        }
        let mut inner = lock(&self.inner);
        let clip = inner.effective_clip();
        let mut touched = Rect::new(x, y, w, h);
        touched.constrain(&clip);
        if touched.is_empty() {
            return false;
        }
        inner.pixels.fill_rect(touched.x as u32, touched.y as u32, touched.width as u32, touched.height as u32, [b, g, r, a]);

        if a == 0xFF {
            return true;
        }

        inner.heat_map.touch(&touched, now_ms());
        let realized = self.is_realized();
        inner.mark_dirty(touched, false, realized, MAX_QUEUE_LEN);
        false
    }

    /// Reallocate the pixel buffer, discarding heat-map history, clipping
    /// the clip/dirty rects to the new bounds. Returns the rendered `size`
    /// instruction if this surface is realized.
    pub fn resize(&self, width: u32, height: u32) -> Option<String> {
        let mut inner = lock(&self.inner);
        inner.pixels = inner.pixels.resized(width, height);
        inner.heat_map = HeatMap::new(width.max(1), height.max(1), self.config.heat_map_cell_size);

        let bounds = inner.bounds();
        if let Some(mut clip) = inner.clip {
            clip.constrain(&bounds);
            inner.clip = if clip.is_empty() { None } else { Some(clip) };
        }
        if let Some(mut dirty) = inner.dirty {
            dirty.constrain(&bounds);
            inner.dirty = if dirty.is_empty() { None } else { Some(dirty) };
        }

        self.is_realized().then(|| {
            InstructionBuilder::new("size").int(i64::from(self.layer_index)).int(i64::from(width)).int(i64::from(height)).build()
        })
    }

    pub fn set_location(&self, parent: i32, x: i32, y: i32, z: i32) {
        let mut inner = lock(&self.inner);
        inner.parent = parent;
        inner.x = x;
        inner.y = y;
        inner.z = z;
        inner.location_dirty = true;
    }

    pub fn set_opacity(&self, opacity: u8) {
        let mut inner = lock(&self.inner);
        inner.opacity = opacity;
        inner.opacity_dirty = true;
    }

    pub fn set_touches(&self, touches: i32) {
        lock(&self.inner).touches = touches;
    }

    pub fn set_lossless(&self, lossless: bool) {
        lock(&self.inner).lossless = lossless;
    }

    /// Emit `shade`/`move` if the corresponding dirty flags are set,
    /// clearing them. Only meaningful for non-default
    /// visible layers.
    pub fn flush_properties(&self) {
        if self.kind != SurfaceKind::Layer {
            return;
        }
        let mut inner = lock(&self.inner);
        if inner.opacity_dirty {
            let rendered =
                InstructionBuilder::new("shade").int(i64::from(self.layer_index)).int(i64::from(inner.opacity)).build();
            self.socket.write_instruction(&rendered);
            inner.opacity_dirty = false;
        }
        if inner.location_dirty {
            let rendered = InstructionBuilder::new("move")
                .int(i64::from(self.layer_index))
                .int(i64::from(inner.parent))
                .int(i64::from(inner.x))
                .int(i64::from(inner.y))
                .int(i64::from(inner.z))
                .build();
            self.socket.write_instruction(&rendered);
            inner.location_dirty = false;
        }
    }

    /// Run the full flush sequence (§4.3): sort/combine the dirty queue,
    /// encode each surviving rectangle, and write the resulting
    /// instructions to this surface's socket.
    pub fn flush_bitmaps(&self, encoder: &dyn ImageEncoder, ctx: &EncodingContext, streams: &StreamPool<'_>) {
        if self.kind == SurfaceKind::Buffer {
            // Buffers are scratch; never flushed to the wire.
            return;
        }
        let mut inner = lock(&self.inner);
        draw::run_flush_sequence(&mut inner, self.layer_index, self.kind, &*self.socket, encoder, ctx, streams);
    }

    /// Serialize the current (pre-flush) state to `socket` for a
    /// newly-joined user.
    pub fn dup(&self, socket: &dyn Socket, encoder: &dyn ImageEncoder, streams: &StreamPool<'_>) {
        let inner = lock(&self.inner);
        if self.kind == SurfaceKind::Buffer {
            return;
        }

        if self.kind == SurfaceKind::Layer {
            let shade =
                InstructionBuilder::new("shade").int(i64::from(self.layer_index)).int(i64::from(inner.opacity)).build();
            socket.write_instruction(&shade);
            let mv = InstructionBuilder::new("move")
                .int(i64::from(self.layer_index))
                .int(i64::from(inner.parent))
                .int(i64::from(inner.x))
                .int(i64::from(inner.y))
                .int(i64::from(inner.z))
                .build();
            socket.write_instruction(&mv);

            let set_multi_touch = InstructionBuilder::new("set")
                .int(i64::from(self.layer_index))
                .str("multi-touch")
                .str(&inner.touches.to_string())
                .build();
            socket.write_instruction(&set_multi_touch);
        }

        let size = InstructionBuilder::new("size")
            .int(i64::from(self.layer_index))
            .int(i64::from(inner.pixels.width()))
            .int(i64::from(inner.pixels.height()))
            .build();
        socket.write_instruction(&size);

        if inner.pixels.width() == 0 || inner.pixels.height() == 0 {
            return;
        }

        let Ok(png) = encoder.encode_png(&inner.pixels) else {
            tracing::debug!(layer = self.layer_index, "dup: png encode failed");
            return;
        };
        streams.with(|stream| {
            let img = InstructionBuilder::new("img")
                .int(i64::from(stream))
                .int(CompositeMode::Over.code().into())
                .int(i64::from(self.layer_index))
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
    }
}

fn order_surfaces<'a>(a: &'a Surface, b: &'a Surface) -> (&'a Surface, &'a Surface, bool) {
    let a_ptr = std::ptr::addr_of!(a.inner) as usize;
    let b_ptr = std::ptr::addr_of!(b.inner) as usize;
    if a_ptr <= b_ptr {
        (a, b, false)
    } else {
        (b, a, true)
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
