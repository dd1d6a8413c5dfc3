//! The flush sequence: sort the dirty queue, combine compatible
//! followers, pick an encoding per surviving rectangle, and emit the
//! resulting wire instructions.

use gw_geom::Rect;
use gw_wire::{CompositeMode, InstructionBuilder, Socket, StreamPool};

use super::flush::{choose_encoding, quality_for_lag, Encoding, EncodingContext, ImageEncoder};
use super::queue::{self, QueueEntry};
use super::{SurfaceInner, SurfaceKind, MAX_QUEUE_LEN};

pub(crate) fn run_flush_sequence(
    inner: &mut SurfaceInner,
    layer_index: i32,
    kind: SurfaceKind,
    socket: &dyn Socket,
    encoder: &dyn ImageEncoder,
    ctx: &EncodingContext,
    streams: &StreamPool<'_>,
) {
    if let Some(dirty) = inner.dirty.take() {
        inner.queue.push_back(QueueEntry { rect: dirty, rect_only: inner.dirty_rect_only, flushed: false });
    }
    if inner.queue.is_empty() {
        return;
    }

    let mut entries: Vec<QueueEntry> = inner.queue.drain(..).collect();
    // Sort: y asc, x asc, width desc, height asc.
    entries.sort_by(|a, b| {
        a.rect
            .y
            .cmp(&b.rect.y)
            .then(a.rect.x.cmp(&b.rect.x))
            .then(b.rect.width.cmp(&a.rect.width))
            .then(a.rect.height.cmp(&b.rect.height))
    });

    let realized = kind.is_realized();
    let len = entries.len();
    let mut to_emit: Vec<QueueEntry> = Vec::new();

    for i in 0..len {
        if entries[i].flushed {
            continue;
        }
        let mut merged = entries[i].rect;
        let mut merged_rect_only = entries[i].rect_only;
        let mut combined_any = false;

        for j in (i + 1)..len {
            if entries[j].flushed {
                continue;
            }
            let rect_only = merged_rect_only || entries[j].rect_only;
            if queue::should_combine(&merged, &entries[j].rect, rect_only, realized) {
                merged.extend(&entries[j].rect);
                merged_rect_only = merged_rect_only && entries[j].rect_only;
                entries[j].flushed = true;
                combined_any = true;
            }
        }
        entries[i].flushed = true;

        if combined_any && to_emit.len() < MAX_QUEUE_LEN {
            // A merge changed the rectangle's shape, so it may now combine
            // with entries already emitted this sweep. Since this loop
            // already drains the whole queue in one sorted pass, a second
            // pass over `to_emit` against the newly merged rectangle
            // captures that without a full restart.
            let mut absorbed = false;
            for pending in &mut to_emit {
                if !pending.flushed
                    && queue::should_combine(&pending.rect, &merged, merged_rect_only || pending.rect_only, realized)
                {
                    pending.rect.extend(&merged);
                    pending.rect_only = pending.rect_only && merged_rect_only;
                    absorbed = true;
                    break;
                }
            }
            if !absorbed {
                to_emit.push(QueueEntry { rect: merged, rect_only: merged_rect_only, flushed: false });
            }
        } else {
            to_emit.push(QueueEntry { rect: merged, rect_only: merged_rect_only, flushed: false });
        }
    }

    for entry in to_emit {
        encode_and_emit(inner, layer_index, socket, encoder, ctx, entry.rect, streams);
    }
}

fn encode_and_emit(
    inner: &mut SurfaceInner,
    layer_index: i32,
    socket: &dyn Socket,
    encoder: &dyn ImageEncoder,
    ctx: &EncodingContext,
    mut rect: Rect,
    streams: &StreamPool<'_>,
) {
    let bounds = inner.bounds();
    rect.constrain(&bounds);
    if rect.is_empty() {
        return;
    }

    let (x, y, w, h) = (rect.x as u32, rect.y as u32, rect.width as u32, rect.height as u32);
    let region = inner.pixels.sub_image(x, y, w, h);
    let opaque = inner.pixels.is_rect_opaque(x, y, w, h);
    let local_hz = inner.heat_map.local_framerate_hz(&rect);
    let ctx_local = EncodingContext { local_framerate_hz: local_hz, ..*ctx };
    let encoding = choose_encoding(&region, opaque, &ctx_local);
    let quality = quality_for_lag(ctx.processing_lag_ms);

    match encoding {
        Encoding::WebP => {
            let mut grid_rect = rect;
            grid_rect.expand_to_grid(8, &bounds);
            let (gx, gy, gw, gh) = (grid_rect.x as u32, grid_rect.y as u32, grid_rect.width as u32, grid_rect.height as u32);
            let region = inner.pixels.sub_image(gx, gy, gw, gh);
            if let Ok(bytes) = encoder.encode_webp(&region, quality) {
                emit_bitmap(socket, layer_index, "image/webp", grid_rect, bytes, false, streams);
            } else {
                tracing::debug!(layer = layer_index, "webp encode failed, dropping rect");
            }
        }
        Encoding::Jpeg => {
            let mut grid_rect = rect;
            grid_rect.expand_to_grid(16, &bounds);
            let (gx, gy, gw, gh) = (grid_rect.x as u32, grid_rect.y as u32, grid_rect.width as u32, grid_rect.height as u32);
            let region = inner.pixels.sub_image(gx, gy, gw, gh);
            if let Ok(bytes) = encoder.encode_jpeg(&region, quality) {
                emit_bitmap(socket, layer_index, "image/jpeg", grid_rect, bytes, false, streams);
            } else {
                tracing::debug!(layer = layer_index, "jpeg encode failed, dropping rect");
            }
        }
        Encoding::Png => match encoder.encode_png(&region) {
            Ok(bytes) => emit_bitmap(socket, layer_index, "image/png", rect, bytes, !opaque, streams),
            Err(_) => tracing::debug!(layer = layer_index, "png encode failed, dropping rect"),
        },
    }
}

/// Emit the `img`/`blob`/`end` sequence for one encoded rectangle. If
/// `needs_alpha_clear`, a preliminary `rect`+`cfill(ROUT, 0)` clears the
/// destination alpha before the ARGB bitmap is composited.
fn emit_bitmap(
    socket: &dyn Socket,
    layer_index: i32,
    mimetype: &str,
    rect: Rect,
    bytes: Vec<u8>,
    needs_alpha_clear: bool,
    streams: &StreamPool<'_>,
) {
    if needs_alpha_clear {
        let rect_instr = InstructionBuilder::new("rect")
            .int(i64::from(layer_index))
            .int(i64::from(rect.x))
            .int(i64::from(rect.y))
            .int(i64::from(rect.width))
            .int(i64::from(rect.height))
            .build();
        socket.write_instruction(&rect_instr);
        let cfill = InstructionBuilder::new("cfill")
            .int(CompositeMode::Rout.code().into())
            .int(i64::from(layer_index))
            .int(0)
            .int(0)
            .int(0)
            .int(0)
            .build();
        socket.write_instruction(&cfill);
    }

    streams.with(|stream| {
        let img = InstructionBuilder::new("img")
            .int(i64::from(stream))
            .int(CompositeMode::Over.code().into())
            .int(i64::from(layer_index))
            .str(mimetype)
            .int(i64::from(rect.x))
            .int(i64::from(rect.y))
            .build();
        socket.write_instruction(&img);
        let blob = InstructionBuilder::new("blob").int(i64::from(stream)).blob(&bytes).build();
        socket.write_instruction(&blob);
        let end = InstructionBuilder::new("end").int(i64::from(stream)).build();
        socket.write_instruction(&end);
    });
}
