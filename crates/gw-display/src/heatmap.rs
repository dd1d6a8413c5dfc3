//! Per-cell update-timestamp history driving lossy/lossless encoding choice.

use gw_geom::Rect;

/// Number of recent timestamps kept per cell for framerate estimation.
const HISTORY_LEN: usize = 5;

#[derive(Clone, Copy)]
struct Cell {
    history: [u64; HISTORY_LEN],
    oldest: usize,
}

impl Default for Cell {
    fn default() -> Self {
        Self { history: [0; HISTORY_LEN], oldest: 0 }
    }
}

impl Cell {
    fn touch(&mut self, timestamp_ms: u64) {
        self.history[self.oldest] = timestamp_ms;
        self.oldest = (self.oldest + 1) % HISTORY_LEN;
    }

    /// `HISTORY_LEN * 1000 / elapsed`, or `None` if the cell's oldest and
    /// newest recorded timestamps coincide (untouched, or touched fewer
    /// than two distinct times within the ring's span).
    fn framerate_hz(&self) -> Option<f64> {
        let latest = (self.oldest + HISTORY_LEN - 1) % HISTORY_LEN;
        let elapsed = self.history[latest].saturating_sub(self.history[self.oldest]);
        if elapsed == 0 {
            None
        } else {
            Some(HISTORY_LEN as f64 * 1000.0 / elapsed as f64)
        }
    }
}

/// A grid of cells, each tracking recent update timestamps (milliseconds
/// since session start, or any monotonic clock the caller chooses).
pub struct HeatMap {
    cell_size: u32,
    cols: u32,
    rows: u32,
    cells: Vec<Cell>,
}

impl HeatMap {
    #[must_use]
    pub fn new(width: u32, height: u32, cell_size: u32) -> Self {
        let cols = width.div_ceil(cell_size).max(1);
        let rows = height.div_ceil(cell_size).max(1);
        Self { cell_size, cols, rows, cells: vec![Cell::default(); (cols * rows) as usize] }
    }

    fn cell_index(&self, col: u32, row: u32) -> usize {
        (row * self.cols + col) as usize
    }

    fn cell_range(&self, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
        if rect.is_empty() {
            return None;
        }
        let col_start = (rect.x.max(0) as u32) / self.cell_size;
        let row_start = (rect.y.max(0) as u32) / self.cell_size;
        let col_end = ((rect.right().max(0) as u32).saturating_sub(1)) / self.cell_size;
        let row_end = ((rect.bottom().max(0) as u32).saturating_sub(1)) / self.cell_size;
        Some((col_start, row_start, col_end.min(self.cols.saturating_sub(1)), row_end.min(self.rows.saturating_sub(1))))
    }

    /// Record `timestamp_ms` against every cell touched by `rect`.
    pub fn touch(&mut self, rect: &Rect, timestamp_ms: u64) {
        let Some((col_start, row_start, col_end, row_end)) = self.cell_range(rect) else {
            return;
        };
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                let idx = self.cell_index(col, row);
                self.cells[idx].touch(timestamp_ms);
            }
        }
    }

    /// Estimate the local update rate (Hz) over the cells touched by
    /// `rect`, averaged across every cell in the bounding box (cells with
    /// no recorded elapsed time contribute zero). Returns 0 if `rect` is
    /// empty.
    #[must_use]
    pub fn local_framerate_hz(&self, rect: &Rect) -> f64 {
        let Some((col_start, row_start, col_end, row_end)) = self.cell_range(rect) else {
            return 0.0;
        };

        let mut total = 0.0;
        let mut count = 0u32;
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                let idx = self.cell_index(col, row);
                total += self.cells[idx].framerate_hz().unwrap_or(0.0);
                count += 1;
            }
        }

        if count == 0 {
            0.0
        } else {
            total / f64::from(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_then_estimate_rate() {
        let mut heat = HeatMap::new(128, 128, 64);
        let rect = Rect::new(0, 0, 10, 10);
        // Five touches 100ms apart fill the ring exactly once: elapsed
        // across the whole ring is 400ms, rate = 5 * 1000 / 400 = 12.5Hz.
        for i in 0..5 {
            heat.touch(&rect, i * 100);
        }
        let hz = heat.local_framerate_hz(&rect);
        assert!((hz - 12.5).abs() < 0.01);
    }

    #[test]
    fn untouched_region_has_zero_rate() {
        let heat = HeatMap::new(128, 128, 64);
        let rect = Rect::new(0, 0, 10, 10);
        assert_eq!(heat.local_framerate_hz(&rect), 0.0);
    }

    #[test]
    fn touch_is_a_no_op_for_empty_rect() {
        let mut heat = HeatMap::new(64, 64, 64);
        heat.touch(&Rect::empty(), 42);
        assert_eq!(heat.local_framerate_hz(&Rect::new(0, 0, 1, 1)), 0.0);
    }

    #[test]
    fn a_single_touch_is_measured_against_the_zero_initialized_ring() {
        let mut heat = HeatMap::new(64, 64, 64);
        let rect = Rect::new(0, 0, 1, 1);
        heat.touch(&rect, 1000);
        // Every other ring slot still holds its zero-initialized
        // timestamp, so this is measured against that rather than a
        // second real touch: 5 * 1000 / 1000 = 5Hz.
        assert!((heat.local_framerate_hz(&rect) - 5.0).abs() < 0.01);
    }
}
