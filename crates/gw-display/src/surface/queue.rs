use gw_geom::Rect;

/// A rectangle waiting to be encoded and flushed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueEntry {
    pub(crate) rect: Rect,
    pub(crate) rect_only: bool,
    pub(crate) flushed: bool,
}

/// Tuning constants for the combine heuristic. Not independently derived;
/// preserved verbatim from the source this system is modeled on.
const BASE_COST: i64 = 4096;
const RECT_ONLY_DIVISOR: i64 = 16;
const NEGLIGIBLE_INCREASE_DIVISOR: i64 = 4;
const FILL_PATTERN_FACTOR: i64 = 3;
const NEGLIGIBLE_DIMENSION: i32 = 64;

/// Approximate cost of re-encoding `rect` as a wire update.
pub(crate) fn cost(rect: &Rect, rect_only: bool) -> i64 {
    let base = BASE_COST + rect.area();
    if rect_only {
        base / RECT_ONLY_DIVISOR
    } else {
        base
    }
}

/// Whether a new dirty rectangle `new` should be merged into the existing
/// dirty rectangle `dirty`, rather than deferring `dirty` to the queue and
/// starting fresh with `new`.
pub(crate) fn should_combine(dirty: &Rect, new: &Rect, rect_only: bool, realized: bool) -> bool {
    if !realized {
        return true;
    }

    let mut combined = *dirty;
    combined.extend(new);

    if combined.width <= NEGLIGIBLE_DIMENSION && combined.height <= NEGLIGIBLE_DIMENSION {
        return true;
    }

    let dirty_cost = cost(dirty, rect_only);
    let update_cost = cost(new, rect_only);
    let combined_cost = cost(&combined, rect_only);

    if combined_cost <= dirty_cost + update_cost {
        return true;
    }
    if combined_cost - dirty_cost <= dirty_cost / NEGLIGIBLE_INCREASE_DIVISOR {
        return true;
    }
    if combined_cost - update_cost <= update_cost / NEGLIGIBLE_INCREASE_DIVISOR {
        return true;
    }

    // Vertical scroll/fill pattern: new rect sits directly below dirty.
    if new.x == dirty.x
        && new.y == dirty.bottom()
        && combined_cost <= FILL_PATTERN_FACTOR * (dirty_cost + update_cost)
    {
        return true;
    }

    false
}
