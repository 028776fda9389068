//! Viewport state and the visible-window computation.

use super::layout::GridParams;

/// Scroll offset and size of the viewport, plus look-behind rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportState {
    pub scroll_offset: f32,
    pub viewport_height: f32,
    pub buffer_rows: usize,
}

impl ViewportState {
    pub fn new(scroll_offset: f32, viewport_height: f32, buffer_rows: usize) -> Self {
        Self {
            scroll_offset,
            viewport_height,
            buffer_rows,
        }
    }
}

/// Handles viewport size validation and provides an effective viewport size.
///
/// Hosts occasionally report an unbounded or garbage height (for example
/// before their first layout pass). Those are replaced by an estimate derived
/// from the row pitch.
#[derive(Clone, Copy, Debug)]
pub struct ViewportHandler {
    effective_height: f32,
    is_fallback: bool,
}

/// Maximum reasonable viewport height before treating it as unbounded.
const MAX_REASONABLE_VIEWPORT: f32 = 100_000.0;

/// Number of rows assumed visible in the fallback case.
const FALLBACK_VIEWPORT_ROWS: f32 = 6.0;

impl ViewportHandler {
    /// Validates `viewport_height`, warning when the fallback kicks in.
    ///
    /// Hosts should build one handler per height change rather than per
    /// frame.
    pub fn new(viewport_height: f32, row_pitch: f32) -> Self {
        let handler = Self::resolve(viewport_height, row_pitch);
        if handler.is_fallback {
            log::warn!(
                "VirtualGrid: unusable viewport height ({}), using fallback {}",
                viewport_height,
                handler.effective_height
            );
        }
        handler
    }

    fn resolve(viewport_height: f32, row_pitch: f32) -> Self {
        let is_fallback = !viewport_height.is_finite()
            || viewport_height < 0.0
            || viewport_height > MAX_REASONABLE_VIEWPORT;
        let effective_height = if is_fallback {
            row_pitch * FALLBACK_VIEWPORT_ROWS
        } else {
            viewport_height
        };
        Self {
            effective_height,
            is_fallback,
        }
    }

    #[inline]
    pub fn effective_height(&self) -> f32 {
        self.effective_height
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.is_fallback
    }
}

/// Inclusive range of item indices that must be bound to slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index <= self.end
    }

    /// Number of indices in the range; never zero.
    pub fn count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Computes the window of indices to render.
///
/// ```text
/// start_row = max(0, floor(y / R) - B)
/// end_row   = min(ceil(N / C), ceil((y + H) / R) + 1)
/// start     = start_row * C
/// end       = min(N - 1, (end_row + 1) * C - 1)
/// ```
///
/// An unusable `H` is replaced by the same estimate [`ViewportHandler`]
/// uses, without logging; validation and its warning belong to whoever owns
/// the viewport.
///
/// Returns `None` when there is nothing to render.
pub fn visible_range(
    viewport: &ViewportState,
    params: &GridParams,
    item_count: usize,
) -> Option<VisibleRange> {
    if item_count == 0 || params.columns == 0 {
        return None;
    }
    let pitch = params.row_pitch();
    if pitch <= 0.0 {
        return None;
    }
    let y = if viewport.scroll_offset.is_finite() {
        viewport.scroll_offset
    } else {
        0.0
    };
    let height = ViewportHandler::resolve(viewport.viewport_height, pitch).effective_height();
    let columns = params.columns;

    let first_row = (y / pitch).floor() as i64;
    let start_row = (first_row - viewport.buffer_rows as i64).max(0) as usize;

    let total_rows = params.row_count(item_count);
    let bottom_row = ((y + height) / pitch).ceil() as i64 + 1;
    let end_row = (bottom_row.max(0) as usize).min(total_rows);

    let start = start_row.saturating_mul(columns);
    let end = end_row
        .saturating_add(1)
        .saturating_mul(columns)
        .saturating_sub(1)
        .min(item_count - 1);

    (start <= end).then_some(VisibleRange { start, end })
}
