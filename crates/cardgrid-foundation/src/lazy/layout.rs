//! Grid layout model.
//!
//! Pure geometry: maps an item index to its cell origin and computes the
//! scrollable content height. Y grows downward in content space, so cell
//! origins are reported with a negated y component the way a top-anchored
//! scroll container expects them.

use crate::error::GridError;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Column count, cell geometry, spacing and padding of the grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridParams {
    pub columns: usize,
    pub cell_width: f32,
    pub cell_height: f32,
    pub spacing_x: f32,
    pub spacing_y: f32,
    pub padding_left: f32,
    pub padding_top: f32,
}

impl GridParams {
    pub fn validate(&self) -> Result<(), GridError> {
        if self.columns == 0 {
            return Err(GridError::invalid_config("columns", "must be > 0"));
        }
        let lengths = [
            ("cell_width", self.cell_width),
            ("cell_height", self.cell_height),
            ("spacing_x", self.spacing_x),
            ("spacing_y", self.spacing_y),
            ("padding_left", self.padding_left),
            ("padding_top", self.padding_top),
        ];
        for (field, value) in lengths {
            if !value.is_finite() || value < 0.0 {
                return Err(GridError::invalid_config(
                    field,
                    format!("{value} is not a finite length >= 0"),
                ));
            }
        }
        if self.row_pitch() <= 0.0 {
            return Err(GridError::invalid_config(
                "cell_height",
                "cell_height + spacing_y must be > 0",
            ));
        }
        Ok(())
    }

    /// Vertical distance between the origins of consecutive rows.
    #[inline]
    pub fn row_pitch(&self) -> f32 {
        self.cell_height + self.spacing_y
    }

    /// Horizontal distance between the origins of consecutive columns.
    #[inline]
    pub fn column_pitch(&self) -> f32 {
        self.cell_width + self.spacing_x
    }

    #[inline]
    pub fn cell_size(&self) -> Size {
        Size::new(self.cell_width, self.cell_height)
    }

    pub fn row_count(&self, item_count: usize) -> usize {
        item_count.div_ceil(self.columns)
    }

    pub fn position(&self, index: usize) -> Point {
        let row = index / self.columns;
        let col = index % self.columns;
        Point::new(
            self.padding_left + col as f32 * self.column_pitch(),
            -(self.padding_top + row as f32 * self.row_pitch()),
        )
    }

    /// Total content height for `item_count` items.
    ///
    /// Never less than `viewport_height + 1` so the container stays scrollable.
    pub fn content_height(&self, item_count: usize, viewport_height: f32) -> f32 {
        let rows = self.row_count(item_count);
        let body = if rows == 0 {
            0.0
        } else {
            rows as f32 * self.cell_height + (rows - 1) as f32 * self.spacing_y
        };
        (self.padding_top + body).max(viewport_height + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params() -> GridParams {
        GridParams {
            columns: 3,
            cell_width: 100.0,
            cell_height: 150.0,
            spacing_x: 10.0,
            spacing_y: 20.0,
            padding_left: 5.0,
            padding_top: 7.0,
        }
    }

    #[test]
    fn position_of_first_cells() {
        let p = params();
        assert_eq!(p.position(0), Point::new(5.0, -7.0));
        assert_eq!(p.position(2), Point::new(225.0, -7.0));
        assert_eq!(p.position(3), Point::new(5.0, -177.0));
    }

    #[test]
    fn content_height_counts_partial_rows() {
        let p = params();
        // 7 items -> 3 rows: 7 + 3*150 + 2*20
        assert_eq!(p.content_height(7, 100.0), 497.0);
    }

    #[test]
    fn content_height_is_floored_to_viewport() {
        let p = params();
        assert_eq!(p.content_height(0, 600.0), 601.0);
        assert_eq!(p.content_height(1, 600.0), 601.0);
    }

    #[test]
    fn zero_pitch_is_rejected() {
        let mut p = params();
        p.cell_height = 0.0;
        p.spacing_y = 0.0;
        assert!(p.validate().is_err());
    }

    fn arb_params() -> impl Strategy<Value = GridParams> {
        (
            1usize..8,
            0.0f32..400.0,
            1.0f32..400.0,
            0.0f32..40.0,
            0.0f32..40.0,
            0.0f32..50.0,
            0.0f32..50.0,
        )
            .prop_map(|(columns, w, h, sx, sy, pl, pt)| GridParams {
                columns,
                cell_width: w,
                cell_height: h,
                spacing_x: sx,
                spacing_y: sy,
                padding_left: pl,
                padding_top: pt,
            })
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-3 * a.abs().max(b.abs()).max(1.0)
    }

    proptest! {
        #[test]
        fn consecutive_cells_differ_by_one_pitch(p in arb_params(), index in 0usize..5_000) {
            let here = p.position(index);
            let next = p.position(index + 1);
            if (index + 1) % p.columns != 0 {
                prop_assert!(close(next.x - here.x, p.column_pitch()));
                prop_assert_eq!(next.y, here.y);
            }
            let below = p.position(index + p.columns);
            prop_assert_eq!(below.x, here.x);
            prop_assert!(close(here.y - below.y, p.row_pitch()));
        }
    }
}
