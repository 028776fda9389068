//! Grid configuration.

use std::time::Duration;

use crate::error::GridError;
use crate::lazy::GridParams;

/// Smallest chunk the loader will ever request.
pub const MIN_BATCH: usize = 5;

/// Largest chunk the loader will ever request.
pub const MAX_BATCH: usize = 30;

/// Largest pool the grid will prewarm. Overflow may still double it.
pub const MAX_POOL_SIZE: usize = 4096;

/// Policy for sizing lazy-load batches from scroll velocity.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchPolicy {
    pub min_batch: usize,
    pub max_batch: usize,
    /// Added to the batch size after a fast scroll sample.
    pub increment: usize,
    /// Removed from the batch size after a slow scroll sample.
    pub decrement: usize,
    /// Normalized position delta above which a sample counts as fast.
    pub fast_scroll_delta: f32,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            min_batch: MIN_BATCH,
            max_batch: MAX_BATCH,
            increment: 5,
            decrement: 2,
            fast_scroll_delta: 0.05,
        }
    }
}

impl BatchPolicy {
    pub fn clamp(&self, size: usize) -> usize {
        size.clamp(self.min_batch, self.max_batch)
    }

    /// Next batch size after observing a scroll delta.
    pub fn adjust(&self, current: usize, scroll_delta: f32) -> usize {
        if scroll_delta > self.fast_scroll_delta {
            self.clamp(current.saturating_add(self.increment))
        } else {
            self.clamp(current.saturating_sub(self.decrement))
        }
    }
}

/// Configuration for a [`VirtualGrid`](crate::VirtualGrid).
#[derive(Clone, Debug, PartialEq)]
pub struct GridConfig {
    /// Soft capacity of the view pool; the hard capacity is twice this.
    pub pool_size: usize,
    /// Items materialized synchronously on every (re)load.
    pub initial_item_count: usize,
    /// Starting lazy-load batch size, clamped into the policy range.
    pub batch_size: usize,
    /// Fraction of the scroll range from the trailing edge that triggers a load.
    pub scroll_threshold: f32,
    pub columns: usize,
    pub cell_width: f32,
    pub cell_height: f32,
    pub padding_left: f32,
    pub padding_top: f32,
    pub spacing_x: f32,
    pub spacing_y: f32,
    /// Rows kept alive above the viewport.
    pub buffer_rows: usize,
    /// Minimum time between accepted scroll notifications.
    pub scroll_cooldown: Duration,
    /// Items prefetched and appended together before yielding.
    pub sub_batch_size: usize,
    pub batch_policy: BatchPolicy,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            pool_size: 20,
            initial_item_count: 30,
            batch_size: 20,
            scroll_threshold: 0.2,
            columns: 2,
            cell_width: 160.0,
            cell_height: 220.0,
            padding_left: 8.0,
            padding_top: 8.0,
            spacing_x: 8.0,
            spacing_y: 8.0,
            buffer_rows: 2,
            scroll_cooldown: Duration::from_millis(150),
            sub_batch_size: 4,
            batch_policy: BatchPolicy::default(),
        }
    }
}

impl GridConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_initial_item_count(mut self, count: usize) -> Self {
        self.initial_item_count = count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_scroll_threshold(mut self, threshold: f32) -> Self {
        self.scroll_threshold = threshold;
        self
    }

    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_cell_size(mut self, width: f32, height: f32) -> Self {
        self.cell_width = width;
        self.cell_height = height;
        self
    }

    pub fn with_padding(mut self, left: f32, top: f32) -> Self {
        self.padding_left = left;
        self.padding_top = top;
        self
    }

    pub fn with_spacing(mut self, x: f32, y: f32) -> Self {
        self.spacing_x = x;
        self.spacing_y = y;
        self
    }

    pub fn with_buffer_rows(mut self, rows: usize) -> Self {
        self.buffer_rows = rows;
        self
    }

    pub fn with_scroll_cooldown(mut self, cooldown: Duration) -> Self {
        self.scroll_cooldown = cooldown;
        self
    }

    pub fn with_sub_batch_size(mut self, size: usize) -> Self {
        self.sub_batch_size = size;
        self
    }

    pub fn with_batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.batch_policy = policy;
        self
    }

    pub fn grid_params(&self) -> GridParams {
        GridParams {
            columns: self.columns,
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            spacing_x: self.spacing_x,
            spacing_y: self.spacing_y,
            padding_left: self.padding_left,
            padding_top: self.padding_top,
        }
    }

    /// Starting batch size after clamping into the policy range.
    pub fn effective_batch_size(&self) -> usize {
        let clamped = self.batch_policy.clamp(self.batch_size);
        if clamped != self.batch_size {
            log::warn!(
                "GridConfig: batch_size {} outside [{}, {}], using {}",
                self.batch_size,
                self.batch_policy.min_batch,
                self.batch_policy.max_batch,
                clamped
            );
        }
        clamped
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.pool_size == 0 {
            return Err(GridError::invalid_config("pool_size", "must be > 0"));
        }
        if self.pool_size > MAX_POOL_SIZE {
            return Err(GridError::invalid_config(
                "pool_size",
                format!("{} exceeds {}", self.pool_size, MAX_POOL_SIZE),
            ));
        }
        if self.initial_item_count == 0 {
            return Err(GridError::invalid_config(
                "initial_item_count",
                "must be > 0",
            ));
        }
        if self.batch_size == 0 {
            return Err(GridError::invalid_config("batch_size", "must be > 0"));
        }
        if self.sub_batch_size == 0 {
            return Err(GridError::invalid_config("sub_batch_size", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.scroll_threshold) {
            return Err(GridError::invalid_config(
                "scroll_threshold",
                format!("{} not in [0, 1]", self.scroll_threshold),
            ));
        }
        if self.scroll_cooldown.is_zero() {
            return Err(GridError::invalid_config(
                "scroll_cooldown",
                "must be > 0",
            ));
        }
        let policy = &self.batch_policy;
        if policy.min_batch == 0 || policy.min_batch > policy.max_batch {
            return Err(GridError::invalid_config(
                "batch_policy",
                format!("bad range [{}, {}]", policy.min_batch, policy.max_batch),
            ));
        }
        self.grid_params().validate()
    }
}
