//! Windowing engine.
//!
//! Keeps the set of active slots equal to the visible window: indices that
//! scroll out are released back to the pool, indices that scroll in get a
//! slot, a position and their card. Recomputing is synchronous, bounded by
//! the window size, and idempotent.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::layout::GridParams;
use super::pool::{PoolStats, SlotHandle, ViewPool};
use super::sink::DataSink;
use super::viewport::{visible_range, ViewportState, VisibleRange};
use crate::error::GridError;
use crate::host::RenderSurface;
use crate::item::{GridItem, ItemId};

#[derive(Clone, Copy, Debug)]
struct ActiveSlot {
    handle: SlotHandle,
    item: ItemId,
}

/// Outcome of a single recompute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowReport {
    pub range: Option<VisibleRange>,
    pub activated: usize,
    pub deactivated: usize,
    /// Active slots found pointing at destroyed resources.
    pub purged: usize,
    /// Slots destroyed by compaction after growth.
    pub compacted: usize,
}

pub struct WindowingEngine<I> {
    pool: ViewPool<I>,
    surface: Rc<dyn RenderSurface<I>>,
    params: GridParams,
    active: FxHashMap<usize, ActiveSlot>,
    range: Option<VisibleRange>,
}

impl<I: GridItem> WindowingEngine<I> {
    pub fn new(params: GridParams, pool_size: usize, surface: Rc<dyn RenderSurface<I>>) -> Self {
        let pool = ViewPool::new(pool_size, params.cell_size(), Rc::clone(&surface));
        Self {
            pool,
            surface,
            params,
            active: FxHashMap::default(),
            range: None,
        }
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    /// Last computed window.
    pub fn range(&self) -> Option<VisibleRange> {
        self.range
    }

    pub fn pool(&self) -> &ViewPool<I> {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Sorted indices currently bound to active slots.
    pub fn active_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.active.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn slot_for(&self, index: usize) -> Option<SlotHandle> {
        self.active.get(&index).map(|slot| slot.handle)
    }

    /// Synchronizes active slots with the window for `viewport`.
    pub fn recompute(
        &mut self,
        viewport: &ViewportState,
        sink: &DataSink<I>,
    ) -> Result<WindowReport, GridError> {
        let item_count = sink.len();
        let range = visible_range(viewport, &self.params, item_count);
        let mut report = WindowReport {
            range,
            ..WindowReport::default()
        };

        let pool = &self.pool;
        self.active.retain(|index, slot| {
            if pool.is_live(slot.handle) {
                return true;
            }
            log::debug!(
                "WindowingEngine: purging destroyed {} bound to index {}",
                slot.handle,
                index
            );
            report.purged += 1;
            false
        });

        // Indices that left the window, or whose item changed under them.
        let stale: SmallVec<[usize; 16]> = self
            .active
            .iter()
            .filter(|(index, slot)| {
                !range.is_some_and(|r| r.contains(**index))
                    || sink.item_id(**index) != Some(slot.item)
            })
            .map(|(index, _)| *index)
            .collect();
        for index in stale {
            if let Some(slot) = self.active.remove(&index) {
                self.pool.release(slot.handle)?;
                report.deactivated += 1;
            }
        }

        if let Some(range) = range {
            for index in range.indices() {
                if self.active.contains_key(&index) {
                    continue;
                }
                let Some(item) = sink.item_id(index) else {
                    continue;
                };
                let handle = self.pool.acquire();
                let position = self.params.position(index);
                self.pool.bind(handle, index, position)?;
                self.surface.set_position(handle, position);
                sink.with_card(index, |card| self.surface.bind(handle, card));
                self.surface.set_active(handle, true);
                self.active.insert(index, ActiveSlot { handle, item });
                report.activated += 1;
            }
        }

        if self.pool.len() > self.pool.soft_capacity() {
            report.compacted = self.pool.compact();
        }
        self.range = range;
        Ok(report)
    }

    /// Applies new grid parameters, repositioning and resizing live slots.
    pub fn set_params(&mut self, params: GridParams) -> Result<(), GridError> {
        params.validate()?;
        self.params = params;
        self.pool.resize_all(params.cell_size());
        for (index, slot) in self.active.iter() {
            let position = params.position(*index);
            self.pool.set_position(slot.handle, position)?;
            self.surface.set_position(slot.handle, position);
        }
        Ok(())
    }

    /// Releases every active slot back to the pool.
    pub fn release_all(&mut self) -> usize {
        let released = self.active.len();
        for (_, slot) in self.active.drain() {
            // Destroyed handles have nothing left to release.
            let _ = self.pool.release(slot.handle);
        }
        self.range = None;
        released
    }

    /// The host destroyed a slot's resource; the stale handle is purged on
    /// the next recompute.
    pub fn mark_destroyed(&mut self, handle: SlotHandle) -> bool {
        self.pool.mark_destroyed(handle)
    }

    /// Destroys every slot.
    pub fn teardown(&mut self) {
        self.active.clear();
        self.range = None;
        self.pool.clear();
    }
}
