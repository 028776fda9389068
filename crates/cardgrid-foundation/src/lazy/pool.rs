//! Recyclable view slots.
//!
//! Slots live in an arena addressed by [`SlotHandle`]s carrying a generation
//! counter. When a slot is destroyed (by compaction, teardown, or the host
//! behind our back) its entry's generation is bumped, so every handle still
//! pointing at it stops resolving instead of aliasing a newer slot.

use std::fmt;
use std::rc::Rc;

use super::layout::{Point, Size};
use crate::error::GridError;
use crate::host::RenderSurface;

/// Generation-checked reference to a pooled slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotHandle {
    index: u32,
    generation: u32,
}

impl SlotHandle {
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}v{}", self.index, self.generation)
    }
}

/// Pool-side state of one renderable slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewSlot {
    /// Item index currently bound, if any.
    pub bound: Option<usize>,
    pub active: bool,
    pub position: Point,
    /// Created past the hard capacity.
    pub overflow: bool,
}

struct Entry {
    generation: u32,
    slot: Option<ViewSlot>,
}

/// Statistics about slot lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots currently alive.
    pub live: usize,
    /// Slots currently handed out.
    pub active: usize,
    /// Slots created since the pool was built.
    pub created: usize,
    /// Slots destroyed by compaction or teardown.
    pub destroyed: usize,
    /// Acquisitions served by an existing inactive slot.
    pub reused: usize,
    /// Slots created while the pool was already at hard capacity.
    pub overflow: usize,
    /// Slots whose render resource was destroyed out-of-band.
    pub purged: usize,
}

/// Bounded, growable pool of view slots.
///
/// Soft capacity is the configured pool size; the pool may grow to twice that
/// before acquisitions are reported as overflow. Overflow slots are still
/// created: a rendering request is never refused.
pub struct ViewPool<I> {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
    active: usize,
    soft_capacity: usize,
    cell_size: Size,
    surface: Rc<dyn RenderSurface<I>>,
    stats: PoolStats,
}

impl<I> ViewPool<I> {
    /// Creates the pool and instantiates `soft_capacity` inactive slots.
    pub fn new(soft_capacity: usize, cell_size: Size, surface: Rc<dyn RenderSurface<I>>) -> Self {
        let mut pool = Self {
            entries: Vec::with_capacity(soft_capacity.saturating_mul(2)),
            free: Vec::new(),
            live: 0,
            active: 0,
            soft_capacity,
            cell_size,
            surface,
            stats: PoolStats::default(),
        };
        for _ in 0..soft_capacity {
            pool.create_slot(false);
        }
        pool
    }

    #[inline]
    pub fn soft_capacity(&self) -> usize {
        self.soft_capacity
    }

    #[inline]
    pub fn hard_capacity(&self) -> usize {
        self.soft_capacity.saturating_mul(2)
    }

    /// Number of live slots, active or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.live,
            active: self.active,
            ..self.stats.clone()
        }
    }

    pub fn is_live(&self, handle: SlotHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: SlotHandle) -> Option<&ViewSlot> {
        self.entries
            .get(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.slot.as_ref())
    }

    fn get_mut(&mut self, handle: SlotHandle) -> Result<&mut ViewSlot, GridError> {
        self.entries
            .get_mut(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.slot.as_mut())
            .ok_or(GridError::ResourceDestroyed { slot: handle })
    }

    /// Live slot handles in pool order.
    pub fn handles(&self) -> impl Iterator<Item = SlotHandle> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry.slot.as_ref().map(|_| SlotHandle {
                index: index as u32,
                generation: entry.generation,
            })
        })
    }

    /// Hands out a slot, preferring the first inactive one.
    ///
    /// The returned slot is marked in use; the caller binds, positions and
    /// activates it on the surface.
    pub fn acquire(&mut self) -> SlotHandle {
        let reusable = self.entries.iter().position(|entry| {
            entry
                .slot
                .as_ref()
                .is_some_and(|slot| !slot.active)
        });
        if let Some(index) = reusable {
            let entry = &mut self.entries[index];
            if let Some(slot) = entry.slot.as_mut() {
                slot.active = true;
            }
            self.active += 1;
            self.stats.reused += 1;
            return SlotHandle {
                index: index as u32,
                generation: entry.generation,
            };
        }

        let overflow = self.live >= self.hard_capacity();
        if overflow {
            log::warn!(
                "ViewPool: {} slots in use at hard capacity {}, creating overflow slot",
                self.active,
                self.hard_capacity()
            );
            self.stats.overflow += 1;
        }
        let handle = self.create_slot(overflow);
        if let Ok(slot) = self.get_mut(handle) {
            slot.active = true;
        }
        self.active += 1;
        handle
    }

    /// Records what `handle` now displays.
    pub fn bind(&mut self, handle: SlotHandle, index: usize, position: Point) -> Result<(), GridError> {
        let slot = self.get_mut(handle)?;
        slot.bound = Some(index);
        slot.position = position;
        Ok(())
    }

    pub fn set_position(&mut self, handle: SlotHandle, position: Point) -> Result<(), GridError> {
        self.get_mut(handle)?.position = position;
        Ok(())
    }

    /// Marks the slot inactive without destroying it.
    pub fn release(&mut self, handle: SlotHandle) -> Result<(), GridError> {
        let slot = self.get_mut(handle)?;
        let was_active = slot.active;
        slot.active = false;
        slot.bound = None;
        if was_active {
            self.active -= 1;
        }
        self.surface.set_active(handle, false);
        Ok(())
    }

    /// Destroys inactive slots, newest first, until the pool is back at soft
    /// capacity. Active slots are never destroyed.
    ///
    /// Returns the number of slots destroyed.
    pub fn compact(&mut self) -> usize {
        let mut destroyed = 0;
        let mut index = self.entries.len();
        while self.live > self.soft_capacity && index > 0 {
            index -= 1;
            let inactive = self.entries[index]
                .slot
                .as_ref()
                .is_some_and(|slot| !slot.active);
            if inactive {
                let handle = SlotHandle {
                    index: index as u32,
                    generation: self.entries[index].generation,
                };
                self.surface.destroy(handle);
                self.vacate(index);
                self.stats.destroyed += 1;
                destroyed += 1;
            }
        }
        if destroyed > 0 {
            log::debug!(
                "ViewPool: compacted {} slots, {} live / soft capacity {}",
                destroyed,
                self.live,
                self.soft_capacity
            );
        }
        destroyed
    }

    /// The host destroyed the resource behind `handle` on its own.
    ///
    /// The entry is vacated without calling back into the surface. Returns
    /// `false` if the handle was already stale.
    pub fn mark_destroyed(&mut self, handle: SlotHandle) -> bool {
        let Some(active) = self.get(handle).map(|slot| slot.active) else {
            return false;
        };
        if active {
            self.active -= 1;
        }
        self.vacate(handle.index as usize);
        self.stats.purged += 1;
        true
    }

    /// Applies a new cell size to every live slot.
    pub fn resize_all(&mut self, cell_size: Size) {
        self.cell_size = cell_size;
        let handles: Vec<SlotHandle> = self.handles().collect();
        for handle in handles {
            self.surface.set_size(handle, cell_size);
        }
    }

    /// Destroys every slot, active or not.
    pub fn clear(&mut self) {
        for index in 0..self.entries.len() {
            if let Some(slot) = self.entries[index].slot.as_ref() {
                let handle = SlotHandle {
                    index: index as u32,
                    generation: self.entries[index].generation,
                };
                if slot.active {
                    self.surface.set_active(handle, false);
                }
                self.surface.destroy(handle);
                self.vacate(index);
                self.stats.destroyed += 1;
            }
        }
        self.active = 0;
    }

    fn create_slot(&mut self, overflow: bool) -> SlotHandle {
        let slot = ViewSlot {
            overflow,
            ..ViewSlot::default()
        };
        let handle = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.slot = Some(slot);
                SlotHandle {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    slot: Some(slot),
                });
                SlotHandle {
                    index: (self.entries.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.live += 1;
        self.stats.created += 1;
        self.surface.create(handle);
        self.surface.set_size(handle, self.cell_size);
        self.surface.set_active(handle, false);
        handle
    }

    fn vacate(&mut self, index: usize) {
        let entry = &mut self.entries[index];
        if entry.slot.take().is_some() {
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(index as u32);
            self.live -= 1;
        }
    }
}

impl<I> fmt::Debug for ViewPool<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewPool")
            .field("live", &self.live)
            .field("active", &self.active)
            .field("soft_capacity", &self.soft_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Card;
    use proptest::prelude::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct CountingSurface {
        created: RefCell<Vec<SlotHandle>>,
        destroyed: RefCell<Vec<SlotHandle>>,
    }

    impl RenderSurface<u32> for CountingSurface {
        fn create(&self, slot: SlotHandle) {
            self.created.borrow_mut().push(slot);
        }
        fn destroy(&self, slot: SlotHandle) {
            self.destroyed.borrow_mut().push(slot);
        }
        fn bind(&self, _slot: SlotHandle, _card: &Card<u32>) {}
        fn set_active(&self, _slot: SlotHandle, _active: bool) {}
        fn set_position(&self, _slot: SlotHandle, _position: Point) {}
        fn set_size(&self, _slot: SlotHandle, _size: Size) {}
    }

    fn pool(soft: usize) -> (ViewPool<u32>, Rc<CountingSurface>) {
        let surface = Rc::new(CountingSurface::default());
        let pool = ViewPool::new(soft, Size::new(10.0, 10.0), surface.clone());
        (pool, surface)
    }

    #[test]
    fn initialization_creates_soft_capacity_slots() {
        let (pool, surface) = pool(4);
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(surface.created.borrow().len(), 4);
    }

    #[test]
    fn acquire_reuses_inactive_before_growing() {
        let (mut pool, surface) = pool(2);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        pool.release(a).unwrap();
        assert_eq!(pool.acquire(), a);
        let c = pool.acquire();
        assert_eq!(pool.len(), 3);
        assert_eq!(surface.created.borrow().len(), 3);
        assert!(pool.get(c).is_some_and(|slot| slot.active));
    }

    #[test]
    fn acquire_past_hard_capacity_overflows_instead_of_failing() {
        let (mut pool, _) = pool(2);
        let handles: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.len(), 5);
        assert_eq!(pool.stats().overflow, 1);
        assert!(pool.get(handles[4]).is_some_and(|slot| slot.overflow));
    }

    #[test]
    fn compact_only_destroys_inactive_slots() {
        let (mut pool, surface) = pool(2);
        let handles: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        pool.release(handles[1]).unwrap();
        assert_eq!(pool.compact(), 1);
        assert_eq!(pool.len(), 3);
        assert_eq!(*surface.destroyed.borrow(), vec![handles[1]]);
        assert!(!pool.is_live(handles[1]));
        assert!(pool.is_live(handles[3]));
    }

    #[test]
    fn stale_handle_never_resolves_after_slot_reuse() {
        let (mut pool, _) = pool(1);
        let first = pool.acquire();
        assert!(pool.mark_destroyed(first));
        assert!(!pool.mark_destroyed(first));
        let second = pool.acquire();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(pool.get(first).is_none());
        assert_eq!(
            pool.release(first),
            Err(GridError::ResourceDestroyed { slot: first })
        );
        assert_eq!(pool.stats().purged, 1);
    }

    #[test]
    fn clear_destroys_everything() {
        let (mut pool, surface) = pool(3);
        pool.acquire();
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.active_count(), 0);
        assert_eq!(surface.destroyed.borrow().len(), 3);
    }

    proptest! {
        #[test]
        fn compaction_bounds_pool_size(soft in 1usize..10, ops in proptest::collection::vec(any::<bool>(), 0..120)) {
            let (mut pool, _) = pool(soft);
            let mut held = Vec::new();
            for acquire in ops {
                if acquire {
                    held.push(pool.acquire());
                } else if let Some(handle) = held.pop() {
                    pool.release(handle).unwrap();
                }
                if held.len() <= pool.hard_capacity() {
                    pool.compact();
                    prop_assert!(pool.len() <= pool.hard_capacity());
                }
            }
            for handle in held.drain(..) {
                pool.release(handle).unwrap();
            }
            pool.compact();
            prop_assert!(pool.len() <= soft);
            prop_assert_eq!(pool.active_count(), 0);
        }
    }
}
