//! In-memory collaborators that record what the grid asked of them.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cardgrid_foundation::lazy::{Point, Size, SlotHandle};
use cardgrid_foundation::{
    Asset, AssetCache, AssetKey, AssetLoadError, Card, DataSource, GridItem, GridNotice, ItemId,
    NotificationSink, RenderSurface, ScrollHost,
};
use cardgrid_runtime::{yield_now, LocalFuture};
use rustc_hash::{FxHashMap, FxHashSet};

/// Category used by [`TestCard`] to simulate filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Suit {
    Hearts,
    Spades,
}

/// Item type used throughout the tests.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCard {
    pub id: u64,
    pub suit: Suit,
    pub has_art: bool,
}

impl TestCard {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            suit: if id % 2 == 0 { Suit::Hearts } else { Suit::Spades },
            has_art: true,
        }
    }

    pub fn without_art(mut self) -> Self {
        self.has_art = false;
        self
    }

    pub fn art_key(id: u64) -> AssetKey {
        AssetKey::new(format!("cards/{id}.png"))
    }
}

impl GridItem for TestCard {
    fn id(&self) -> ItemId {
        ItemId(self.id)
    }

    fn asset_key(&self) -> Option<AssetKey> {
        self.has_art.then(|| Self::art_key(self.id))
    }
}

/// `count` cards with ids `0..count`.
pub fn deck(count: u64) -> Vec<TestCard> {
    (0..count).map(TestCard::new).collect()
}

/// What the surface knows about one slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotRecord {
    pub active: bool,
    pub position: Point,
    pub size: Size,
    pub bound: Option<ItemId>,
    pub asset: Option<Asset>,
    pub binds: usize,
}

/// Render surface that keeps the last known state of every slot.
#[derive(Default)]
pub struct RecordingSurface {
    slots: RefCell<FxHashMap<SlotHandle, SlotRecord>>,
    created: Cell<usize>,
    destroyed: Cell<usize>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, handle: SlotHandle) -> Option<SlotRecord> {
        self.slots.borrow().get(&handle).cloned()
    }

    /// Number of slots currently alive on the surface.
    pub fn live(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }

    /// Sorted ids bound to active slots.
    pub fn visible_items(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self
            .slots
            .borrow()
            .values()
            .filter(|slot| slot.active)
            .filter_map(|slot| slot.bound)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Simulates the host tearing down a slot's resource behind the grid's
    /// back. Pair with `VirtualGrid::on_slot_destroyed`.
    pub fn destroy_out_of_band(&self, handle: SlotHandle) {
        self.slots.borrow_mut().remove(&handle);
    }

    fn update(&self, handle: SlotHandle, f: impl FnOnce(&mut SlotRecord)) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(&handle) {
            f(slot);
        }
    }
}

impl<I: GridItem> RenderSurface<I> for RecordingSurface {
    fn create(&self, slot: SlotHandle) {
        self.created.set(self.created.get() + 1);
        self.slots.borrow_mut().insert(slot, SlotRecord::default());
    }

    fn destroy(&self, slot: SlotHandle) {
        self.destroyed.set(self.destroyed.get() + 1);
        self.slots.borrow_mut().remove(&slot);
    }

    fn bind(&self, slot: SlotHandle, card: &Card<I>) {
        self.update(slot, |record| {
            record.bound = Some(card.item.id());
            record.asset = card.asset.clone();
            record.binds += 1;
        });
    }

    fn set_active(&self, slot: SlotHandle, active: bool) {
        self.update(slot, |record| record.active = active);
    }

    fn set_position(&self, slot: SlotHandle, position: Point) {
        self.update(slot, |record| record.position = position);
    }

    fn set_size(&self, slot: SlotHandle, size: Size) {
        self.update(slot, |record| record.size = size);
    }
}

/// Data source over a replaceable vector.
pub struct VecSource<I> {
    items: RefCell<Vec<I>>,
    calls: Cell<usize>,
}

impl<I: Clone> VecSource<I> {
    pub fn new(items: Vec<I>) -> Self {
        Self {
            items: RefCell::new(items),
            calls: Cell::new(0),
        }
    }

    pub fn set(&self, items: Vec<I>) {
        *self.items.borrow_mut() = items;
    }

    /// How often the grid asked for the full collection.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl<I: Clone> DataSource<I> for VecSource<I> {
    fn get_all(&self) -> Vec<I> {
        self.calls.set(self.calls.get() + 1);
        self.items.borrow().clone()
    }
}

#[derive(Default)]
struct CacheState {
    cached: FxHashMap<AssetKey, Asset>,
    failing: FxHashSet<AssetKey>,
    pending_polls: usize,
    loads: Vec<AssetKey>,
    next_handle: u64,
}

/// Asset cache with scripted latency and failures.
///
/// Successful loads land in the cache, so a second load of the same key is
/// served by `get_cached`.
#[derive(Clone, Default)]
pub struct ScriptedAssetCache {
    state: Rc<RefCell<CacheState>>,
}

impl ScriptedAssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every load stays pending for `polls` polls before resolving.
    pub fn with_pending_polls(self, polls: usize) -> Self {
        self.state.borrow_mut().pending_polls = polls;
        self
    }

    pub fn fail(&self, key: AssetKey) {
        self.state.borrow_mut().failing.insert(key);
    }

    pub fn preload(&self, key: AssetKey) {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let asset = Asset::Loaded {
            key: key.clone(),
            handle: state.next_handle,
        };
        state.cached.insert(key, asset);
    }

    /// Keys passed to `load`, in call order.
    pub fn loads(&self) -> Vec<AssetKey> {
        self.state.borrow().loads.clone()
    }
}

impl<I: GridItem> AssetCache<I> for ScriptedAssetCache {
    fn is_cached(&self, item: &I) -> bool {
        item.asset_key()
            .is_some_and(|key| self.state.borrow().cached.contains_key(&key))
    }

    fn get_cached(&self, item: &I) -> Option<Asset> {
        let key = item.asset_key()?;
        self.state.borrow().cached.get(&key).cloned()
    }

    fn load(&self, key: AssetKey, _item: &I) -> LocalFuture<Result<Asset, AssetLoadError>> {
        let state = Rc::clone(&self.state);
        let polls = {
            let mut state = state.borrow_mut();
            state.loads.push(key.clone());
            state.pending_polls
        };
        Box::pin(async move {
            for _ in 0..polls {
                yield_now().await;
            }
            let mut state = state.borrow_mut();
            if state.failing.contains(&key) {
                return Err(AssetLoadError::new(key, "scripted failure"));
            }
            state.next_handle += 1;
            let asset = Asset::Loaded {
                key: key.clone(),
                handle: state.next_handle,
            };
            state.cached.insert(key, asset.clone());
            Ok(asset)
        })
    }
}

/// Scroll container with a settable offset.
///
/// `reset_scroll` only moves the offset; delivering the resulting
/// notification is up to the test, the way a real host delivers it on its
/// next event pass.
pub struct TestScrollHost {
    offset: Cell<f32>,
    viewport: Cell<f32>,
    content_height: Cell<f32>,
    resets: Cell<usize>,
}

impl TestScrollHost {
    pub fn new(viewport_height: f32) -> Self {
        Self {
            offset: Cell::new(0.0),
            viewport: Cell::new(viewport_height),
            content_height: Cell::new(0.0),
            resets: Cell::new(0),
        }
    }

    pub fn set_offset(&self, offset: f32) {
        self.offset.set(offset);
    }

    pub fn offset(&self) -> f32 {
        self.offset.get()
    }

    pub fn set_viewport(&self, height: f32) {
        self.viewport.set(height);
    }

    /// Last content height reported by the grid.
    pub fn reported_content_height(&self) -> f32 {
        self.content_height.get()
    }

    /// Largest offset the content allows.
    pub fn max_offset(&self) -> f32 {
        (self.content_height.get() - self.viewport.get()).max(0.0)
    }

    /// Current offset as a 0..=1 position.
    pub fn normalized_position(&self) -> f32 {
        let max = self.max_offset();
        if max <= 0.0 {
            return 0.0;
        }
        (self.offset.get() / max).clamp(0.0, 1.0)
    }

    pub fn resets(&self) -> usize {
        self.resets.get()
    }
}

impl ScrollHost for TestScrollHost {
    fn content_offset(&self) -> f32 {
        self.offset.get()
    }

    fn viewport_height(&self) -> f32 {
        self.viewport.get()
    }

    fn set_content_height(&self, height: f32) {
        self.content_height.set(height);
    }

    fn reset_scroll(&self) {
        self.offset.set(0.0);
        self.resets.set(self.resets.get() + 1);
    }
}

#[derive(Default)]
pub struct RecordingNotifications {
    notices: RefCell<Vec<GridNotice>>,
}

impl RecordingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<GridNotice> {
        self.notices.borrow().clone()
    }

    pub fn take(&self) -> Vec<GridNotice> {
        std::mem::take(&mut *self.notices.borrow_mut())
    }
}

impl NotificationSink for RecordingNotifications {
    fn notify(&self, notice: GridNotice) {
        log::debug!("RecordingNotifications: {:?}", notice);
        self.notices.borrow_mut().push(notice);
    }
}
