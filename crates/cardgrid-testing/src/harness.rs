use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use cardgrid_foundation::lazy::ScrollOutcome;
use cardgrid_foundation::{GridCollaborators, GridConfig, GridError, GridStats, ItemId, VirtualGrid};
use cardgrid_runtime::{ManualClock, Runtime, StdScheduler};

use crate::fakes::{
    RecordingNotifications, RecordingSurface, ScriptedAssetCache, TestCard, TestScrollHost,
    VecSource,
};

/// Upper bound on ticks spent in [`GridHarness::pump_until_idle`].
const MAX_PUMP_TICKS: usize = 1_000;

/// Headless harness wiring a [`VirtualGrid`] to recording fakes.
///
/// Time only moves when the test calls [`advance`](Self::advance), and the
/// background loader only progresses on [`tick`](Self::tick) or
/// [`pump_until_idle`](Self::pump_until_idle), so every test is
/// deterministic.
pub struct GridHarness {
    runtime: Runtime,
    scheduler: Arc<StdScheduler>,
    clock: Rc<ManualClock>,
    surface: Rc<RecordingSurface>,
    cache: ScriptedAssetCache,
    host: Rc<TestScrollHost>,
    notices: Rc<RecordingNotifications>,
    grid: VirtualGrid<TestCard>,
}

impl GridHarness {
    /// Builds the harness without initializing the grid.
    pub fn new(config: GridConfig, cards: Vec<TestCard>) -> Self {
        Self::with_cache(config, cards, ScriptedAssetCache::new())
    }

    pub fn with_cache(config: GridConfig, cards: Vec<TestCard>, cache: ScriptedAssetCache) -> Self {
        let scheduler = Arc::new(StdScheduler::new());
        let runtime = Runtime::new(scheduler.clone());
        let clock = Rc::new(ManualClock::new());
        let surface = Rc::new(RecordingSurface::new());
        let host = Rc::new(TestScrollHost::new(600.0));
        let notices = Rc::new(RecordingNotifications::new());

        let collaborators = GridCollaborators::<TestCard>::new()
            .with_data_source(Rc::new(VecSource::new(cards)))
            .with_asset_cache(Rc::new(cache.clone()))
            .with_surface(surface.clone())
            .with_scroll_host(host.clone())
            .with_notifications(notices.clone());
        let grid = VirtualGrid::new(config, collaborators, runtime.handle(), clock.clone());

        Self {
            runtime,
            scheduler,
            clock,
            surface,
            cache,
            host,
            notices,
            grid,
        }
    }

    /// Builds and initializes the grid.
    pub fn start(config: GridConfig, cards: Vec<TestCard>) -> Self {
        let mut harness = Self::new(config, cards);
        if let Err(err) = harness.grid.init() {
            panic!("grid failed to initialize: {err}");
        }
        harness
    }

    pub fn init(&mut self) -> Result<(), GridError> {
        self.grid.init()
    }

    pub fn grid(&self) -> &VirtualGrid<TestCard> {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut VirtualGrid<TestCard> {
        &mut self.grid
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn surface(&self) -> &RecordingSurface {
        &self.surface
    }

    pub fn cache(&self) -> &ScriptedAssetCache {
        &self.cache
    }

    pub fn host(&self) -> &TestScrollHost {
        &self.host
    }

    pub fn notices(&self) -> &RecordingNotifications {
        &self.notices
    }

    pub fn stats(&self) -> GridStats {
        self.grid.stats()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Moves the host to `offset` and delivers the matching notification.
    pub fn scroll_to(&mut self, offset: f32) -> Option<ScrollOutcome> {
        self.host.set_offset(offset);
        let position = self.host.normalized_position();
        self.grid.scroll(position)
    }

    /// Delivers a raw normalized position without moving the host.
    pub fn notify_scroll(&mut self, position: f32) -> Option<ScrollOutcome> {
        self.grid.scroll(position)
    }

    /// Swaps in a new item set the way a filter change would.
    pub fn replace_items(&mut self, cards: Vec<TestCard>) {
        self.grid.replace_source(Rc::new(VecSource::new(cards)));
    }

    /// One host frame: tick the runtime, then let the grid window new cards.
    pub fn tick(&mut self) {
        self.runtime.tick();
        self.grid.frame();
    }

    /// Ticks until no task remains.
    ///
    /// Panics if the runtime is still busy after a generous number of ticks.
    pub fn pump_until_idle(&mut self) -> usize {
        let mut ticks = 0;
        while self.runtime.has_pending_tasks() {
            ticks += 1;
            if ticks > MAX_PUMP_TICKS {
                panic!("pump_until_idle: runtime still busy after {MAX_PUMP_TICKS} ticks");
            }
            self.tick();
        }
        self.scheduler.take_tick_request();
        self.grid.frame();
        ticks
    }

    /// Ids bound to active slots on the surface, sorted.
    pub fn visible_items(&self) -> Vec<ItemId> {
        self.surface.visible_items()
    }
}
