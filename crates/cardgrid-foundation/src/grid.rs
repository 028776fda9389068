//! The grid controller.
//!
//! [`VirtualGrid`] wires the windowing engine and the lazy load scheduler to
//! the host's collaborators and owns the explicit `init()` / `dispose()`
//! lifecycle. Its public operations are the error boundary: failures from
//! below are logged here and never reach the host.

use std::cell::Cell;
use std::rc::Rc;

use cardgrid_runtime::{Clock, RuntimeHandle};

use crate::config::GridConfig;
use crate::error::GridError;
use crate::host::{
    AssetCache, DataSource, GridCollaborators, GridNotice, NotificationSink, RenderSurface,
    ScrollHost, ScrollObserver,
};
use crate::item::GridItem;
use crate::lazy::{
    DataSink, GridParams, LazyLoadScheduler, LoadPhase, LoaderStats, PoolStats, ScrollOutcome,
    SinkSubscription, SlotHandle, SubBatchDispatcher, ViewportHandler, ViewportState,
    WindowReport, WindowingEngine,
};

/// Snapshot of pool and loader counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridStats {
    pub pool: PoolStats,
    pub loader: LoaderStats,
    pub active: usize,
    pub sink_len: usize,
    pub queue_len: usize,
    pub in_flight: bool,
}

struct Running<I> {
    window: WindowingEngine<I>,
    scheduler: LazyLoadScheduler<I>,
    source: Rc<dyn DataSource<I>>,
    scroll_host: Rc<dyn ScrollHost>,
    notifications: Option<Rc<dyn NotificationSink>>,
    viewport: ViewportHandler,
    /// Raw host height the current `viewport` was derived from.
    raw_viewport_height: f32,
    buffer_rows: usize,
    /// Set by the sink subscription, cleared by every recompute.
    window_dirty: Rc<Cell<bool>>,
    subscription: SinkSubscription,
    content_height: Option<f32>,
}

enum GridState<I> {
    Uninitialized,
    /// Initialization failed; every operation is a no-op.
    Inert(GridError),
    Running(Box<Running<I>>),
    Disposed,
}

/// A virtualized, lazily loaded card grid.
///
/// The host drives it from a single thread: scroll notifications go to
/// [`scroll`](Self::scroll) (or the [`ScrollObserver`] impl), and once per
/// frame the host ticks its runtime and calls [`frame`](Self::frame) so cards
/// appended by background batches get windowed.
pub struct VirtualGrid<I: GridItem> {
    config: GridConfig,
    collaborators: GridCollaborators<I>,
    runtime: RuntimeHandle,
    clock: Rc<dyn Clock>,
    state: GridState<I>,
}

impl<I: GridItem> VirtualGrid<I> {
    pub fn new(
        config: GridConfig,
        collaborators: GridCollaborators<I>,
        runtime: RuntimeHandle,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            collaborators,
            runtime,
            clock,
            state: GridState::Uninitialized,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Validates configuration, builds the pool and performs the initial
    /// load.
    ///
    /// On misconfiguration the grid logs the problem and becomes inert; the
    /// error is returned for the host's information only. Calling `init` on
    /// a running grid does nothing; calling it after `dispose` is rejected.
    pub fn init(&mut self) -> Result<(), GridError> {
        match &self.state {
            GridState::Running(_) => return Ok(()),
            GridState::Disposed => {
                let err = GridError::transient("init", "grid was disposed");
                log::error!("VirtualGrid: {}", err);
                return Err(err);
            }
            GridState::Inert(err) => return Err(err.clone()),
            GridState::Uninitialized => {}
        }

        match self.start() {
            Ok(running) => {
                self.state = GridState::Running(Box::new(running));
                if let Err(err) = self.load(false) {
                    log::error!("VirtualGrid: initial load failed: {}", err);
                }
                Ok(())
            }
            Err(err) => {
                log::error!("VirtualGrid: {}; grid is inert", err);
                self.state = GridState::Inert(err.clone());
                Err(err)
            }
        }
    }

    fn start(&self) -> Result<Running<I>, GridError> {
        self.config.validate()?;
        let source: Rc<dyn DataSource<I>> = required(&self.collaborators.data_source, "data source")?;
        let cache: Rc<dyn AssetCache<I>> = required(&self.collaborators.asset_cache, "asset cache")?;
        let surface: Rc<dyn RenderSurface<I>> =
            required(&self.collaborators.surface, "render surface")?;
        let scroll_host: Rc<dyn ScrollHost> =
            required(&self.collaborators.scroll_host, "scroll host")?;
        let notifications = self.collaborators.notifications.clone();

        let params = self.config.grid_params();
        let sink = DataSink::new();
        let window_dirty = Rc::new(Cell::new(true));
        let dirty = Rc::clone(&window_dirty);
        let subscription = sink.subscribe(move |change| {
            log::trace!("VirtualGrid: sink {:?}", change);
            dirty.set(true);
        });
        let dispatcher = SubBatchDispatcher::new(sink, cache, self.config.sub_batch_size);
        let scheduler = LazyLoadScheduler::new(
            &self.config,
            dispatcher,
            self.runtime.clone(),
            Rc::clone(&self.clock),
            notifications.clone(),
        );
        let raw_viewport_height = scroll_host.viewport_height();
        Ok(Running {
            window: WindowingEngine::new(params, self.config.pool_size, surface),
            scheduler,
            source,
            viewport: ViewportHandler::new(raw_viewport_height, params.row_pitch()),
            raw_viewport_height,
            scroll_host,
            notifications,
            buffer_rows: self.config.buffer_rows,
            window_dirty,
            subscription,
            content_height: None,
        })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, GridState::Running(_))
    }

    pub fn is_inert(&self) -> bool {
        matches!(self.state, GridState::Inert(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, GridState::Disposed)
    }

    fn running(&self) -> Option<&Running<I>> {
        match &self.state {
            GridState::Running(running) => Some(&**running),
            _ => None,
        }
    }

    fn running_mut(&mut self) -> Option<&mut Running<I>> {
        match &mut self.state {
            GridState::Running(running) => Some(&mut **running),
            _ => None,
        }
    }

    /// Delivers a scroll notification. `normalized_position` runs from 0.0
    /// at the top to 1.0 at the bottom.
    ///
    /// Returns `None` when the grid is not running or the notification could
    /// not be handled.
    pub fn scroll(&mut self, normalized_position: f32) -> Option<ScrollOutcome> {
        let running = self.running_mut()?;
        if let Err(err) = running.recompute() {
            log::error!("VirtualGrid: window recompute failed: {}", err);
        }
        match running.scheduler.on_scroll(normalized_position) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                log::error!("VirtualGrid: scroll handling failed: {}", err);
                None
            }
        }
    }

    /// Per-frame upkeep. Recomputes the window if the sink changed since the
    /// last recompute, and keeps the host's content height current.
    pub fn frame(&mut self) -> Option<WindowReport> {
        let running = self.running_mut()?;
        if !running.window_dirty.get() {
            return None;
        }
        match running.recompute() {
            Ok(report) => Some(report),
            Err(err) => {
                log::error!("VirtualGrid: window recompute failed: {}", err);
                None
            }
        }
    }

    /// Swaps the item source (a filter change) and reloads from it.
    ///
    /// The sink is cleared, the initial window is loaded synchronously, the
    /// host's scroll position is reset to the top, and the scroll
    /// notification that reset produces is ignored.
    pub fn replace_source(&mut self, source: Rc<dyn DataSource<I>>) {
        let Some(running) = self.running_mut() else {
            return;
        };
        running.source = source;
        if let Err(err) = self.load(true) {
            log::error!("VirtualGrid: source replacement failed: {}", err);
        }
    }

    /// Reloads from the current source.
    pub fn reload(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(err) = self.load(true) {
            log::error!("VirtualGrid: reload failed: {}", err);
        }
    }

    fn load(&mut self, replacing: bool) -> Result<(), GridError> {
        let Some(running) = self.running_mut() else {
            return Ok(());
        };
        let items = running.source.get_all();
        if items.is_empty() {
            let err = GridError::InvalidData {
                reason: "data source returned no items".into(),
            };
            log::warn!("VirtualGrid: {}; showing an empty grid", err);
        }
        let total = items.len();
        running.scheduler.load_source(items, replacing)?;
        if replacing {
            running.scroll_host.reset_scroll();
        }
        running.recompute()?;
        if replacing {
            running.notify(GridNotice::SourceReplaced { total });
        }
        Ok(())
    }

    /// Applies new cell geometry, repositioning and resizing every slot.
    pub fn set_grid_params(&mut self, params: GridParams) -> Result<(), GridError> {
        let Some(running) = self.running_mut() else {
            return Ok(());
        };
        if let Err(err) = running.window.set_params(params) {
            log::error!("VirtualGrid: rejected grid parameters: {}", err);
            return Err(err);
        }
        running.viewport = ViewportHandler::new(running.raw_viewport_height, params.row_pitch());
        running.content_height = None;
        if let Err(err) = running.recompute() {
            log::error!("VirtualGrid: window recompute failed: {}", err);
        }
        Ok(())
    }

    /// The host destroyed a slot's render resource out of band.
    pub fn on_slot_destroyed(&mut self, handle: SlotHandle) {
        let Some(running) = self.running_mut() else {
            return;
        };
        if running.window.mark_destroyed(handle) {
            log::debug!(
                "VirtualGrid: {}",
                GridError::ResourceDestroyed { slot: handle }
            );
        }
    }

    /// Tears down every slot and drops the remaining queue. All later calls
    /// are no-ops.
    pub fn dispose(&mut self) {
        if let GridState::Running(running) = &mut self.state {
            running.scheduler.dispose();
            running.scheduler.sink().unsubscribe(running.subscription);
            running.window.teardown();
            log::debug!("VirtualGrid: disposed");
        }
        self.state = GridState::Disposed;
    }

    pub fn stats(&self) -> GridStats {
        let Some(running) = self.running() else {
            return GridStats::default();
        };
        GridStats {
            pool: running.window.pool_stats(),
            loader: running.scheduler.stats(),
            active: running.window.active_count(),
            sink_len: running.scheduler.sink().len(),
            queue_len: running.scheduler.queue_len(),
            in_flight: running.scheduler.in_flight(),
        }
    }

    pub fn active_indices(&self) -> Vec<usize> {
        self.running()
            .map(|running| running.window.active_indices())
            .unwrap_or_default()
    }

    pub fn slot_for(&self, index: usize) -> Option<SlotHandle> {
        self.running()?.window.slot_for(index)
    }

    pub fn sink(&self) -> Option<&DataSink<I>> {
        self.running().map(|running| running.scheduler.sink())
    }

    pub fn phase(&self) -> LoadPhase {
        self.running()
            .map(|running| running.scheduler.phase())
            .unwrap_or_default()
    }

    pub fn dynamic_batch_size(&self) -> Option<usize> {
        self.running()
            .map(|running| running.scheduler.dynamic_batch_size())
    }
}

impl<I: GridItem> Running<I> {
    fn recompute(&mut self) -> Result<WindowReport, GridError> {
        let raw_height = self.scroll_host.viewport_height();
        if raw_height.to_bits() != self.raw_viewport_height.to_bits() {
            self.raw_viewport_height = raw_height;
            self.viewport = ViewportHandler::new(raw_height, self.window.params().row_pitch());
        }
        let viewport = ViewportState::new(
            self.scroll_host.content_offset(),
            self.viewport.effective_height(),
            self.buffer_rows,
        );
        let sink = self.scheduler.sink();
        let report = self.window.recompute(&viewport, sink)?;
        self.window_dirty.set(false);

        let height = self
            .window
            .params()
            .content_height(sink.len(), viewport.viewport_height);
        if self.content_height != Some(height) {
            self.content_height = Some(height);
            self.scroll_host.set_content_height(height);
        }
        Ok(report)
    }

    fn notify(&self, notice: GridNotice) {
        if let Some(sink) = &self.notifications {
            sink.notify(notice);
        }
    }
}

impl<I: GridItem> ScrollObserver for VirtualGrid<I> {
    fn on_scroll(&mut self, normalized_position: f32) {
        self.scroll(normalized_position);
    }
}

impl<I: GridItem> Drop for VirtualGrid<I> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn required<T: ?Sized>(slot: &Option<Rc<T>>, what: &'static str) -> Result<Rc<T>, GridError> {
    slot.clone()
        .ok_or(GridError::ConfigurationMissing { what })
}
