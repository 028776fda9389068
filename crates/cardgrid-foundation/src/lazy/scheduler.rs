//! Lazy load scheduler.
//!
//! Turns scroll notifications into load batches. Notifications pass through
//! a cooldown gate, feed the velocity heuristic that sizes the next batch,
//! and start a load when the position is close enough to the trailing edge.
//! At most one batch runs at a time; it executes as a task on the
//! cooperative runtime and drains the remaining queue one sub-batch at a
//! time through the [`SubBatchDispatcher`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use cardgrid_runtime::{Clock, RuntimeHandle, TaskHandle};

use super::dispatcher::{BatchCommit, DispatchReport, SubBatchDispatcher};
use super::sink::DataSink;
use crate::config::{BatchPolicy, GridConfig};
use crate::error::GridError;
use crate::host::{GridNotice, NotificationSink};
use crate::item::GridItem;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadPhase {
    #[default]
    Idle,
    Scheduling,
    Loading,
}

/// What a scroll notification resulted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// Swallowed by the one-shot ignore flag armed on source replacement.
    Ignored,
    /// Arrived within the cooldown of the previous accepted notification.
    Debounced,
    /// Accepted, but not near the trailing edge or nothing left to load.
    NoLoad,
    /// Accepted while a batch was already running; dropped.
    InFlight,
    LoadStarted { count: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub batches_started: u64,
    pub batches_completed: u64,
    pub batches_abandoned: u64,
    pub batches_failed: u64,
    pub items_appended: u64,
    pub asset_failures: u64,
    pub debounced: u64,
    pub ignored: u64,
}

struct LoadShared<I> {
    phase: LoadPhase,
    queue: VecDeque<I>,
    dynamic_batch: usize,
    last_position: Option<f32>,
    last_accepted_at: Option<Duration>,
    in_flight: bool,
    /// Bumped on every source replacement. Batches remember the epoch they
    /// were started under and stop appending once it moves on.
    epoch: u64,
    ignore_next: bool,
    total: usize,
    stats: LoaderStats,
}

impl<I> LoadShared<I> {
    fn new(dynamic_batch: usize) -> Self {
        Self {
            phase: LoadPhase::Idle,
            queue: VecDeque::new(),
            dynamic_batch,
            last_position: None,
            last_accepted_at: None,
            in_flight: false,
            epoch: 0,
            ignore_next: false,
            total: 0,
            stats: LoaderStats::default(),
        }
    }
}

type SharedState<I> = Rc<RefCell<LoadShared<I>>>;

/// Releases the in-flight flag when the load task ends, however it ends.
///
/// Moved into the task future, so cancellation and a runtime that refuses
/// the spawn both drop it too.
struct InFlightGuard<I> {
    shared: SharedState<I>,
}

impl<I> Drop for InFlightGuard<I> {
    fn drop(&mut self) {
        match self.shared.try_borrow_mut() {
            Ok(mut shared) => {
                shared.in_flight = false;
                shared.phase = LoadPhase::Idle;
            }
            Err(_) => log::error!("InFlightGuard: load state busy, in-flight flag not cleared"),
        }
    }
}

/// Removes items from the remaining queue as their sub-batch lands in the
/// sink.
struct QueueCommit<I> {
    shared: SharedState<I>,
    epoch: u64,
}

impl<I> BatchCommit for QueueCommit<I> {
    fn is_current(&self) -> bool {
        self.shared
            .try_borrow()
            .map(|shared| shared.epoch == self.epoch)
            .unwrap_or(false)
    }

    fn committed(&mut self, count: usize) -> Result<(), GridError> {
        let mut shared = self
            .shared
            .try_borrow_mut()
            .map_err(|_| GridError::transient("commit", "load state busy"))?;
        let count = count.min(shared.queue.len());
        shared.queue.drain(..count);
        shared.stats.items_appended += count as u64;
        Ok(())
    }
}

pub struct LazyLoadScheduler<I> {
    shared: SharedState<I>,
    dispatcher: Rc<SubBatchDispatcher<I>>,
    runtime: RuntimeHandle,
    clock: Rc<dyn Clock>,
    notifications: Option<Rc<dyn NotificationSink>>,
    policy: BatchPolicy,
    base_batch: usize,
    initial_count: usize,
    scroll_threshold: f32,
    cooldown: Duration,
    task: Option<TaskHandle>,
}

impl<I: GridItem> LazyLoadScheduler<I> {
    pub fn new(
        config: &GridConfig,
        dispatcher: SubBatchDispatcher<I>,
        runtime: RuntimeHandle,
        clock: Rc<dyn Clock>,
        notifications: Option<Rc<dyn NotificationSink>>,
    ) -> Self {
        let base_batch = config.effective_batch_size();
        Self {
            shared: Rc::new(RefCell::new(LoadShared::new(base_batch))),
            dispatcher: Rc::new(dispatcher),
            runtime,
            clock,
            notifications,
            policy: config.batch_policy.clone(),
            base_batch,
            initial_count: config.initial_item_count,
            scroll_threshold: config.scroll_threshold,
            cooldown: config.scroll_cooldown,
            task: None,
        }
    }

    pub fn sink(&self) -> &DataSink<I> {
        self.dispatcher.sink()
    }

    pub fn phase(&self) -> LoadPhase {
        self.read(|shared| shared.phase).unwrap_or_default()
    }

    pub fn queue_len(&self) -> usize {
        self.read(|shared| shared.queue.len()).unwrap_or(0)
    }

    pub fn in_flight(&self) -> bool {
        self.read(|shared| shared.in_flight).unwrap_or(false)
    }

    pub fn dynamic_batch_size(&self) -> usize {
        self.read(|shared| shared.dynamic_batch)
            .unwrap_or(self.base_batch)
    }

    /// Number of items the current source supplied.
    pub fn total(&self) -> usize {
        self.read(|shared| shared.total).unwrap_or(0)
    }

    pub fn stats(&self) -> LoaderStats {
        self.read(|shared| shared.stats).unwrap_or_default()
    }

    fn read<R>(&self, f: impl FnOnce(&LoadShared<I>) -> R) -> Option<R> {
        self.shared.try_borrow().ok().map(|shared| f(&shared))
    }

    /// Replaces the item set.
    ///
    /// Clears the sink, appends the first `initial_item_count` items
    /// synchronously and queues the rest. A batch still running for the old
    /// items stops at its next sub-batch boundary. With `ignore_next` set the
    /// next scroll notification is swallowed; hosts reset their scroll
    /// position after a replacement and that notification is not user input.
    ///
    /// Returns the number of items appended synchronously.
    pub fn load_source(&mut self, mut items: Vec<I>, ignore_next: bool) -> Result<usize, GridError> {
        let total = items.len();
        let remainder = items.split_off(self.initial_count.min(total));
        let initial = items.len();

        let sink = self.dispatcher.sink();
        sink.clear()?;
        sink.append_batch(self.dispatcher.cached_cards(items))?;

        let mut shared = self
            .shared
            .try_borrow_mut()
            .map_err(|_| GridError::transient("load_source", "load state busy"))?;
        shared.epoch += 1;
        shared.queue = remainder.into();
        shared.total = total;
        shared.dynamic_batch = self.base_batch;
        shared.last_position = None;
        shared.last_accepted_at = None;
        shared.ignore_next = ignore_next;
        if !shared.in_flight {
            shared.phase = LoadPhase::Idle;
        }
        log::debug!(
            "LazyLoadScheduler: source loaded, {} of {} items appended, {} queued",
            initial,
            total,
            shared.queue.len()
        );
        Ok(initial)
    }

    /// Handles one scroll notification. `position` is normalized, 0.0 at the
    /// top and 1.0 at the bottom.
    pub fn on_scroll(&mut self, position: f32) -> Result<ScrollOutcome, GridError> {
        let position = if position.is_finite() {
            position.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let now = self.clock.now();

        let mut shared = self
            .shared
            .try_borrow_mut()
            .map_err(|_| GridError::transient("on_scroll", "load state busy"))?;

        if shared.ignore_next {
            shared.ignore_next = false;
            shared.last_position = Some(position);
            shared.stats.ignored += 1;
            return Ok(ScrollOutcome::Ignored);
        }
        if let Some(accepted) = shared.last_accepted_at {
            if now.saturating_sub(accepted) < self.cooldown {
                shared.stats.debounced += 1;
                return Ok(ScrollOutcome::Debounced);
            }
        }
        shared.last_accepted_at = Some(now);
        if !shared.in_flight {
            shared.phase = LoadPhase::Scheduling;
        }

        if let Some(previous) = shared.last_position {
            let delta = (position - previous).abs();
            shared.dynamic_batch = self.policy.adjust(shared.dynamic_batch, delta);
        }
        shared.last_position = Some(position);

        if shared.in_flight {
            return Ok(ScrollOutcome::InFlight);
        }
        if position < 1.0 - self.scroll_threshold || shared.queue.is_empty() {
            shared.phase = LoadPhase::Idle;
            return Ok(ScrollOutcome::NoLoad);
        }

        let count = shared.dynamic_batch.min(shared.queue.len());
        let batch: Vec<I> = shared.queue.iter().take(count).cloned().collect();
        let epoch = shared.epoch;
        shared.in_flight = true;
        shared.phase = LoadPhase::Loading;
        shared.stats.batches_started += 1;
        drop(shared);

        log::debug!(
            "LazyLoadScheduler: loading {} items (batch size {})",
            count,
            self.dynamic_batch_size()
        );
        self.launch(batch, epoch)?;
        Ok(ScrollOutcome::LoadStarted { count })
    }

    fn launch(&mut self, batch: Vec<I>, epoch: u64) -> Result<(), GridError> {
        let guard = InFlightGuard {
            shared: Rc::clone(&self.shared),
        };
        let mut commit = QueueCommit {
            shared: Rc::clone(&self.shared),
            epoch,
        };
        let shared = Rc::clone(&self.shared);
        let dispatcher = Rc::clone(&self.dispatcher);
        let notifications = self.notifications.clone();

        let task = self.runtime.spawn(async move {
            let _guard = guard;
            let result = dispatcher.dispatch(batch, &mut commit).await;
            let notices = finish_batch(&shared, epoch, result);
            if let Some(sink) = notifications {
                for notice in notices {
                    sink.notify(notice);
                }
            }
        });
        match task {
            Some(task) => {
                self.task = Some(task);
                Ok(())
            }
            // The unspawned future was dropped along with its guard.
            None => Err(GridError::transient("on_scroll", "runtime is gone")),
        }
    }

    /// Cancels a running batch and drops the remaining queue.
    pub fn dispose(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        if let Ok(mut shared) = self.shared.try_borrow_mut() {
            shared.epoch += 1;
            shared.queue.clear();
            shared.in_flight = false;
            shared.ignore_next = false;
            shared.phase = LoadPhase::Idle;
        }
    }
}

/// Records the outcome of a finished batch and returns the notices to send.
fn finish_batch<I>(
    shared: &SharedState<I>,
    epoch: u64,
    result: Result<DispatchReport, GridError>,
) -> Vec<GridNotice> {
    let Ok(mut shared) = shared.try_borrow_mut() else {
        log::error!("LazyLoadScheduler: load state busy, batch outcome lost");
        return Vec::new();
    };
    let mut notices = Vec::new();
    match result {
        Ok(report) if report.abandoned => {
            shared.stats.batches_abandoned += 1;
            log::debug!(
                "LazyLoadScheduler: batch abandoned after {} items",
                report.appended
            );
        }
        Ok(report) => {
            shared.stats.batches_completed += 1;
            shared.stats.asset_failures += report.asset_failures as u64;
            log::debug!(
                "LazyLoadScheduler: batch done, {} items in {} sub-batches, {} left",
                report.appended,
                report.sub_batches,
                shared.queue.len()
            );
            if report.asset_failures > 0 {
                notices.push(GridNotice::AssetsDegraded {
                    failed: report.asset_failures,
                });
            }
            if shared.queue.is_empty() && shared.epoch == epoch {
                notices.push(GridNotice::AllItemsLoaded {
                    total: shared.total,
                });
            }
        }
        Err(err) => {
            shared.stats.batches_failed += 1;
            log::error!("LazyLoadScheduler: load step failed: {}", err);
            notices.push(GridNotice::LoadFailed {
                reason: err.to_string(),
            });
        }
    }
    notices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssetLoadError;
    use crate::host::AssetCache;
    use crate::item::{Asset, AssetKey, ItemId};
    use cardgrid_runtime::{LocalFuture, ManualClock, Runtime, StdScheduler};
    use std::sync::Arc;

    #[derive(Clone, Debug)]
    struct Tile(u64);

    impl GridItem for Tile {
        fn id(&self) -> ItemId {
            ItemId(self.0)
        }
    }

    struct NoCache;

    impl AssetCache<Tile> for NoCache {
        fn is_cached(&self, _: &Tile) -> bool {
            false
        }
        fn get_cached(&self, _: &Tile) -> Option<Asset> {
            None
        }
        fn load(&self, key: AssetKey, _: &Tile) -> LocalFuture<Result<Asset, AssetLoadError>> {
            Box::pin(async move { Ok(Asset::Loaded { key, handle: 0 }) })
        }
    }

    #[derive(Default)]
    struct Notices(RefCell<Vec<GridNotice>>);

    impl NotificationSink for Notices {
        fn notify(&self, notice: GridNotice) {
            self.0.borrow_mut().push(notice);
        }
    }

    struct Fixture {
        runtime: Runtime,
        clock: Rc<ManualClock>,
        notices: Rc<Notices>,
        scheduler: LazyLoadScheduler<Tile>,
    }

    fn fixture(config: GridConfig) -> Fixture {
        let runtime = Runtime::new(Arc::new(StdScheduler::new()));
        let clock = Rc::new(ManualClock::new());
        let notices = Rc::new(Notices::default());
        let dispatcher =
            SubBatchDispatcher::new(DataSink::new(), Rc::new(NoCache), config.sub_batch_size);
        let scheduler = LazyLoadScheduler::new(
            &config,
            dispatcher,
            runtime.handle(),
            clock.clone(),
            Some(notices.clone() as Rc<dyn NotificationSink>),
        );
        Fixture {
            runtime,
            clock,
            notices,
            scheduler,
        }
    }

    fn tiles(count: u64) -> Vec<Tile> {
        (0..count).map(Tile).collect()
    }

    impl Fixture {
        fn step(&mut self, position: f32) -> ScrollOutcome {
            self.clock.advance(Duration::from_millis(200));
            self.scheduler.on_scroll(position).unwrap()
        }
    }

    #[test]
    fn initial_load_fills_sink_and_queues_rest() {
        let mut f = fixture(GridConfig::default());
        assert_eq!(f.scheduler.load_source(tiles(77), false).unwrap(), 30);
        assert_eq!(f.scheduler.sink().len(), 30);
        assert_eq!(f.scheduler.queue_len(), 47);
        assert_eq!(f.scheduler.total(), 77);
        assert_eq!(f.scheduler.phase(), LoadPhase::Idle);
    }

    #[test]
    fn small_sources_load_entirely() {
        let mut f = fixture(GridConfig::default());
        assert_eq!(f.scheduler.load_source(tiles(3), false).unwrap(), 3);
        assert_eq!(f.scheduler.queue_len(), 0);
        assert_eq!(f.step(1.0), ScrollOutcome::NoLoad);

        assert_eq!(f.scheduler.load_source(Vec::new(), false).unwrap(), 0);
        assert!(f.scheduler.sink().is_empty());
    }

    #[test]
    fn far_from_edge_does_not_load() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), false).unwrap();
        assert_eq!(f.step(0.5), ScrollOutcome::NoLoad);
        assert_eq!(f.step(0.79), ScrollOutcome::NoLoad);
        assert_eq!(f.scheduler.phase(), LoadPhase::Idle);
        assert_eq!(f.scheduler.queue_len(), 47);
    }

    #[test]
    fn load_drains_queue_and_clears_in_flight() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), false).unwrap();

        assert_eq!(f.step(0.9), ScrollOutcome::LoadStarted { count: 20 });
        assert!(f.scheduler.in_flight());
        assert_eq!(f.scheduler.phase(), LoadPhase::Loading);

        f.runtime.run_until_idle(100);
        assert!(!f.scheduler.in_flight());
        assert_eq!(f.scheduler.phase(), LoadPhase::Idle);
        assert_eq!(f.scheduler.queue_len(), 27);
        assert_eq!(f.scheduler.sink().len(), 50);
        assert_eq!(
            f.scheduler.sink().item_id(49),
            Some(ItemId(49)),
            "items land in source order"
        );
        let stats = f.scheduler.stats();
        assert_eq!(stats.batches_completed, 1);
        assert_eq!(stats.items_appended, 20);
    }

    #[test]
    fn queue_shrinks_per_sub_batch() {
        let mut f = fixture(GridConfig::default().with_sub_batch_size(5));
        f.scheduler.load_source(tiles(77), false).unwrap();
        f.step(0.9);

        f.runtime.tick();
        assert_eq!(f.scheduler.queue_len(), 42);
        f.runtime.tick();
        assert_eq!(f.scheduler.queue_len(), 37);
        assert!(f.scheduler.in_flight());
    }

    #[test]
    fn notifications_during_cooldown_are_debounced() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), false).unwrap();
        f.step(0.5);
        f.clock.advance(Duration::from_millis(100));
        assert_eq!(
            f.scheduler.on_scroll(0.95).unwrap(),
            ScrollOutcome::Debounced
        );
        assert_eq!(f.scheduler.stats().debounced, 1);
        assert!(!f.scheduler.in_flight());
    }

    #[test]
    fn notification_while_loading_is_dropped() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), false).unwrap();
        assert!(matches!(f.step(0.9), ScrollOutcome::LoadStarted { .. }));
        assert_eq!(f.step(0.95), ScrollOutcome::InFlight);
        assert_eq!(f.scheduler.queue_len(), 47);
        assert_eq!(f.scheduler.stats().batches_started, 1);
    }

    #[test]
    fn fast_scrolling_grows_batches_and_slow_scrolling_shrinks_them() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(500), false).unwrap();
        f.step(0.0);
        f.step(0.3);
        assert_eq!(f.scheduler.dynamic_batch_size(), 25);
        f.step(0.6);
        assert_eq!(f.scheduler.dynamic_batch_size(), 30);
        f.step(0.0);
        assert_eq!(f.scheduler.dynamic_batch_size(), 30);
        f.step(0.01);
        assert_eq!(f.scheduler.dynamic_batch_size(), 28);
    }

    #[test]
    fn ignore_flag_swallows_one_notification() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), true).unwrap();
        assert_eq!(f.step(0.95), ScrollOutcome::Ignored);
        assert_eq!(f.scheduler.stats().ignored, 1);
        assert!(matches!(f.step(0.95), ScrollOutcome::LoadStarted { .. }));
    }

    #[test]
    fn replacement_abandons_running_batch() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), false).unwrap();
        f.step(0.9);
        f.runtime.tick();
        assert_eq!(f.scheduler.queue_len(), 43);

        let replacement: Vec<Tile> = (1000..1040).map(Tile).collect();
        f.scheduler.load_source(replacement, true).unwrap();
        f.runtime.run_until_idle(100);

        assert!(!f.scheduler.in_flight());
        assert_eq!(f.scheduler.queue_len(), 10);
        assert_eq!(f.scheduler.sink().len(), 30);
        assert!(f
            .scheduler
            .sink()
            .ids()
            .iter()
            .all(|id| id.0 >= 1000));
        assert_eq!(f.scheduler.stats().batches_abandoned, 1);
        assert_eq!(f.scheduler.dynamic_batch_size(), 20);
    }

    #[test]
    fn failed_step_returns_to_idle_and_keeps_unappended_items() {
        let mut f = fixture(GridConfig::default().with_sub_batch_size(5));
        f.scheduler.load_source(tiles(77), false).unwrap();
        assert_eq!(f.step(0.9), ScrollOutcome::LoadStarted { count: 20 });
        f.runtime.tick();
        assert_eq!(f.scheduler.queue_len(), 42);

        // A reader holding the sink makes the next append fail.
        let runtime = &f.runtime;
        f.scheduler.sink().with_card(0, |_| {
            runtime.tick();
        });

        assert!(!f.scheduler.in_flight());
        assert_eq!(f.scheduler.phase(), LoadPhase::Idle);
        assert_eq!(f.scheduler.queue_len(), 42);
        assert_eq!(f.scheduler.sink().len(), 35);
        assert_eq!(f.runtime.pending_task_count(), 0);
        let stats = f.scheduler.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.batches_completed, 0);
        assert_eq!(stats.items_appended, 5);
        assert!(matches!(
            f.notices.0.borrow().as_slice(),
            [GridNotice::LoadFailed { .. }]
        ));

        // The next trigger picks up right after the last appended item.
        assert_eq!(f.step(1.0), ScrollOutcome::LoadStarted { count: 25 });
        f.runtime.run_until_idle(100);
        assert!(!f.scheduler.in_flight());
        assert_eq!(f.scheduler.queue_len(), 17);
        assert_eq!(
            f.scheduler.sink().ids(),
            (0..60).map(ItemId).collect::<Vec<_>>()
        );
    }

    #[test]
    fn last_batch_reports_everything_loaded() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(40), false).unwrap();
        f.step(0.9);
        f.runtime.run_until_idle(100);
        assert_eq!(
            *f.notices.0.borrow(),
            vec![GridNotice::AllItemsLoaded { total: 40 }]
        );
    }

    #[test]
    fn dispose_cancels_and_releases_flag() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), false).unwrap();
        f.step(0.9);
        f.scheduler.dispose();
        assert!(!f.scheduler.in_flight());
        assert_eq!(f.scheduler.queue_len(), 0);
        assert_eq!(f.runtime.pending_task_count(), 0);
    }

    #[test]
    fn non_finite_positions_read_as_top() {
        let mut f = fixture(GridConfig::default());
        f.scheduler.load_source(tiles(77), false).unwrap();
        assert_eq!(f.step(f32::NAN), ScrollOutcome::NoLoad);
        assert_eq!(f.step(f32::INFINITY), ScrollOutcome::NoLoad);
    }
}
