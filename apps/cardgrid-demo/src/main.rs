use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use cardgrid_foundation::prelude::*;
use cardgrid_foundation::AssetLoadError;
use cardgrid_runtime::{yield_now, LocalFuture, Runtime, StdClock, StdScheduler};

const DECK_SIZE: u64 = 240;
const FRAMES: usize = 400;

#[derive(Clone, Debug)]
struct Creature {
    id: u64,
    rare: bool,
}

impl GridItem for Creature {
    fn id(&self) -> ItemId {
        ItemId(self.id)
    }

    fn asset_key(&self) -> Option<AssetKey> {
        Some(AssetKey::new(format!("creatures/{:04}.png", self.id)))
    }
}

fn deck() -> Vec<Creature> {
    (0..DECK_SIZE)
        .map(|id| Creature {
            id,
            rare: id % 7 == 0,
        })
        .collect()
}

/// Art cache that takes a couple of frames per image and cannot decode
/// every thirteenth one.
#[derive(Default)]
struct ArtCache {
    decoded: Rc<RefCell<HashMap<AssetKey, Asset>>>,
}

impl AssetCache<Creature> for ArtCache {
    fn is_cached(&self, item: &Creature) -> bool {
        item.asset_key()
            .is_some_and(|key| self.decoded.borrow().contains_key(&key))
    }

    fn get_cached(&self, item: &Creature) -> Option<Asset> {
        let key = item.asset_key()?;
        self.decoded.borrow().get(&key).cloned()
    }

    fn load(&self, key: AssetKey, item: &Creature) -> LocalFuture<Result<Asset, AssetLoadError>> {
        let decoded = Rc::clone(&self.decoded);
        let id = item.id;
        Box::pin(async move {
            yield_now().await;
            yield_now().await;
            if id % 13 == 12 {
                return Err(AssetLoadError::new(key, "truncated image"));
            }
            let asset = Asset::Loaded {
                key: key.clone(),
                handle: id,
            };
            decoded.borrow_mut().insert(key, asset.clone());
            Ok(asset)
        })
    }
}

/// Counts surface calls instead of drawing.
#[derive(Default)]
struct ConsoleSurface {
    live: Cell<usize>,
    binds: Cell<usize>,
}

impl RenderSurface<Creature> for ConsoleSurface {
    fn create(&self, _slot: SlotHandle) {
        self.live.set(self.live.get() + 1);
    }

    fn destroy(&self, _slot: SlotHandle) {
        self.live.set(self.live.get().saturating_sub(1));
    }

    fn bind(&self, _slot: SlotHandle, card: &Card<Creature>) {
        self.binds.set(self.binds.get() + 1);
        log::trace!("bound {}", card.id());
    }

    fn set_active(&self, _slot: SlotHandle, _active: bool) {}

    fn set_position(&self, _slot: SlotHandle, _position: Point) {}

    fn set_size(&self, _slot: SlotHandle, _size: Size) {}
}

struct DemoScrollHost {
    offset: Cell<f32>,
    content_height: Cell<f32>,
}

impl DemoScrollHost {
    const VIEWPORT: f32 = 720.0;

    fn normalized(&self) -> f32 {
        let max = (self.content_height.get() - Self::VIEWPORT).max(1.0);
        (self.offset.get() / max).clamp(0.0, 1.0)
    }

    fn scroll_by(&self, delta: f32) {
        let max = (self.content_height.get() - Self::VIEWPORT).max(0.0);
        self.offset.set((self.offset.get() + delta).clamp(0.0, max));
    }
}

impl ScrollHost for DemoScrollHost {
    fn content_offset(&self) -> f32 {
        self.offset.get()
    }

    fn viewport_height(&self) -> f32 {
        Self::VIEWPORT
    }

    fn set_content_height(&self, height: f32) {
        self.content_height.set(height);
    }

    fn reset_scroll(&self) {
        self.offset.set(0.0);
    }
}

struct Toasts;

impl NotificationSink for Toasts {
    fn notify(&self, notice: GridNotice) {
        println!("  [toast] {notice:?}");
    }
}

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "logging")]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    println!("=== Cardgrid headless demo ===");
    println!("Scrolling {DECK_SIZE} cards, switching to rares halfway through.");
    println!();

    let scheduler = Arc::new(StdScheduler::new());
    let runtime = Runtime::new(scheduler.clone());
    let surface = Rc::new(ConsoleSurface::default());
    let host = Rc::new(DemoScrollHost {
        offset: Cell::new(0.0),
        content_height: Cell::new(0.0),
    });
    let collaborators = GridCollaborators::<Creature>::new()
        .with_data_source(Rc::new(deck))
        .with_asset_cache(Rc::new(ArtCache::default()))
        .with_surface(surface.clone())
        .with_scroll_host(host.clone())
        .with_notifications(Rc::new(Toasts));

    // A tiny cooldown keeps the simulation short; frames are not paced.
    let config = GridConfig::default()
        .with_columns(3)
        .with_scroll_cooldown(std::time::Duration::from_micros(1));
    let mut grid = VirtualGrid::new(config, collaborators, runtime.handle(), Rc::new(StdClock::new()));
    grid.init().context("grid failed to start")?;

    let mut ticks = 0usize;
    for frame in 0..FRAMES {
        if frame == FRAMES / 2 {
            println!("frame {frame}: filter -> rares only");
            let rares = || deck().into_iter().filter(|c| c.rare).collect::<Vec<_>>();
            grid.replace_source(Rc::new(rares));
            // The host's reset produces a notification of its own.
            grid.scroll(host.normalized());
        }

        host.scroll_by(if frame % 50 < 40 { 90.0 } else { -40.0 });
        grid.scroll(host.normalized());
        // Only loads in progress ask for ticks.
        if scheduler.take_tick_request() {
            runtime.tick();
            ticks += 1;
        }
        grid.frame();

        if frame % 40 == 0 {
            let stats = grid.stats();
            println!(
                "frame {frame:>3}: offset {:>7.1} active {:>2} sink {:>3} queue {:>3} pool {:>2} batch {:?}",
                host.offset.get(),
                stats.active,
                stats.sink_len,
                stats.queue_len,
                stats.pool.live,
                grid.dynamic_batch_size(),
            );
        }
    }

    runtime.run_until_idle(1_000);
    grid.frame();
    let stats = grid.stats();
    println!();
    println!("loader: {:?}", stats.loader);
    println!("pool:   {:?}", stats.pool);
    println!("binds:  {}", surface.binds.get());
    println!("ticks:  {ticks} of {FRAMES} frames");

    grid.dispose();
    println!("disposed, {} slots left on the surface", surface.live.get());
    Ok(())
}
