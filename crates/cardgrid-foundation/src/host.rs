//! Collaborator interfaces the grid consumes.
//!
//! Every collaborator is injected through [`GridCollaborators`]; the grid
//! never reaches for ambient global state.

use std::rc::Rc;

use cardgrid_runtime::LocalFuture;

use crate::error::AssetLoadError;
use crate::item::{Asset, AssetKey, Card};
use crate::lazy::{Point, Size, SlotHandle};

/// Supplies the full ordered item collection.
///
/// Invoked once on initial load and once per filter or reload.
pub trait DataSource<I> {
    fn get_all(&self) -> Vec<I>;
}

impl<I, F> DataSource<I> for F
where
    F: Fn() -> Vec<I>,
{
    fn get_all(&self) -> Vec<I> {
        self()
    }
}

/// Asset cache used to prefetch card artwork.
///
/// `load` must be safe to call concurrently for distinct items and must
/// always resolve; failures are reported through the `Err` arm.
pub trait AssetCache<I> {
    fn is_cached(&self, item: &I) -> bool;

    fn get_cached(&self, item: &I) -> Option<Asset>;

    fn load(&self, key: AssetKey, item: &I) -> LocalFuture<Result<Asset, AssetLoadError>>;
}

/// Host-side renderable slots addressed by [`SlotHandle`].
///
/// All calls are pure mutations on the host side.
pub trait RenderSurface<I> {
    /// Instantiate the renderable backing `slot`.
    fn create(&self, slot: SlotHandle);

    /// Tear down the renderable backing `slot`.
    fn destroy(&self, slot: SlotHandle);

    fn bind(&self, slot: SlotHandle, card: &Card<I>);

    fn set_active(&self, slot: SlotHandle, active: bool);

    fn set_position(&self, slot: SlotHandle, position: Point);

    fn set_size(&self, slot: SlotHandle, size: Size);
}

/// The scroll container hosting the grid.
pub trait ScrollHost {
    /// Current raw content offset, growing downward from zero.
    fn content_offset(&self) -> f32;

    fn viewport_height(&self) -> f32;

    fn set_content_height(&self, height: f32);

    /// Programmatically scroll back to the top.
    ///
    /// Hosts usually emit a scroll notification in response, which the grid
    /// ignores once after a source replacement.
    fn reset_scroll(&self);
}

/// Receiver of scroll notifications.
pub trait ScrollObserver {
    /// `normalized_position` runs from 0.0 at the top to 1.0 at the bottom.
    fn on_scroll(&mut self, normalized_position: f32);
}

/// User-facing events the host may surface (toasts, status lines).
#[derive(Debug, Clone, PartialEq)]
pub enum GridNotice {
    SourceReplaced { total: usize },
    AllItemsLoaded { total: usize },
    AssetsDegraded { failed: usize },
    LoadFailed { reason: String },
}

pub trait NotificationSink {
    fn notify(&self, notice: GridNotice);
}

/// Collaborators injected into [`VirtualGrid`](crate::VirtualGrid).
///
/// Missing required collaborators put the grid into an inert state at
/// `init()` instead of failing the host.
pub struct GridCollaborators<I> {
    pub data_source: Option<Rc<dyn DataSource<I>>>,
    pub asset_cache: Option<Rc<dyn AssetCache<I>>>,
    pub surface: Option<Rc<dyn RenderSurface<I>>>,
    pub scroll_host: Option<Rc<dyn ScrollHost>>,
    pub notifications: Option<Rc<dyn NotificationSink>>,
}

impl<I> Default for GridCollaborators<I> {
    fn default() -> Self {
        Self {
            data_source: None,
            asset_cache: None,
            surface: None,
            scroll_host: None,
            notifications: None,
        }
    }
}

impl<I> GridCollaborators<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_source(mut self, source: Rc<dyn DataSource<I>>) -> Self {
        self.data_source = Some(source);
        self
    }

    pub fn with_asset_cache(mut self, cache: Rc<dyn AssetCache<I>>) -> Self {
        self.asset_cache = Some(cache);
        self
    }

    pub fn with_surface(mut self, surface: Rc<dyn RenderSurface<I>>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_scroll_host(mut self, host: Rc<dyn ScrollHost>) -> Self {
        self.scroll_host = Some(host);
        self
    }

    pub fn with_notifications(mut self, sink: Rc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }
}
