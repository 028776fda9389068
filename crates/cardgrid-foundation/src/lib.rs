//! Virtualized card grid: recycled view slots, windowing, and adaptive lazy
//! loading driven by scroll velocity.

pub mod config;
pub mod error;
pub mod grid;
pub mod host;
pub mod item;
pub mod lazy;

pub use config::{BatchPolicy, GridConfig, MAX_BATCH, MAX_POOL_SIZE, MIN_BATCH};
pub use error::{AssetLoadError, GridError};
pub use grid::{GridStats, VirtualGrid};
pub use host::{
    AssetCache, DataSource, GridCollaborators, GridNotice, NotificationSink, RenderSurface,
    ScrollHost, ScrollObserver,
};
pub use item::{Asset, AssetKey, Card, GridItem, ItemId};

pub mod prelude {
    pub use crate::config::{BatchPolicy, GridConfig};
    pub use crate::grid::{GridStats, VirtualGrid};
    pub use crate::host::*;
    pub use crate::item::*;
    pub use crate::lazy::{
        DataSink, GridParams, LoadPhase, Point, ScrollOutcome, Size, SlotHandle,
    };
}
