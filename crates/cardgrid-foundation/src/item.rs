//! Item, asset and card types shared across the grid.

use std::fmt;
use std::rc::Rc;

/// Stable identity of an item supplied by the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Key under which the asset cache stores an item's artwork.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey(Rc<str>);

impl AssetKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Rc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a decoded asset owned by the asset cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Loaded { key: AssetKey, handle: u64 },
    Placeholder,
}

impl Asset {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Asset::Placeholder)
    }
}

/// An item the grid can window and lazily load.
///
/// The grid only reads the identity and asset key; payload is up to the host.
pub trait GridItem: Clone + 'static {
    fn id(&self) -> ItemId;

    /// Key of the loadable asset, if the item has one.
    fn asset_key(&self) -> Option<AssetKey> {
        None
    }
}

/// An item materialized into the data sink, with its resolved asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Card<I> {
    pub item: I,
    pub asset: Option<Asset>,
}

impl<I: GridItem> Card<I> {
    pub fn new(item: I, asset: Option<Asset>) -> Self {
        Self { item, asset }
    }

    pub fn id(&self) -> ItemId {
        self.item.id()
    }
}
