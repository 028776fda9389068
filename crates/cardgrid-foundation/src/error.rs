//! Error taxonomy for the grid.
//!
//! Nothing below [`VirtualGrid`](crate::VirtualGrid)'s public operations
//! propagates these outward; they are logged at that boundary.

use std::fmt;

use crate::item::{AssetKey, ItemId};
use crate::lazy::SlotHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// A required collaborator or parameter was absent at initialization.
    ConfigurationMissing { what: &'static str },
    /// A configuration value is outside its accepted range.
    InvalidConfig { field: &'static str, reason: String },
    /// The data source produced nothing usable.
    InvalidData { reason: String },
    /// A pooled slot's render resource was invalidated out-of-band.
    ResourceDestroyed { slot: SlotHandle },
    /// A single item's asset could not be loaded.
    AssetLoadFailure { item: ItemId, reason: String },
    /// Unexpected state inside a recompute or load step.
    TransientState {
        context: &'static str,
        reason: String,
    },
}

impl GridError {
    pub(crate) fn transient(context: &'static str, reason: impl Into<String>) -> Self {
        GridError::TransientState {
            context,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        GridError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::ConfigurationMissing { what } => {
                write!(f, "missing configuration: {what}")
            }
            GridError::InvalidConfig { field, reason } => {
                write!(f, "invalid configuration for {field}: {reason}")
            }
            GridError::InvalidData { reason } => write!(f, "invalid data: {reason}"),
            GridError::ResourceDestroyed { slot } => {
                write!(f, "render resource for {slot} was destroyed")
            }
            GridError::AssetLoadFailure { item, reason } => {
                write!(f, "asset load failed for {item}: {reason}")
            }
            GridError::TransientState { context, reason } => {
                write!(f, "transient failure in {context}: {reason}")
            }
        }
    }
}

impl std::error::Error for GridError {}

/// Failure half of an asset cache load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLoadError {
    pub key: AssetKey,
    pub reason: String,
}

impl AssetLoadError {
    pub fn new(key: AssetKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AssetLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load asset {}: {}", self.key, self.reason)
    }
}

impl std::error::Error for AssetLoadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_part() {
        let err = GridError::ConfigurationMissing {
            what: "render surface",
        };
        assert_eq!(err.to_string(), "missing configuration: render surface");

        let err = GridError::transient("window recompute", "sink busy");
        assert_eq!(
            err.to_string(),
            "transient failure in window recompute: sink busy"
        );

        let err = AssetLoadError::new(AssetKey::new("art/42"), "404");
        assert_eq!(err.to_string(), "failed to load asset art/42: 404");
    }
}
