//! Windowing and lazy loading.
//!
//! The pieces build on each other bottom-up: [`GridParams`] places cells, [`visible_range`]
//! picks the indices a viewport needs, the [`WindowingEngine`] keeps pooled
//! [`ViewPool`] slots bound to exactly those indices, and the
//! [`LazyLoadScheduler`] feeds the [`DataSink`] through a
//! [`SubBatchDispatcher`] as the user nears the end of what is loaded.

mod dispatcher;
mod layout;
mod pool;
mod scheduler;
mod sink;
mod viewport;
mod window;

pub use dispatcher::{BatchCommit, DispatchReport, SubBatchDispatcher};
pub use layout::{GridParams, Point, Size};
pub use pool::{PoolStats, SlotHandle, ViewPool, ViewSlot};
pub use scheduler::{LazyLoadScheduler, LoadPhase, LoaderStats, ScrollOutcome};
pub use sink::{DataSink, SinkChange, SinkSubscription};
pub use viewport::{visible_range, ViewportHandler, ViewportState, VisibleRange};
pub use window::{WindowReport, WindowingEngine};
