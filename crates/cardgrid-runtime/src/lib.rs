//! Cooperative, single-threaded task runtime used by Cardgrid.
//!
//! The runtime owns a set of `'static` local futures and polls each of them
//! once per [`Runtime::tick`]. Work that wants to give the render loop a chance
//! to run awaits [`yield_now`], which completes on the following tick.

mod futures;
mod platform;
mod runtime;
mod std_runtime;

pub use futures::{join_all, yield_now, JoinAll, YieldNow};
pub use platform::{Clock, RuntimeScheduler};
pub use runtime::{LocalFuture, Runtime, RuntimeHandle, TaskHandle};
pub use std_runtime::{ManualClock, StdClock, StdScheduler};
