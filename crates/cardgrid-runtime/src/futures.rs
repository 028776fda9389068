//! Small future combinators for cooperative scheduling.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub use futures_util::future::{join_all, JoinAll};

/// Future that is pending for exactly one poll.
///
/// Awaiting it hands control back to the runtime; the task resumes on the
/// next [`Runtime::tick`](crate::Runtime::tick).
#[derive(Debug, Default)]
pub struct YieldNow {
    yielded: bool,
}

pub fn yield_now() -> YieldNow {
    YieldNow::default()
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
