use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::platform::RuntimeScheduler;

/// Boxed, non-`Send` future as stored by the runtime.
pub type LocalFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

struct TaskEntry {
    id: u64,
    future: LocalFuture<()>,
}

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    tasks: RefCell<Vec<TaskEntry>>,
    live: RefCell<HashSet<u64>>,
    next_task_id: Cell<u64>,
    task_waker: Waker,
    ticks: Cell<u64>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        let task_waker = RuntimeTaskWaker {
            scheduler: Arc::clone(&scheduler),
        }
        .into_waker();
        Self {
            scheduler,
            tasks: RefCell::new(Vec::new()),
            live: RefCell::new(HashSet::new()),
            next_task_id: Cell::new(1),
            task_waker,
            ticks: Cell::new(0),
        }
    }

    fn spawn_task(&self, future: LocalFuture<()>) -> u64 {
        let id = self.next_task_id.get();
        self.next_task_id.set(id + 1);
        self.live.borrow_mut().insert(id);
        self.tasks.borrow_mut().push(TaskEntry { id, future });
        self.scheduler.schedule_tick();
        id
    }

    fn cancel_task(&self, id: u64) {
        if !self.live.borrow_mut().remove(&id) {
            return;
        }
        // Entries taken out by an ongoing tick are filtered when they are put back.
        let removed: Vec<TaskEntry> = {
            let mut tasks = self.tasks.borrow_mut();
            let (cancelled, kept) = std::mem::take(&mut *tasks)
                .into_iter()
                .partition(|entry| entry.id == id);
            *tasks = kept;
            cancelled
        };
        // Futures are dropped outside the borrow; their destructors may spawn.
        drop(removed);
    }

    fn is_live(&self, id: u64) -> bool {
        self.live.borrow().contains(&id)
    }

    fn poll_tasks(&self) -> bool {
        self.ticks.set(self.ticks.get() + 1);
        let mut cx = Context::from_waker(&self.task_waker);
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        let mut pending = Vec::with_capacity(tasks.len());
        let mut made_progress = false;
        for mut entry in tasks.into_iter() {
            if !self.is_live(entry.id) {
                continue;
            }
            match entry.future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {
                    self.live.borrow_mut().remove(&entry.id);
                    made_progress = true;
                }
                Poll::Pending => {
                    pending.push(entry);
                }
            }
        }
        pending.retain(|entry| self.is_live(entry.id));
        let mut tasks = self.tasks.borrow_mut();
        let spawned = std::mem::take(&mut *tasks);
        *tasks = pending;
        tasks.extend(spawned);
        made_progress
    }

    fn has_tasks(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }
}

/// Owner of the cooperative task queue.
///
/// All tasks run on the thread that drives [`Runtime::tick`], so they may
/// capture `Rc`/`RefCell` state freely.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn spawn<F>(&self, fut: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let id = self.inner.spawn_task(Box::pin(fut));
        TaskHandle {
            id,
            runtime: self.handle(),
        }
    }

    /// Polls every pending task exactly once.
    ///
    /// Returns `true` if at least one task ran to completion.
    pub fn tick(&self) -> bool {
        self.inner.poll_tasks()
    }

    /// Ticks until no task is left or `max_ticks` is reached.
    ///
    /// Returns the number of ticks that were run.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut ran = 0;
        while ran < max_ticks && self.inner.has_tasks() {
            self.inner.poll_tasks();
            ran += 1;
        }
        ran
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.inner.has_tasks()
    }

    pub fn pending_task_count(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Total number of ticks run since creation.
    pub fn tick_count(&self) -> u64 {
        self.inner.ticks.get()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("pending_tasks", &self.pending_task_count())
            .field("ticks", &self.tick_count())
            .finish()
    }
}

/// Weak reference to a [`Runtime`].
///
/// Spawning through a handle whose runtime was dropped is a no-op.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Weak<RuntimeInner>,
}

impl RuntimeHandle {
    pub fn spawn<F>(&self, fut: F) -> Option<TaskHandle>
    where
        F: Future<Output = ()> + 'static,
    {
        self.inner.upgrade().map(|inner| {
            let id = inner.spawn_task(Box::pin(fut));
            TaskHandle {
                id,
                runtime: self.clone(),
            }
        })
    }

    pub fn cancel_task(&self, id: u64) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_task(id);
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    fn is_task_live(&self, id: u64) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.is_live(id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Handle to a spawned task.
///
/// Dropping the handle does not cancel the task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: u64,
    runtime: RuntimeHandle,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` while the task has neither completed nor been cancelled.
    pub fn is_active(&self) -> bool {
        self.runtime.is_task_live(self.id)
    }

    pub fn cancel(self) {
        self.runtime.cancel_task(self.id);
    }
}

struct RuntimeTaskWaker {
    scheduler: Arc<dyn RuntimeScheduler>,
}

impl RuntimeTaskWaker {
    fn into_waker(self) -> Waker {
        futures_task::waker(Arc::new(self))
    }
}

impl futures_task::ArcWake for RuntimeTaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.scheduler.schedule_tick();
    }
}
