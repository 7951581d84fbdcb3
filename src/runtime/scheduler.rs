//! Flush schedulers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type Task = Box<dyn FnOnce() + Send>;

/// Decides when a requested flush actually runs
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);
}

/// Runs the flush synchronously, inside the call that requested it
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Queues flushes until [`ManualScheduler::tick`] is called
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<Task>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run every queued task; returns how many ran.
    pub fn tick(&self) -> usize {
        let tasks = std::mem::take(&mut *self.queue.lock());
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().push(task);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs flushes as blocking tasks on a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the ambient runtime, if called from within one
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }
}

/// Scheduler selection as it appears in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Immediate,
    Manual,
    Tokio,
}
