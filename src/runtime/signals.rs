//! Dirty-set accumulation and coalesced flushing.
//!
//! Any number of `mark_dirty` calls between two flushes collapse into one
//! flush. Inside `batch`, no flush is requested until the outermost batch
//! returns. Marks raised while a flush is running are drained by that same
//! flush in a follow-up round.

use super::scheduler::Scheduler;
use crate::types::NodeId;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Upper bound on follow-up rounds within one flush
const MAX_FLUSH_ROUNDS: usize = 16;

/// What a flush has to recompute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dirty {
    Full,
    Ids(BTreeSet<NodeId>),
}

pub type FlushTarget = Arc<dyn Fn(Dirty) + Send + Sync>;

#[derive(Debug, Default)]
struct Pending {
    ids: BTreeSet<NodeId>,
    full: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        !self.full && self.ids.is_empty()
    }

    fn take(&mut self) -> Option<Dirty> {
        if self.is_empty() {
            return None;
        }
        let ids = std::mem::take(&mut self.ids);
        if std::mem::take(&mut self.full) {
            Some(Dirty::Full)
        } else {
            Some(Dirty::Ids(ids))
        }
    }
}

pub struct SignalCenter {
    me: Weak<SignalCenter>,
    pending: Mutex<Pending>,
    scheduled: AtomicBool,
    flushing: AtomicBool,
    batch_depth: AtomicUsize,
    flushes: AtomicU64,
    scheduler: Arc<dyn Scheduler>,
    target: RwLock<Option<FlushTarget>>,
}

impl SignalCenter {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new_cyclic(|me| SignalCenter {
            me: me.clone(),
            pending: Mutex::new(Pending::default()),
            scheduled: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
            batch_depth: AtomicUsize::new(0),
            flushes: AtomicU64::new(0),
            scheduler,
            target: RwLock::new(None),
        })
    }

    /// Set the function every flush hands its dirty set to
    pub fn set_target(&self, target: FlushTarget) {
        *self.target.write() = Some(target);
    }

    pub fn mark_dirty<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        {
            let mut pending = self.pending.lock();
            pending.ids.extend(ids.into_iter().map(Into::into));
        }
        self.request_flush();
    }

    /// Request a full recompile on the next flush
    pub fn mark_full(&self) {
        self.pending.lock().full = true;
        self.request_flush();
    }

    /// Run `f` with flushing deferred until the outermost batch ends.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.batch_depth.fetch_add(1, Ordering::SeqCst);
        let result = f();
        if self.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.request_flush();
        }
        result
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.load(Ordering::SeqCst) > 0
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Ids waiting for the next flush
    pub fn pending_ids(&self) -> BTreeSet<NodeId> {
        self.pending.lock().ids.clone()
    }

    /// Number of flushes that reached the target
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    fn request_flush(&self) {
        if self.is_batching() || self.flushing.load(Ordering::SeqCst) || !self.has_pending() {
            return;
        }
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!("Scheduling flush");
        let me = self.me.clone();
        self.scheduler.schedule(Box::new(move || {
            if let Some(center) = me.upgrade() {
                center.flush_now();
            }
        }));
    }

    /// Drain pending marks into the target right away.
    pub fn flush_now(&self) {
        self.scheduled.store(false, Ordering::SeqCst);
        if self.flushing.swap(true, Ordering::SeqCst) {
            return;
        }

        let target = self.target.read().clone();
        let mut rounds = 0;
        loop {
            if rounds == MAX_FLUSH_ROUNDS {
                warn!(rounds, "Flush did not settle; leaving remaining marks pending");
                break;
            }
            let Some(dirty) = self.pending.lock().take() else {
                break;
            };
            rounds += 1;
            self.flushes.fetch_add(1, Ordering::SeqCst);
            if let Some(target) = &target {
                target(dirty);
            }
        }

        self.flushing.store(false, Ordering::SeqCst);
        if rounds < MAX_FLUSH_ROUNDS {
            // Marks that raced with the end of the loop.
            self.request_flush();
        }
    }
}

impl fmt::Debug for SignalCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalCenter")
            .field("pending", &*self.pending.lock())
            .field("batch_depth", &self.batch_depth.load(Ordering::SeqCst))
            .field("flushes", &self.flush_count())
            .finish()
    }
}
