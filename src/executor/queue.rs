//! Shared work queue between the coordinating thread and the workers.
//!
//! All queue state (pending items, in-flight and completion counters, the
//! halt flag and the first task panic of a wave) lives behind one mutex.
//! Two condition variables hang off it: `available` wakes idle workers after
//! a push or a halt, `drained` wakes the coordinator once the queue is empty
//! and nothing is in flight.

use super::task::{BulkId, Runnable, TaskItem};
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A task that unwound instead of returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TaskPanic {
    pub bulk: BulkId,
    pub index: usize,
    pub message: String,
}

/// What the drain barrier observed for one wave.
#[derive(Debug, Default)]
pub(crate) struct WaveOutcome {
    pub completed: usize,
    pub panic: Option<TaskPanic>,
}

struct QueueState {
    items: VecDeque<TaskItem>,
    in_flight: usize,
    completed: usize,
    halted: bool,
    panic: Option<TaskPanic>,
}

pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    drained: Condvar,
    // Lock-free mirrors so spinning workers can skip the mutex while idle.
    queued: CachePadded<AtomicUsize>,
    halted: CachePadded<AtomicBool>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                in_flight: 0,
                completed: 0,
                halted: false,
                panic: None,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
            queued: CachePadded::new(AtomicUsize::new(0)),
            halted: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue every task of a bulk under a single lock acquisition and wake
    /// all blocked workers.
    pub fn push_bulk(&self, bulk: BulkId, runnable: &Arc<dyn Runnable>, total: usize) {
        if total == 0 {
            return;
        }

        {
            let mut state = self.state.lock();
            state.items.reserve(total);
            state.items.extend((0..total).map(|index| TaskItem {
                bulk,
                runnable: Arc::clone(runnable),
                index,
                total,
            }));
            self.queued.store(state.items.len(), Ordering::Release);
        }

        // wake-all: a burst of work should reach every idle worker
        self.available.notify_all();
    }

    pub fn try_pop(&self) -> Option<TaskItem> {
        if self.queued.load(Ordering::Acquire) == 0 {
            return None;
        }

        let mut state = self.state.lock();
        let item = state.items.pop_front()?;
        state.in_flight += 1;
        self.queued.store(state.items.len(), Ordering::Release);
        Some(item)
    }

    /// Wait until an item is available or the queue is halted.
    ///
    /// Returns `None` only after [`halt`](Self::halt); items still queued at
    /// that point are abandoned.
    pub fn pop_blocking(&self) -> Option<TaskItem> {
        let mut state = self.state.lock();
        loop {
            if state.halted {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                state.in_flight += 1;
                self.queued.store(state.items.len(), Ordering::Release);
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Record one finished item. Only the first panic of a wave is kept.
    pub fn complete(&self, panic: Option<TaskPanic>) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0, "completion without a popped item");
        state.in_flight -= 1;
        state.completed += 1;

        if let Some(panic) = panic {
            state.panic.get_or_insert(panic);
        }

        if state.in_flight == 0 && state.items.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Block until `total` items of the current wave have completed, then
    /// reset the wave counters.
    pub fn drain_wait(&self, total: usize) -> WaveOutcome {
        let mut state = self.state.lock();
        while state.completed < total {
            self.drained.wait(&mut state);
        }
        debug_assert_eq!(state.completed, total);

        let outcome = WaveOutcome {
            completed: state.completed,
            panic: state.panic.take(),
        };
        state.completed = 0;
        outcome
    }

    pub fn halt(&self) {
        {
            let mut state = self.state.lock();
            state.halted = true;
            self.halted.store(true, Ordering::Release);
        }
        self.available.notify_all();
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
