//! Single-threaded reference engine.
//!
//! Runs every task inline on the calling thread, in index order. It shares
//! the dependency bookkeeping with [`Runtime`](crate::Runtime), so it is a
//! drop-in oracle for the pooled engine and a baseline for benchmarks.

use crate::error::{Error, Result};
use crate::executor::{BulkId, PanicHandler, Runnable};
use crate::runtime::TaskSystem;
use crate::scheduler::{BulkScheduler, BulkState, StateTable};
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static SERIAL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // serial engine currently executing tasks on this thread
    static EXECUTING: Cell<Option<u64>> = const { Cell::new(None) };
}

#[derive(Debug)]
pub struct SerialRuntime {
    id: u64,
    scheduler: Mutex<BulkScheduler>,
    table: Arc<StateTable>,
    poisoned: AtomicBool,
    panic_handler: PanicHandler,
}

impl SerialRuntime {
    pub fn new() -> Self {
        let scheduler = BulkScheduler::new();
        Self {
            id: SERIAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            table: scheduler.table(),
            scheduler: Mutex::new(scheduler),
            poisoned: AtomicBool::new(false),
            panic_handler: PanicHandler::default(),
        }
    }

    /// Lifecycle state of `id`. Safe to call from inside a running task.
    pub fn bulk_state(&self, id: BulkId) -> Option<BulkState> {
        self.table.get(id)
    }

    pub fn pending_bulks(&self) -> usize {
        self.table.pending()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn ensure_not_executing(&self) -> Result<()> {
        if EXECUTING.with(|current| current.get()) == Some(self.id) {
            return Err(Error::Reentrant);
        }
        Ok(())
    }

    // Every index runs even after a panic, matching the pooled engine; the
    // first panic is reported.
    fn execute_bulk(&self, id: BulkId, runnable: &Arc<dyn Runnable>, total: usize) -> Result<()> {
        let previous = EXECUTING.with(|current| current.replace(Some(self.id)));
        let mut first_panic = None;

        for index in 0..total {
            if let Err(info) = self
                .panic_handler
                .execute(|| runnable.run_task(index, total))
            {
                tracing::error!(bulk = %id, index, message = %info.message, "task panicked");
                first_panic.get_or_insert(Error::TaskPanicked {
                    bulk: id,
                    index,
                    message: info.message,
                });
            }
        }

        EXECUTING.with(|current| current.set(previous));
        first_panic.map_or(Ok(()), Err)
    }
}

impl Default for SerialRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSystem for SerialRuntime {
    fn name(&self) -> &'static str {
        "Serial"
    }

    fn run(&self, runnable: Arc<dyn Runnable>, total: usize) -> Result<()> {
        self.ensure_not_executing()?;

        let mut scheduler = self.scheduler.lock();
        if self.is_poisoned() {
            return Err(Error::Poisoned);
        }

        let id = scheduler.begin_immediate();
        let result = self.execute_bulk(id, &runnable, total);
        scheduler.finish_immediate(id, result.is_ok());
        if result.is_err() {
            self.poisoned.store(true, Ordering::Release);
        }
        result
    }

    fn run_async_with_deps(
        &self,
        runnable: Arc<dyn Runnable>,
        total: usize,
        deps: &[BulkId],
    ) -> Result<BulkId> {
        self.ensure_not_executing()?;
        Ok(self.scheduler.lock().submit(runnable, total, deps))
    }

    fn sync(&self) -> Result<()> {
        self.ensure_not_executing()?;

        let mut scheduler = self.scheduler.lock();
        if self.is_poisoned() {
            return Err(Error::Poisoned);
        }

        let result = scheduler.sync_with(|id, bulk| self.execute_bulk(id, &bulk.runnable, bulk.total));
        if matches!(result, Err(Error::TaskPanicked { .. })) {
            self.poisoned.store(true, Ordering::Release);
        }
        result.map(|_| ())
    }
}
