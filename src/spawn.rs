//! Engine that spawns a fresh set of threads for every bulk.
//!
//! No thread outlives a launch: each bulk gets `min(num_threads, total)`
//! scoped threads that claim indices from a shared counter and are joined
//! before the launch returns. There is no pool to shut down, which makes
//! this the baseline that shows what the persistent pool saves.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{BulkId, PanicHandler, Runnable};
use crate::runtime::TaskSystem;
use crate::scheduler::{BulkScheduler, BulkState, StateTable};
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

static SPAWN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // engine whose bulk the current thread was spawned for
    static SPAWNED_BY: Cell<Option<u64>> = const { Cell::new(None) };
}

#[derive(Debug)]
pub struct SpawnRuntime {
    id: u64,
    config: Config,
    scheduler: Mutex<BulkScheduler>,
    table: Arc<StateTable>,
    poisoned: AtomicBool,
    panic_handler: PanicHandler,
}

impl SpawnRuntime {
    /// Engine spawning up to `num_threads` threads per bulk.
    pub fn new(num_threads: usize) -> Result<Self> {
        Self::with_config(Config::builder().num_threads(num_threads).build()?)
    }

    /// Uses the thread count, name prefix, stack size and panic strategy
    /// of `config`. The wait discipline and pinning do not apply.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let scheduler = BulkScheduler::new();

        Ok(Self {
            id: SPAWN_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            panic_handler: PanicHandler::new(config.panic_strategy),
            config,
            table: scheduler.table(),
            scheduler: Mutex::new(scheduler),
            poisoned: AtomicBool::new(false),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.config.worker_threads()
    }

    pub fn bulk_state(&self, id: BulkId) -> Option<BulkState> {
        self.table.get(id)
    }

    pub fn pending_bulks(&self) -> usize {
        self.table.pending()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn ensure_not_spawned(&self) -> Result<()> {
        if SPAWNED_BY.with(|engine| engine.get()) == Some(self.id) {
            return Err(Error::Reentrant);
        }
        Ok(())
    }

    fn execute_bulk(&self, id: BulkId, runnable: &Arc<dyn Runnable>, total: usize) -> Result<()> {
        if total == 0 {
            return Ok(());
        }

        let threads = self.num_threads().min(total);
        let next = AtomicUsize::new(0);
        let first_panic: Mutex<Option<(usize, String)>> = Mutex::new(None);

        let spawned = thread::scope(|s| {
            let mut spawned = 0usize;
            for n in 0..threads {
                let mut builder =
                    thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, n));
                if let Some(stack_size) = self.config.stack_size {
                    builder = builder.stack_size(stack_size);
                }

                let next = &next;
                let first_panic = &first_panic;
                let handle = builder.spawn_scoped(s, move || {
                    SPAWNED_BY.with(|engine| engine.set(Some(self.id)));
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        if index >= total {
                            break;
                        }
                        if let Err(info) = self
                            .panic_handler
                            .execute(|| runnable.run_task(index, total))
                        {
                            tracing::error!(bulk = %id, index, message = %info.message, "task panicked");
                            first_panic.lock().get_or_insert((index, info.message));
                        }
                    }
                });

                match handle {
                    Ok(_) => spawned += 1,
                    Err(err) if spawned == 0 => return Err(Error::Spawn(err)),
                    // the threads already running claim every index
                    Err(err) => {
                        tracing::warn!(bulk = %id, spawned, error = %err, "spawned fewer threads than requested");
                        break;
                    }
                }
            }
            Ok(spawned)
        })?;

        tracing::debug!(bulk = %id, total, threads = spawned, "bulk joined");

        match first_panic.into_inner() {
            Some((index, message)) => Err(Error::TaskPanicked {
                bulk: id,
                index,
                message,
            }),
            None => Ok(()),
        }
    }
}

impl TaskSystem for SpawnRuntime {
    fn name(&self) -> &'static str {
        "Parallel + Always Spawn"
    }

    fn run(&self, runnable: Arc<dyn Runnable>, total: usize) -> Result<()> {
        self.ensure_not_spawned()?;

        let mut scheduler = self.scheduler.lock();
        if self.is_poisoned() {
            return Err(Error::Poisoned);
        }

        let id = scheduler.begin_immediate();
        let result = self.execute_bulk(id, &runnable, total);
        scheduler.finish_immediate(id, result.is_ok());
        if matches!(result, Err(Error::TaskPanicked { .. })) {
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
        self.ensure_not_spawned()?;
        Ok(self.scheduler.lock().submit(runnable, total, deps))
    }

    fn sync(&self) -> Result<()> {
        self.ensure_not_spawned()?;

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
