use crate::config::{Config, WaitDiscipline};
use crate::error::{Error, Result};
use crate::executor::{BulkId, Runnable, TaskPanic, WorkQueue, WorkerPool};
use crate::scheduler::{BulkScheduler, BulkState, StateTable};
use crate::telemetry::{Metrics, MetricsSnapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Bulk launch interface shared by every engine in this crate.
pub trait TaskSystem {
    /// Human readable engine name.
    fn name(&self) -> &'static str;

    /// Run `runnable` for every index in `0..total` and return once all of
    /// them finished. Bulks pending for [`sync`](TaskSystem::sync) are not
    /// touched.
    fn run(&self, runnable: Arc<dyn Runnable>, total: usize) -> Result<()>;

    /// Register a bulk that may start once every bulk in `deps` completed.
    /// Nothing runs until the next [`sync`](TaskSystem::sync).
    fn run_async_with_deps(
        &self,
        runnable: Arc<dyn Runnable>,
        total: usize,
        deps: &[BulkId],
    ) -> Result<BulkId>;

    /// Run every registered bulk in dependency order and wait for all of
    /// them.
    fn sync(&self) -> Result<()>;
}

/// Thread pool engine.
///
/// Owns a fixed set of workers fed from one shared queue. Bulks run one at a
/// time: the coordinating thread pushes all tasks of a bulk, then blocks
/// until the bulk drains before it looks at the next one.
pub struct Runtime {
    config: Config,
    queue: Arc<WorkQueue>,
    metrics: Arc<Metrics>,
    // held for the whole of `run`/`sync`, which serializes concurrent callers
    launch: Mutex<BulkScheduler>,
    // read by the accessors, which must not wait on `launch`
    table: Arc<StateTable>,
    poisoned: AtomicBool,
    pool: WorkerPool,
}

impl Runtime {
    /// Engine with `pool_size` workers waiting on `discipline`.
    pub fn new(pool_size: usize, discipline: WaitDiscipline) -> Result<Self> {
        let config = Config::builder()
            .num_threads(pool_size)
            .wait_discipline(discipline)
            .build()?;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(WorkQueue::new());
        let metrics = Arc::new(Metrics::new(config.worker_threads())?);
        let pool = WorkerPool::new(&config, queue.clone(), metrics.clone())?;
        let scheduler = BulkScheduler::new();

        Ok(Self {
            config,
            queue,
            metrics,
            table: scheduler.table(),
            launch: Mutex::new(scheduler),
            poisoned: AtomicBool::new(false),
            pool,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    pub fn wait_discipline(&self) -> WaitDiscipline {
        self.pool.discipline()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Tasks run so far by each worker.
    pub fn tasks_per_worker(&self) -> Vec<u64> {
        self.pool.tasks_per_worker()
    }

    /// Lifecycle state of `id`, or `None` if no such bulk was ever issued.
    ///
    /// Safe to call from inside a running task.
    pub fn bulk_state(&self, id: BulkId) -> Option<BulkState> {
        self.table.get(id)
    }

    /// Bulks registered and waiting for the next `sync`.
    pub fn pending_bulks(&self) -> usize {
        self.table.pending()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn ensure_not_worker(&self) -> Result<()> {
        // A worker waiting on its own bulk would never drain it.
        if self.pool.is_worker_thread() {
            return Err(Error::Reentrant);
        }
        Ok(())
    }

    fn execute_bulk(&self, id: BulkId, runnable: &Arc<dyn Runnable>, total: usize) -> Result<()> {
        let start = Instant::now();
        self.queue.push_bulk(id, runnable, total);
        tracing::debug!(bulk = %id, total, "bulk enqueued");

        let outcome = self.queue.drain_wait(total);
        tracing::debug!(
            bulk = %id,
            completed = outcome.completed,
            elapsed_us = start.elapsed().as_micros() as u64,
            "bulk drained"
        );

        if let Some(TaskPanic {
            bulk,
            index,
            message,
        }) = outcome.panic
        {
            return Err(Error::TaskPanicked {
                bulk,
                index,
                message,
            });
        }

        self.metrics.record_bulk_completed();
        Ok(())
    }
}

impl TaskSystem for Runtime {
    fn name(&self) -> &'static str {
        match self.pool.discipline() {
            WaitDiscipline::Spin => "Parallel + Thread Pool + Spin",
            WaitDiscipline::Block => "Parallel + Thread Pool + Sleep",
        }
    }

    fn run(&self, runnable: Arc<dyn Runnable>, total: usize) -> Result<()> {
        self.ensure_not_worker()?;

        let mut scheduler = self.launch.lock();
        if self.is_poisoned() {
            return Err(Error::Poisoned);
        }

        let id = scheduler.begin_immediate();
        let result = if total == 0 {
            Ok(())
        } else {
            self.execute_bulk(id, &runnable, total)
        };

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
        self.ensure_not_worker()?;
        Ok(self.launch.lock().submit(runnable, total, deps))
    }

    fn sync(&self) -> Result<()> {
        self.ensure_not_worker()?;

        let mut scheduler = self.launch.lock();
        if self.is_poisoned() {
            return Err(Error::Poisoned);
        }

        match scheduler.sync_with(|id, bulk| self.execute_bulk(id, &bulk.runnable, bulk.total)) {
            Ok(0) => Ok(()),
            Ok(_) => {
                self.metrics.record_sync();
                Ok(())
            }
            Err(err) => {
                if matches!(err, Error::TaskPanicked { .. }) {
                    self.poisoned.store(true, Ordering::Release);
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("num_threads", &self.pool.num_threads())
            .field("wait_discipline", &self.pool.discipline())
            .field("queued", &self.queue.len())
            .finish()
    }
}
