// worker thread stuff
use super::panic_handler::PanicHandler;
use super::queue::{TaskPanic, WorkQueue};
use super::task::TaskItem;
use crate::config::WaitDiscipline;
use crate::telemetry::Metrics;
use crate::util::SpinBackoff;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub type WorkerId = usize;

thread_local! {
    // id of the pool owning the current thread, if it is a worker
    static CURRENT_POOL: Cell<Option<u64>> = const { Cell::new(None) };
}

pub(crate) fn current_pool() -> Option<u64> {
    CURRENT_POOL.with(|pool| pool.get())
}

// stats for each worker
#[derive(Debug, Default)]
pub struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub idle_rounds: AtomicU64,
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub pool_id: u64,
    pub discipline: WaitDiscipline,
    pub panic_handler: PanicHandler,
    pub state: Arc<WorkerState>,
    pub metrics: Arc<Metrics>,
}

impl Worker {
    // main loop, returns once the queue is halted
    pub fn run(&self, queue: &WorkQueue) {
        CURRENT_POOL.with(|pool| pool.set(Some(self.pool_id)));
        tracing::debug!(worker = self.id, discipline = %self.discipline, "worker started");

        match self.discipline {
            WaitDiscipline::Spin => self.run_spinning(queue),
            WaitDiscipline::Block => self.run_blocking(queue),
        }

        CURRENT_POOL.with(|pool| pool.set(None));
        tracing::debug!(
            worker = self.id,
            executed = self.state.tasks_executed.load(Ordering::Relaxed),
            "worker halted"
        );
    }

    fn run_spinning(&self, queue: &WorkQueue) {
        let mut backoff = SpinBackoff::new();
        let mut idle = 0u64;

        while !queue.is_halted() {
            match queue.try_pop() {
                Some(item) => {
                    self.flush_idle(&mut idle);
                    backoff.reset();
                    self.execute(queue, item);
                }
                None => {
                    idle += 1;
                    backoff.spin();
                }
            }
        }

        self.flush_idle(&mut idle);
    }

    fn run_blocking(&self, queue: &WorkQueue) {
        while let Some(item) = queue.pop_blocking() {
            self.execute(queue, item);
        }
    }

    fn flush_idle(&self, idle: &mut u64) {
        if *idle > 0 {
            self.state.idle_rounds.fetch_add(*idle, Ordering::Relaxed);
            self.metrics.record_idle_rounds(*idle);
            *idle = 0;
        }
    }

    fn execute(&self, queue: &WorkQueue, item: TaskItem) {
        let start = Instant::now();
        let result = self.panic_handler.execute(|| item.execute());
        let duration_ns = start.elapsed().as_nanos() as u64;

        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);

        let panic = match result {
            Ok(()) => {
                self.metrics.record_task_execution(self.id, duration_ns);
                None
            }
            Err(info) => {
                tracing::error!(
                    worker = self.id,
                    bulk = %item.bulk,
                    index = item.index,
                    message = %info.message,
                    "task panicked"
                );
                self.metrics.record_task_panic();
                Some(TaskPanic {
                    bulk: item.bulk,
                    index: item.index,
                    message: info.message,
                })
            }
        };

        // the runnable must be released before the coordinator sees the drain
        drop(item);
        queue.complete(panic);
    }
}
