use super::panic_handler::PanicHandler;
use super::queue::WorkQueue;
use super::worker::{current_pool, Worker, WorkerId, WorkerState};
use crate::config::{Config, WaitDiscipline};
use crate::error::{Error, Result};
use crate::telemetry::Metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    // SAFETY: cpuset is a plain bitmask owned by this frame and the call only
    // affects the calling thread.
    let result = unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset)
    };
    if result != 0 {
        tracing::warn!(
            thread = std::thread::current().name().unwrap_or("unknown"),
            core = core_id,
            "failed to pin worker to core"
        );
    }
}

/// Fixed set of worker threads consuming one shared [`WorkQueue`].
pub(crate) struct WorkerPool {
    id: u64,
    workers: Vec<WorkerHandle>,
    queue: Arc<WorkQueue>,
    discipline: WaitDiscipline,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
    state: Arc<WorkerState>,
}

impl WorkerPool {
    pub fn new(config: &Config, queue: Arc<WorkQueue>, metrics: Arc<Metrics>) -> Result<Self> {
        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let mut pool = Self {
            id: POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            workers: Vec::with_capacity(num_threads),
            queue,
            discipline: config.wait_discipline,
        };

        // On a spawn failure `pool` is dropped here, which halts and joins
        // the workers started so far.
        for id in 0..num_threads {
            let state = Arc::new(WorkerState::default());
            let worker = Worker {
                id,
                pool_id: pool.id,
                discipline: config.wait_discipline,
                panic_handler: PanicHandler::new(config.panic_strategy),
                state: state.clone(),
                metrics: metrics.clone(),
            };

            let queue = pool.queue.clone();
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let pin_workers = config.pin_workers;
            let thread = builder
                .spawn(move || {
                    #[cfg(target_os = "linux")]
                    if pin_workers {
                        pin_thread_to_core(id % num_cpus::get());
                    }
                    #[cfg(not(target_os = "linux"))]
                    let _ = pin_workers;

                    worker.run(&queue);
                })
                .map_err(Error::Spawn)?;

            pool.workers.push(WorkerHandle {
                id,
                thread: Some(thread),
                state,
            });
        }

        tracing::debug!(
            pool = pool.id,
            threads = num_threads,
            discipline = %pool.discipline,
            "worker pool started"
        );

        Ok(pool)
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    pub fn discipline(&self) -> WaitDiscipline {
        self.discipline
    }

    /// True when called from one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        current_pool() == Some(self.id)
    }

    /// Tasks run so far by each worker, indexed by worker id.
    pub fn tasks_per_worker(&self) -> Vec<u64> {
        self.workers
            .iter()
            .map(|w| w.state.tasks_executed.load(Ordering::Relaxed))
            .collect()
    }

    /// Halt the queue and join every worker. Tasks already popped run to
    /// completion; queued ones are abandoned.
    pub fn shutdown(&mut self) {
        self.queue.halt();

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::warn!(worker = worker.id, "worker thread exited by panic");
                }
            }
        }

        tracing::debug!(pool = self.id, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
