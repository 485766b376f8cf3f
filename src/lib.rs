//! tasksys - bulk task execution engine
//!
//! Runs large numbers of homogeneous, index-parameterized tasks on a fixed
//! pool of worker threads. A *bulk launch* pairs one [`Runnable`] with a task
//! count; the engine calls `run_task(i, total)` exactly once for every `i` in
//! `0..total`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use tasksys::prelude::*;
//!
//! let rt = Runtime::new(4, WaitDiscipline::Block).unwrap();
//!
//! // Synchronous launch
//! let hits = Arc::new(AtomicUsize::new(0));
//! let counter = hits.clone();
//! rt.run(Arc::new(move |_i: usize, _n: usize| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! }), 1000).unwrap();
//! assert_eq!(hits.load(Ordering::Relaxed), 1000);
//!
//! // Asynchronous launches with dependencies
//! let a = rt.run_async_with_deps(Arc::new(|_: usize, _: usize| {}), 10, &[]).unwrap();
//! let b = rt.run_async_with_deps(Arc::new(|_: usize, _: usize| {}), 5, &[a]).unwrap();
//! rt.sync().unwrap();
//! assert_eq!(rt.bulk_state(b), Some(BulkState::Complete));
//! ```
//!
//! # Features
//!
//! - **Two wait disciplines**: idle workers either spin on the queue or sleep
//!   on a condition variable ([`WaitDiscipline`])
//! - **Dependency scheduling**: bulks registered with
//!   [`run_async_with_deps`](TaskSystem::run_async_with_deps) run in
//!   topological order on [`sync`](TaskSystem::sync); cycles and unknown
//!   prerequisites are reported, never silently dropped
//! - **Baseline engines**: [`SerialRuntime`] runs every task on the calling
//!   thread and [`SpawnRuntime`] spawns fresh threads for each bulk; both
//!   implement the same [`TaskSystem`] interface
//! - **Telemetry**: task counts and latency percentiles via
//!   [`Runtime::metrics`]

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod runtime;
pub mod scheduler;
pub mod serial;
pub mod spawn;
pub mod telemetry;
pub mod util;

pub use config::{Config, ConfigBuilder, WaitDiscipline};
pub use error::{Error, Result};
pub use executor::{BulkId, PanicStrategy, Runnable};
pub use runtime::{Runtime, TaskSystem};
pub use scheduler::{BulkState, DependencyGraph};
pub use serial::SerialRuntime;
pub use spawn::SpawnRuntime;
