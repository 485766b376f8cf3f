//! Task execution infrastructure.
//!
//! The runnable contract, the shared work queue, and the fixed pool of
//! worker threads that drains it.

pub mod cpu_pool;
pub mod panic_handler;
pub mod queue;
pub mod task;
pub mod worker;

pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use task::{BulkId, Runnable};

pub(crate) use cpu_pool::WorkerPool;
pub(crate) use queue::{TaskPanic, WorkQueue};
