//! Task representation: the runnable contract, bulk identifiers and the
//! per-index items that travel through the work queue.

use std::fmt;
use std::sync::Arc;

/// Work that can be split into `total` independently indexed tasks.
///
/// The engine calls [`run_task`](Runnable::run_task) exactly once for every
/// index in `0..total` of a bulk launch. Calls for different indices may run
/// in any order, on any worker, at the same time; implementations must
/// partition their state by index or synchronize it themselves.
pub trait Runnable: Send + Sync {
    /// Run task `index` out of `total`.
    fn run_task(&self, index: usize, total: usize);
}

impl<F> Runnable for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn run_task(&self, index: usize, total: usize) {
        self(index, total)
    }
}

/// Identifier of a bulk launch.
///
/// Ids are handed out in increasing order starting at 1 and never reused.
/// [`BulkId::ROOT`] is the implicit, always-complete root of every
/// dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BulkId(u64);

impl BulkId {
    pub const ROOT: BulkId = BulkId(0);

    pub const fn new(raw: u64) -> Self {
        BulkId(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn is_root(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn next(self) -> Self {
        BulkId(self.0 + 1)
    }
}

impl fmt::Display for BulkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for BulkId {
    fn from(raw: u64) -> Self {
        BulkId(raw)
    }
}

/// One (bulk, index) unit of work sitting in the queue.
pub(crate) struct TaskItem {
    pub(crate) bulk: BulkId,
    pub(crate) runnable: Arc<dyn Runnable>,
    pub(crate) index: usize,
    pub(crate) total: usize,
}

impl TaskItem {
    pub fn execute(&self) {
        self.runnable.run_task(self.index, self.total);
    }
}

impl fmt::Debug for TaskItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskItem")
            .field("bulk", &self.bulk)
            .field("index", &self.index)
            .field("total", &self.total)
            .finish()
    }
}
