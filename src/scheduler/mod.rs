//! Bulk launch bookkeeping and dependency-ordered scheduling.
//!
//! [`BulkScheduler`] owns every piece of scheduling state: id allocation,
//! the lifecycle state of each bulk, the launches waiting for the next
//! `sync`, and the dependency graph between them. It never touches the work
//! queue itself; executing a bulk is delegated to the engine through a
//! closure, which lets the pooled and the serial engine share one set of
//! dependency semantics.

pub mod graph;

pub use graph::DependencyGraph;

use crate::error::{Error, Result};
use crate::executor::{BulkId, Runnable};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle of a bulk launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkState {
    /// Submitted, waiting for the next `sync`.
    Pending,
    /// Every prerequisite has completed.
    Ready,
    /// Tasks are in the queue or executing.
    Running,
    /// Every task finished.
    Complete,
    /// Every task ran but at least one panicked.
    Failed,
    /// Dropped without running because its `sync` was aborted.
    Discarded,
}

impl BulkState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BulkState::Complete | BulkState::Failed | BulkState::Discarded
        )
    }
}

/// A registered bulk: the callable and how many tasks it expands into.
#[derive(Clone)]
pub(crate) struct BulkLaunch {
    pub runnable: Arc<dyn Runnable>,
    pub total: usize,
}

impl fmt::Debug for BulkLaunch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkLaunch")
            .field("total", &self.total)
            .finish()
    }
}

/// Lifecycle state of every bulk ever issued, plus the size of the pending
/// set.
///
/// Shared between the scheduler and the engine accessors. Each lock is held
/// only around a single read or write, never across task execution, so a
/// task may query its own engine while a launch is in progress.
#[derive(Debug)]
pub(crate) struct StateTable {
    // indexed by raw id; slot 0 is the root
    states: RwLock<Vec<BulkState>>,
    pending: AtomicUsize,
}

impl StateTable {
    fn new() -> Self {
        Self {
            states: RwLock::new(vec![BulkState::Complete]),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, id: BulkId) -> Option<BulkState> {
        let slot = usize::try_from(id.get()).ok()?;
        self.states.read().get(slot).copied()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn push(&self, state: BulkState) {
        self.states.write().push(state);
    }

    fn set(&self, id: BulkId, state: BulkState) {
        let Ok(slot) = usize::try_from(id.get()) else {
            return;
        };
        if let Some(current) = self.states.write().get_mut(slot) {
            *current = state;
        }
    }

    fn set_pending(&self, count: usize) {
        self.pending.store(count, Ordering::Release);
    }
}

#[derive(Debug)]
pub(crate) struct BulkScheduler {
    next_id: BulkId,
    table: Arc<StateTable>,
    pending: HashMap<BulkId, BulkLaunch>,
    graph: DependencyGraph,
}

impl BulkScheduler {
    pub fn new() -> Self {
        Self {
            next_id: BulkId::ROOT.next(),
            table: Arc::new(StateTable::new()),
            pending: HashMap::new(),
            graph: DependencyGraph::new(),
        }
    }

    /// Handle on the state table that outlives any borrow of the scheduler.
    pub fn table(&self) -> Arc<StateTable> {
        Arc::clone(&self.table)
    }

    pub fn state(&self, id: BulkId) -> Option<BulkState> {
        self.table.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    fn allocate(&mut self, state: BulkState) -> BulkId {
        let id = self.next_id;
        self.next_id = id.next();
        self.table.push(state);
        id
    }

    fn set_state(&self, id: BulkId, state: BulkState) {
        self.table.set(id, state);
    }

    /// Allocate an id for a launch that executes right away, outside the
    /// dependency graph.
    pub fn begin_immediate(&mut self) -> BulkId {
        self.allocate(BulkState::Running)
    }

    pub fn finish_immediate(&mut self, id: BulkId, succeeded: bool) {
        let state = if succeeded {
            BulkState::Complete
        } else {
            BulkState::Failed
        };
        self.set_state(id, state);
    }

    /// Register a pending launch. Prerequisites that already completed are
    /// satisfied on the spot; with nothing left to wait for the launch hangs
    /// off the root.
    pub fn submit(&mut self, runnable: Arc<dyn Runnable>, total: usize, deps: &[BulkId]) -> BulkId {
        let id = self.allocate(BulkState::Pending);
        self.graph.add_node(id);

        let mut waits = false;
        for &dep in deps {
            if self.state(dep) == Some(BulkState::Complete) {
                continue;
            }
            self.graph.add_edge(dep, id);
            waits = true;
        }
        if !waits {
            self.graph.add_edge(BulkId::ROOT, id);
        }

        self.pending.insert(id, BulkLaunch { runnable, total });
        self.table.set_pending(self.pending.len());
        tracing::trace!(bulk = %id, total, deps = deps.len(), "bulk registered");
        id
    }

    /// Take the pending launches out in dependency order.
    ///
    /// On a dependency error every pending launch is discarded and nothing
    /// is returned, so a broken graph never half-runs.
    fn plan(&mut self) -> Result<Vec<(BulkId, BulkLaunch)>> {
        let graph = std::mem::take(&mut self.graph);
        let mut pending = std::mem::take(&mut self.pending);
        self.table.set_pending(0);

        let verdict = self
            .check_prerequisites(&graph, &pending)
            .and_then(|()| graph.topological_order());

        let order = match verdict {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(error = %err, discarded = pending.len(), "sync aborted");
                for &id in pending.keys() {
                    self.set_state(id, BulkState::Discarded);
                }
                return Err(err);
            }
        };

        Ok(order
            .into_iter()
            .filter(|id| !id.is_root())
            .filter_map(|id| pending.remove(&id).map(|launch| (id, launch)))
            .collect())
    }

    // Every graph node other than the root must be a pending launch or a
    // bulk that completed after it was named (a forward reference later
    // taken by `run`). Anything else was never submitted.
    fn check_prerequisites(
        &self,
        graph: &DependencyGraph,
        pending: &HashMap<BulkId, BulkLaunch>,
    ) -> Result<()> {
        for node in graph.nodes() {
            if node.is_root()
                || pending.contains_key(&node)
                || self.state(node) == Some(BulkState::Complete)
            {
                continue;
            }
            let bulk = graph
                .successors(node)
                .iter()
                .copied()
                .min()
                .unwrap_or(node);
            return Err(Error::UnknownDependency {
                bulk,
                missing: node,
            });
        }
        Ok(())
    }

    /// Run every pending launch in dependency order, one at a time.
    ///
    /// `execute` must return only once every task of the launch finished.
    /// Launches with no tasks complete without calling it. Returns the number
    /// of launches processed.
    pub fn sync_with<F>(&mut self, mut execute: F) -> Result<usize>
    where
        F: FnMut(BulkId, &BulkLaunch) -> Result<()>,
    {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let plan = self.plan()?;
        let count = plan.len();
        tracing::debug!(bulks = count, "sync started");

        let mut remaining = plan.into_iter();
        while let Some((id, launch)) = remaining.next() {
            self.set_state(id, BulkState::Ready);

            if launch.total == 0 {
                self.set_state(id, BulkState::Complete);
                continue;
            }

            self.set_state(id, BulkState::Running);
            if let Err(err) = execute(id, &launch) {
                self.set_state(id, BulkState::Failed);
                for (rest, _) in remaining {
                    self.set_state(rest, BulkState::Discarded);
                }
                return Err(err);
            }
            self.set_state(id, BulkState::Complete);
        }

        tracing::debug!(bulks = count, "sync finished");
        Ok(count)
    }
}

impl Default for BulkScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Runnable> {
        Arc::new(|_: usize, _: usize| {})
    }

    fn run_order(scheduler: &mut BulkScheduler) -> Result<Vec<BulkId>> {
        let mut order = Vec::new();
        scheduler.sync_with(|id, _| {
            order.push(id);
            Ok(())
        })?;
        Ok(order)
    }

    #[test]
    fn test_ids_are_monotonic_and_start_at_one() {
        let mut scheduler = BulkScheduler::new();
        let a = scheduler.submit(noop(), 1, &[]);
        let b = scheduler.begin_immediate();
        let c = scheduler.submit(noop(), 1, &[]);

        assert_eq!(a, BulkId::new(1));
        assert_eq!(b, BulkId::new(2));
        assert_eq!(c, BulkId::new(3));
        assert_eq!(scheduler.state(BulkId::ROOT), Some(BulkState::Complete));
        assert_eq!(scheduler.state(BulkId::new(40)), None);
    }

    #[test]
    fn test_sync_follows_dependencies() {
        let mut scheduler = BulkScheduler::new();
        let a = scheduler.submit(noop(), 1, &[]);
        let b = scheduler.submit(noop(), 1, &[]);
        let c = scheduler.submit(noop(), 1, &[b, a]);
        let d = scheduler.submit(noop(), 1, &[a]);

        assert_eq!(scheduler.state(c), Some(BulkState::Pending));
        assert_eq!(run_order(&mut scheduler).unwrap(), vec![a, b, c, d]);
        for id in [a, b, c, d] {
            assert_eq!(scheduler.state(id), Some(BulkState::Complete));
        }
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_second_sync_is_a_no_op() {
        let mut scheduler = BulkScheduler::new();
        scheduler.submit(noop(), 3, &[]);
        assert_eq!(run_order(&mut scheduler).unwrap().len(), 1);
        assert!(run_order(&mut scheduler).unwrap().is_empty());
    }

    #[test]
    fn test_completed_prerequisite_is_satisfied() {
        let mut scheduler = BulkScheduler::new();
        let a = scheduler.submit(noop(), 1, &[]);
        run_order(&mut scheduler).unwrap();

        let b = scheduler.submit(noop(), 1, &[a]);
        assert_eq!(scheduler.graph().successors(BulkId::ROOT), &[b]);
        assert_eq!(run_order(&mut scheduler).unwrap(), vec![b]);
    }

    #[test]
    fn test_empty_bulk_completes_without_executing() {
        let mut scheduler = BulkScheduler::new();
        let empty = scheduler.submit(noop(), 0, &[]);
        let after = scheduler.submit(noop(), 2, &[empty]);

        assert_eq!(run_order(&mut scheduler).unwrap(), vec![after]);
        assert_eq!(scheduler.state(empty), Some(BulkState::Complete));
    }

    #[test]
    fn test_unknown_dependency_discards_wave() {
        let mut scheduler = BulkScheduler::new();
        let a = scheduler.submit(noop(), 1, &[]);
        let b = scheduler.submit(noop(), 1, &[BulkId::new(77)]);

        match run_order(&mut scheduler) {
            Err(Error::UnknownDependency { bulk, missing }) => {
                assert_eq!(bulk, b);
                assert_eq!(missing, BulkId::new(77));
            }
            other => panic!("expected unknown dependency, got {:?}", other),
        }
        assert_eq!(scheduler.state(a), Some(BulkState::Discarded));
        assert_eq!(scheduler.state(b), Some(BulkState::Discarded));

        // a discarded bulk is not a valid prerequisite either
        scheduler.submit(noop(), 1, &[a]);
        assert!(run_order(&mut scheduler).unwrap_err().is_dependency_error());
    }

    #[test]
    fn test_forward_references_form_a_cycle() {
        let mut scheduler = BulkScheduler::new();
        // bulk 1 waits for 2, bulk 2 waits for 1
        let a = scheduler.submit(noop(), 1, &[BulkId::new(2)]);
        let b = scheduler.submit(noop(), 1, &[a]);
        assert_eq!(b, BulkId::new(2));

        match run_order(&mut scheduler) {
            Err(Error::DependencyCycle { unresolved }) => assert_eq!(unresolved, vec![a, b]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_discards_the_rest() {
        let mut scheduler = BulkScheduler::new();
        let a = scheduler.submit(noop(), 1, &[]);
        let b = scheduler.submit(noop(), 1, &[a]);

        let result = scheduler.sync_with(|_, _| Err(Error::Poisoned));
        assert!(matches!(result, Err(Error::Poisoned)));
        assert_eq!(scheduler.state(a), Some(BulkState::Failed));
        assert_eq!(scheduler.state(b), Some(BulkState::Discarded));
        assert!(BulkState::Discarded.is_terminal());
    }

    #[test]
    fn test_forward_reference_to_immediate_launch_is_satisfied() {
        let mut scheduler = BulkScheduler::new();
        let a = scheduler.submit(noop(), 1, &[BulkId::new(2)]);
        let immediate = scheduler.begin_immediate();
        scheduler.finish_immediate(immediate, true);
        assert_eq!(immediate, BulkId::new(2));

        assert_eq!(run_order(&mut scheduler).unwrap(), vec![a]);
        assert_eq!(scheduler.state(a), Some(BulkState::Complete));
    }

    #[test]
    fn test_forward_reference_to_failed_launch_is_rejected() {
        let mut scheduler = BulkScheduler::new();
        let a = scheduler.submit(noop(), 1, &[BulkId::new(2)]);
        let immediate = scheduler.begin_immediate();
        scheduler.finish_immediate(immediate, false);

        assert!(matches!(
            run_order(&mut scheduler),
            Err(Error::UnknownDependency { bulk, missing }) if bulk == a && missing == immediate
        ));
    }

    #[test]
    fn test_table_tracks_pending_count() {
        let mut scheduler = BulkScheduler::new();
        let table = scheduler.table();
        scheduler.submit(noop(), 1, &[]);
        scheduler.submit(noop(), 1, &[]);
        assert_eq!(table.pending(), 2);

        run_order(&mut scheduler).unwrap();
        assert_eq!(table.pending(), 0);
        assert_eq!(table.get(BulkId::new(2)), Some(BulkState::Complete));
    }

    #[test]
    fn test_immediate_launch_states() {
        let mut scheduler = BulkScheduler::new();
        let id = scheduler.begin_immediate();
        assert_eq!(scheduler.state(id), Some(BulkState::Running));
        scheduler.finish_immediate(id, true);
        assert_eq!(scheduler.state(id), Some(BulkState::Complete));
    }
}
