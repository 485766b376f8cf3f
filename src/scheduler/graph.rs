//! Dependency graph over bulk launches.

use crate::error::{Error, Result};
use crate::executor::BulkId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Directed graph whose edge `u -> v` means bulk `u` must complete before
/// bulk `v` starts.
///
/// Edges are only ever added. Node storage is keyed by id, so inserting an
/// edge between two ids never touches the ids in between.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    successors: HashMap<BulkId, Vec<BulkId>>,
    edges: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as a node. Idempotent.
    pub fn add_node(&mut self, id: BulkId) {
        self.successors.entry(id).or_default();
    }

    /// Insert the edge `prereq -> dependent`, registering both endpoints.
    pub fn add_edge(&mut self, prereq: BulkId, dependent: BulkId) {
        self.add_node(dependent);
        self.successors.entry(prereq).or_default().push(dependent);
        self.edges += 1;
    }

    pub fn contains(&self, id: BulkId) -> bool {
        self.successors.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.successors.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn successors(&self, id: BulkId) -> &[BulkId] {
        self.successors
            .get(&id)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    /// Every node, ascending.
    pub fn nodes(&self) -> Vec<BulkId> {
        let mut nodes: Vec<BulkId> = self.successors.keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    /// Kahn's algorithm over the whole graph.
    ///
    /// Every node with no incoming edge seeds the ready set, not just the
    /// root, so bulks disconnected from the root are still ordered. Among
    /// ready nodes the smallest id goes first, which makes the order a pure
    /// function of the edges inserted. Fails with
    /// [`Error::DependencyCycle`] when some node can never become ready.
    pub fn topological_order(&self) -> Result<Vec<BulkId>> {
        let mut in_degree: HashMap<BulkId, usize> =
            self.successors.keys().map(|&id| (id, 0)).collect();
        for targets in self.successors.values() {
            for target in targets {
                *in_degree.entry(*target).or_default() += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<BulkId>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.successors.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &next in self.successors(id) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(next));
                    }
                }
            }
        }

        if order.len() < self.successors.len() {
            let mut unresolved: Vec<BulkId> = in_degree
                .into_iter()
                .filter(|&(_, degree)| degree > 0)
                .map(|(id, _)| id)
                .collect();
            unresolved.sort_unstable();
            return Err(Error::DependencyCycle { unresolved });
        }

        Ok(order)
    }
}
