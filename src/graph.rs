// src/graph.rs

//! Dependency graph diagnostics.
//!
//! The queue never looks for cycles: an operation caught in one simply
//! never becomes ready. Hosts that build graphs dynamically can collect
//! them here first and check them with `petgraph`.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{OpQueueError, Result};
use crate::operation::{Operation, OperationId};

/// Snapshot of the dependency edges reachable from a set of operations.
///
/// Edge direction: dependency -> dependent.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<OperationId, ()>,
    operations: HashMap<OperationId, Operation>,
}

impl DependencyGraph {
    /// Walk the dependencies of `roots` transitively.
    pub fn collect<'a>(roots: impl IntoIterator<Item = &'a Operation>) -> Self {
        let mut graph = DiGraphMap::new();
        let mut operations = HashMap::new();
        let mut stack: Vec<Operation> = roots.into_iter().cloned().collect();

        while let Some(operation) = stack.pop() {
            let id = operation.id();
            if operations.contains_key(&id) {
                continue;
            }
            graph.add_node(id);

            for dependency in operation.dependencies() {
                graph.add_edge(dependency.id(), id, ());
                stack.push(dependency);
            }
            operations.insert(id, operation);
        }

        Self { graph, operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains(&self, operation: &Operation) -> bool {
        self.operations.contains_key(&operation.id())
    }

    /// Operations that list `operation` as a direct dependency.
    pub fn dependents_of(&self, operation: &Operation) -> Vec<Operation> {
        let id = operation.id();
        if !self.graph.contains_node(id) {
            return Vec::new();
        }
        self.graph
            .neighbors_directed(id, Direction::Outgoing)
            .filter_map(|dependent| self.operations.get(&dependent).cloned())
            .collect()
    }

    pub fn check_acyclic(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }

    /// All collected operations, every dependency before its dependents.
    pub fn topological_order(&self) -> Result<Vec<Operation>> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            let name = self
                .operations
                .get(&cycle.node_id())
                .map(Operation::name)
                .unwrap_or_default();
            OpQueueError::DependencyCycle(name)
        })?;

        Ok(order
            .into_iter()
            .filter_map(|id| self.operations.get(&id).cloned())
            .collect())
    }
}
