//! Routes between node fields.
//!
//! The table only records connections. Delivery lives on
//! [`crate::SceneGraph::send_route`], which reads the source field and writes
//! the destination.

use crate::node::NodeHandle;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One end of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldEndpoint {
    pub node: NodeHandle,
    pub field: usize,
}

impl FieldEndpoint {
    pub fn new(node: NodeHandle, field: usize) -> Self {
        Self { node, field }
    }
}

/// Connects an output field of one node to an input field of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub from: FieldEndpoint,
    pub to: FieldEndpoint,
}

impl Route {
    pub fn new(from: NodeHandle, from_field: usize, to: NodeHandle, to_field: usize) -> Self {
        Self {
            from: FieldEndpoint::new(from, from_field),
            to: FieldEndpoint::new(to, to_field),
        }
    }

    /// Check if this route involves a specific node.
    pub fn involves(&self, node: NodeHandle) -> bool {
        self.from.node == node || self.to.node == node
    }
}

/// Routes keyed by source, in insertion order
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    by_source: IndexMap<FieldEndpoint, SmallVec<[FieldEndpoint; 2]>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route; duplicates are ignored. Returns whether it was new.
    pub fn add(&mut self, route: Route) -> bool {
        let targets = self.by_source.entry(route.from).or_default();
        if targets.contains(&route.to) {
            return false;
        }
        targets.push(route.to);
        true
    }

    pub fn remove(&mut self, route: &Route) -> bool {
        let Some(targets) = self.by_source.get_mut(&route.from) else {
            return false;
        };
        let before = targets.len();
        targets.retain(|t| *t != route.to);
        let removed = targets.len() != before;
        if targets.is_empty() {
            self.by_source.shift_remove(&route.from);
        }
        removed
    }

    /// Destinations fed by `from`, in the order they were added
    pub fn targets(&self, from: FieldEndpoint) -> &[FieldEndpoint] {
        self.by_source.get(&from).map(|t| t.as_slice()).unwrap_or(&[])
    }

    /// Drop every route touching `node`; returns how many were removed
    pub fn remove_node(&mut self, node: NodeHandle) -> usize {
        let mut removed = 0;
        self.by_source.retain(|from, targets| {
            if from.node == node {
                removed += targets.len();
                return false;
            }
            let before = targets.len();
            targets.retain(|t| t.node != node);
            removed += before - targets.len();
            !targets.is_empty()
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = Route> + '_ {
        self.by_source
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| Route { from: *from, to: *to }))
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_add_and_remove_node() {
        let mut nodes: SlotMap<NodeHandle, ()> = SlotMap::with_key();
        let (a, b, c) = (nodes.insert(()), nodes.insert(()), nodes.insert(()));
        let mut table = RouteTable::new();
        assert!(table.add(Route::new(a, 1, b, 2)));
        assert!(!table.add(Route::new(a, 1, b, 2)));
        assert!(table.add(Route::new(a, 1, c, 2)));
        assert!(table.add(Route::new(b, 3, c, 4)));
        assert_eq!(table.len(), 3);

        assert_eq!(
            table.targets(FieldEndpoint::new(a, 1)),
            &[FieldEndpoint::new(b, 2), FieldEndpoint::new(c, 2)]
        );

        assert_eq!(table.remove_node(c), 2);
        assert_eq!(table.len(), 1);
        assert!(table.remove(&Route::new(a, 1, b, 2)));
        assert!(table.is_empty());
    }
}
