//! Route trees grown by the maze router.
//!
//! A net's routing is a [`RouteForest`]: an arena of [`RouteNode`]s holding
//! one tree per legal source wire. Nodes refer to their parent and children
//! by [`NodeId`] so that the search can walk back from a reached terminal to
//! its root and prune speculative branches without shared ownership.

use kestrel_device::{Connection, WireId};
use std::collections::{BTreeSet, HashSet};

/// Index of a node inside one [`RouteForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One wire of a route tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNode {
    /// The wire this node occupies.
    pub wire: WireId,
    /// Accumulated search cost from the root. Zero once the node lies on a
    /// path to a routed sink.
    pub cost: u32,
    /// Parent node, `None` for roots.
    pub parent: Option<NodeId>,
    /// The connection taken from the parent's wire.
    pub connection: Option<Connection>,
    /// Child nodes.
    pub children: Vec<NodeId>,
}

/// The route trees of one net.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteForest {
    nodes: Vec<RouteNode>,
    roots: Vec<NodeId>,
}

impl RouteForest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new tree rooted at `wire`.
    pub fn add_root(&mut self, wire: WireId, cost: u32) -> NodeId {
        let id = self.push(RouteNode {
            wire,
            cost,
            parent: None,
            connection: None,
            children: Vec::new(),
        });
        self.roots.push(id);
        id
    }

    /// Extends `parent` through `connection`.
    pub fn add_child(&mut self, parent: NodeId, connection: Connection, cost: u32) -> NodeId {
        let id = self.push(RouteNode {
            wire: connection.wire,
            cost,
            parent: Some(parent),
            connection: Some(connection),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    fn push(&mut self, node: RouteNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Returns a node.
    pub fn node(&self, id: NodeId) -> &RouteNode {
        &self.nodes[id.index()]
    }

    /// Root nodes, in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// All nodes reachable from a root, parents before children.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &RouteNode)> + '_ {
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.index()].children.iter().rev().copied());
        }
        order.into_iter().map(move |id| (id, &self.nodes[id.index()]))
    }

    /// Number of reachable nodes.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if the forest has no trees.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Distinct wires used by the forest, in ID order.
    pub fn wires(&self) -> Vec<WireId> {
        let set: BTreeSet<WireId> = self.iter().map(|(_, n)| n.wire).collect();
        set.into_iter().collect()
    }

    /// Returns `true` if some node of the forest sits on `wire`.
    pub fn contains_wire(&self, wire: WireId) -> bool {
        self.iter().any(|(_, n)| n.wire == wire)
    }

    /// Zeroes the cost of every node from `leaf` up to its root.
    pub fn clear_path_cost(&mut self, leaf: NodeId) {
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = &mut self.nodes[id.index()];
            node.cost = 0;
            current = node.parent;
        }
    }

    /// Wires from the root down to `leaf`.
    pub fn path_to(&self, leaf: NodeId) -> Vec<WireId> {
        let mut path = Vec::new();
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = &self.nodes[id.index()];
            path.push(node.wire);
            current = node.parent;
        }
        path.reverse();
        path
    }

    /// Cuts every branch that does not lead to one of `keep`.
    ///
    /// Roots with no kept descendant are dropped when `remove_unused_roots`
    /// is set and reduced to a bare root otherwise.
    pub fn prune(&mut self, keep: &[NodeId], remove_unused_roots: bool) {
        let mut live = HashSet::new();
        for &leaf in keep {
            let mut current = Some(leaf);
            while let Some(id) = current {
                if !live.insert(id) {
                    break;
                }
                current = self.nodes[id.index()].parent;
            }
        }
        for node in &mut self.nodes {
            node.children.retain(|c| live.contains(c));
        }
        if remove_unused_roots {
            self.roots.retain(|r| live.contains(r));
        }
    }

    /// Rebuilds the arena with only reachable nodes.
    pub fn compacted(&self) -> RouteForest {
        let mut out = RouteForest::new();
        for &root in &self.roots {
            let node = &self.nodes[root.index()];
            let new_root = out.add_root(node.wire, node.cost);
            let mut stack = vec![(root, new_root)];
            while let Some((old, new)) = stack.pop() {
                for &child in &self.nodes[old.index()].children {
                    let c = &self.nodes[child.index()];
                    let id = out.push(RouteNode {
                        wire: c.wire,
                        cost: c.cost,
                        parent: Some(new),
                        connection: c.connection,
                        children: Vec::new(),
                    });
                    out.nodes[new.index()].children.push(id);
                    stack.push((child, id));
                }
            }
        }
        out
    }

    /// Length of the longest root-to-leaf path, counted in nodes.
    pub fn depth(&self) -> usize {
        fn walk(forest: &RouteForest, id: NodeId) -> usize {
            1 + forest.nodes[id.index()]
                .children
                .iter()
                .map(|&c| walk(forest, c))
                .max()
                .unwrap_or(0)
        }
        self.roots.iter().map(|&r| walk(self, r)).max().unwrap_or(0)
    }
}
