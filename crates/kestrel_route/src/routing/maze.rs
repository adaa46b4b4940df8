//! Cost-ordered search from a net's route trees to a terminal set.
//!
//! Every node already in the forest seeds the queue with its stored cost, so
//! branches grown for earlier sinks are reused rather than regrown. Wires are
//! expanded cheapest first and a neighbour is only enqueued when the new path
//! strictly improves on the best known cost to it.

use crate::route_tree::{NodeId, RouteForest};
use crate::routing::occupancy::OccupancyTable;
use kestrel_config::CostWeights;
use kestrel_device::{BelPinId, ClusterTemplate, WireId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Wires that end a search, each tagged with the sink BEL pin it belongs to
/// (`None` for cluster boundary wires).
pub(crate) type Terminals = HashMap<WireId, Option<BelPinId>>;

/// Read-only inputs shared by the searches of one routing pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchContext<'a> {
    pub template: &'a ClusterTemplate,
    pub occupancy: &'a OccupancyTable,
    pub weights: &'a CostWeights,
    pub route_throughs: bool,
}

impl SearchContext<'_> {
    /// Cost of entering `wire`, honouring this search's invalidated wires.
    pub fn wire_cost(&self, wire: WireId, invalidated: &HashSet<WireId>) -> u32 {
        if invalidated.contains(&wire) {
            self.weights.invalidated
        } else {
            self.occupancy.wire_cost(wire, self.weights)
        }
    }
}

/// A terminal reached by a successful search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reached {
    pub node: NodeId,
    pub wire: WireId,
    pub pin: Option<BelPinId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    cost: u32,
    seq: u64,
    node: NodeId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; ties pop in insertion order
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Grows `forest` until it touches one of `terminals`.
///
/// On success the path to the reached terminal has its costs cleared and its
/// leaf is appended to `sink_nodes`. Either way the forest is pruned back to
/// the paths of `sink_nodes`, keeping every root.
pub(crate) fn route_to_terminals(
    ctx: &SearchContext<'_>,
    forest: &mut RouteForest,
    sink_nodes: &mut Vec<NodeId>,
    terminals: &Terminals,
    invalidated: &HashSet<WireId>,
) -> Option<Reached> {
    let mut queue = BinaryHeap::new();
    let mut best: HashMap<WireId, u32> = HashMap::new();
    let mut seq = 0u64;

    let seeds: Vec<(NodeId, WireId, u32)> =
        forest.iter().map(|(id, n)| (id, n.wire, n.cost)).collect();
    for (node, wire, cost) in seeds {
        let entry = best.entry(wire).or_insert(cost);
        *entry = (*entry).min(cost);
        queue.push(QueueEntry { cost, seq, node });
        seq += 1;
    }

    let mut processed = HashSet::new();
    let mut reached = None;
    while let Some(QueueEntry { cost, node, .. }) = queue.pop() {
        let wire = forest.node(node).wire;
        if !processed.insert(wire) {
            continue;
        }
        if let Some(&pin) = terminals.get(&wire) {
            reached = Some(Reached { node, wire, pin });
            break;
        }
        for &conn in ctx.template.connections(wire) {
            if conn.is_route_through() && !ctx.route_throughs {
                continue;
            }
            if processed.contains(&conn.wire) {
                continue;
            }
            let next = cost.saturating_add(ctx.wire_cost(conn.wire, invalidated));
            if next < best.get(&conn.wire).copied().unwrap_or(u32::MAX) {
                best.insert(conn.wire, next);
                let child = forest.add_child(node, conn, next);
                queue.push(QueueEntry {
                    cost: next,
                    seq,
                    node: child,
                });
                seq += 1;
            }
        }
    }

    if let Some(r) = reached {
        forest.clear_path_cost(r.node);
        sink_nodes.push(r.node);
    }
    forest.prune(sink_nodes, false);
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_device::{ClusterTemplateBuilder, ConnectionKind, Device, DeviceFamily};
    use std::sync::Arc;

    /// `S` reaches `T` either directly through `X` or through `Y`.
    fn diamond() -> (ClusterTemplate, [WireId; 4]) {
        let device = Arc::new(Device::new(DeviceFamily::Generic));
        let mut b = ClusterTemplateBuilder::new(device, 0, "D");
        let s = b.tile_wire("S").unwrap();
        let x = b.tile_wire("X").unwrap();
        let y = b.tile_wire("Y").unwrap();
        let t = b.tile_wire("T").unwrap();
        b.connect(s, x, ConnectionKind::Pip).unwrap();
        b.connect(s, y, ConnectionKind::Pip).unwrap();
        b.connect(x, t, ConnectionKind::Pip).unwrap();
        b.connect(y, t, ConnectionKind::Pip).unwrap();
        (b.build().unwrap(), [s, x, y, t])
    }

    fn ctx<'a>(
        template: &'a ClusterTemplate,
        occupancy: &'a OccupancyTable,
        weights: &'a CostWeights,
    ) -> SearchContext<'a> {
        SearchContext {
            template,
            occupancy,
            weights,
            route_throughs: false,
        }
    }

    #[test]
    fn finds_terminal_and_clears_path_cost() {
        let (t, [s, x, _, dst]) = diamond();
        let occ = OccupancyTable::new();
        let weights = CostWeights::default();
        let mut forest = RouteForest::new();
        forest.add_root(s, 1);
        let mut sinks = Vec::new();
        let terminals = Terminals::from([(dst, None)]);
        let r = route_to_terminals(
            &ctx(&t, &occ, &weights),
            &mut forest,
            &mut sinks,
            &terminals,
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(r.wire, dst);
        // ties resolve to the first enqueued neighbour
        assert_eq!(forest.path_to(r.node), vec![s, x, dst]);
        assert!(forest.iter().all(|(_, n)| n.cost == 0));
        assert_eq!(forest.len(), 3);
    }

    #[test]
    fn avoids_occupied_wire() {
        let (t, [s, x, y, dst]) = diamond();
        let mut occ = OccupancyTable::new();
        occ.claim(&[x]);
        let weights = CostWeights::default();
        let mut forest = RouteForest::new();
        forest.add_root(s, 1);
        let mut sinks = Vec::new();
        let r = route_to_terminals(
            &ctx(&t, &occ, &weights),
            &mut forest,
            &mut sinks,
            &Terminals::from([(dst, None)]),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(forest.path_to(r.node), vec![s, y, dst]);
    }

    #[test]
    fn invalidated_wire_is_avoided_for_one_search() {
        let (t, [s, x, y, dst]) = diamond();
        let occ = OccupancyTable::new();
        let weights = CostWeights::default();
        let mut forest = RouteForest::new();
        forest.add_root(s, 1);
        let mut sinks = Vec::new();
        let r = route_to_terminals(
            &ctx(&t, &occ, &weights),
            &mut forest,
            &mut sinks,
            &Terminals::from([(dst, None)]),
            &HashSet::from([x]),
        )
        .unwrap();
        assert_eq!(forest.path_to(r.node), vec![s, y, dst]);
    }

    #[test]
    fn exhausted_search_prunes_speculative_branches() {
        let (t, [s, _, _, _]) = diamond();
        let occ = OccupancyTable::new();
        let weights = CostWeights::default();
        let mut forest = RouteForest::new();
        forest.add_root(s, 1);
        let mut sinks = Vec::new();
        let missing = WireId::from_raw(99);
        let r = route_to_terminals(
            &ctx(&t, &occ, &weights),
            &mut forest,
            &mut sinks,
            &Terminals::from([(missing, None)]),
            &HashSet::new(),
        );
        assert!(r.is_none());
        assert!(sinks.is_empty());
        assert_eq!(forest.wires(), vec![s]);
    }

    #[test]
    fn second_search_reuses_first_path() {
        let (t, [s, x, _, dst]) = diamond();
        let occ = OccupancyTable::new();
        let weights = CostWeights::default();
        let mut forest = RouteForest::new();
        forest.add_root(s, 1);
        let mut sinks = Vec::new();
        let c = ctx(&t, &occ, &weights);
        route_to_terminals(
            &c,
            &mut forest,
            &mut sinks,
            &Terminals::from([(x, None)]),
            &HashSet::new(),
        )
        .unwrap();
        let r = route_to_terminals(
            &c,
            &mut forest,
            &mut sinks,
            &Terminals::from([(dst, None)]),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(forest.path_to(r.node), vec![s, x, dst]);
        assert_eq!(forest.wires(), vec![s, x, dst]);
    }
}
