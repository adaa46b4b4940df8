//! Pin groups: BEL pins whose internal routing is shared.
//!
//! Every source pin floods forward and every sink pin floods backward through
//! the template graph until it meets BEL pins or cluster boundary wires.
//! Pins and boundary wires touched by overlapping floods end up in one
//! group, so the multiplexers inside a group never affect another group.

use crate::ids::{BelPinId, PinGroupId, WireId};
use crate::template::ClusterTemplate;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// A set of BEL pins and boundary wires with shared internal routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinGroup {
    /// Group ID.
    pub id: PinGroupId,
    /// Source BEL pins in the group.
    pub source_pins: Vec<BelPinId>,
    /// Sink BEL pins in the group.
    pub sink_pins: Vec<BelPinId>,
    /// Cluster inputs feeding the group.
    pub source_wires: Vec<WireId>,
    /// Cluster outputs driven by the group.
    pub sink_wires: Vec<WireId>,
    /// Direct-connection exits driven by the group's source pins.
    pub carry_chain_sinks: Vec<WireId>,
    /// Direct-connection entries feeding the group's sink pins.
    pub carry_chain_sources: Vec<WireId>,
}

impl PinGroup {
    fn empty(id: PinGroupId) -> Self {
        Self {
            id,
            source_pins: Vec::new(),
            sink_pins: Vec::new(),
            source_wires: Vec::new(),
            sink_wires: Vec::new(),
            carry_chain_sinks: Vec::new(),
            carry_chain_sources: Vec::new(),
        }
    }

    /// Returns `true` if `pin` is one of the group's source pins.
    pub fn has_source_pin(&self, pin: BelPinId) -> bool {
        self.source_pins.binary_search(&pin).is_ok()
    }

    /// Returns `true` if `wire` is one of the group's cluster outputs.
    pub fn has_sink_wire(&self, wire: WireId) -> bool {
        self.sink_wires.contains(&wire)
    }

    /// Returns `true` if `wire` is one of the group's carry-chain exits.
    pub fn has_carry_chain_sink(&self, wire: WireId) -> bool {
        self.carry_chain_sinks.contains(&wire)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WireRole {
    Sink,
    Source,
    CarrySink,
    CarrySource,
}

/// Partitions the template's BEL pins into pin groups.
///
/// Groups are numbered in ascending order of their smallest BEL pin (or
/// wire, for groups without pins), so numbering is stable across builds.
pub(crate) fn build_pin_groups(
    template: &ClusterTemplate,
) -> (Vec<PinGroup>, HashMap<BelPinId, PinGroupId>) {
    let pin_count = template.bel_pins().count();
    let node_count = pin_count + template.wire_count();
    let wire_node = |w: WireId| pin_count + w.index();

    let mut sets = UnionFind::<usize>::new(node_count);
    let mut member = vec![false; node_count];
    let mut wire_roles: HashMap<WireId, Vec<WireRole>> = HashMap::new();

    for (pin_id, pin) in template.bel_pins() {
        let pin_node = pin_id.index();
        member[pin_node] = true;

        if pin.direction.is_source() {
            for (reached_pin, reached_wire) in flood(template, pin.wire, true) {
                if let Some(p) = reached_pin {
                    sets.union(pin_node, p.index());
                }
                if let Some(w) = reached_wire {
                    sets.union(pin_node, wire_node(w));
                    member[wire_node(w)] = true;
                    mark_wire(&mut wire_roles, w, WireRole::Sink);
                }
            }
            for dc in template.direct_sinks() {
                if dc.cluster_pin == pin_id {
                    sets.union(pin_node, wire_node(dc.cluster_wire));
                    member[wire_node(dc.cluster_wire)] = true;
                    mark_wire(&mut wire_roles, dc.cluster_wire, WireRole::CarrySink);
                }
            }
        }

        if pin.direction.is_sink() {
            for (reached_pin, reached_wire) in flood(template, pin.wire, false) {
                if let Some(p) = reached_pin {
                    sets.union(pin_node, p.index());
                }
                if let Some(w) = reached_wire {
                    sets.union(pin_node, wire_node(w));
                    member[wire_node(w)] = true;
                    mark_wire(&mut wire_roles, w, WireRole::Source);
                }
            }
            for dc in template.direct_sources() {
                if dc.cluster_pin == pin_id {
                    sets.union(pin_node, wire_node(dc.cluster_wire));
                    member[wire_node(dc.cluster_wire)] = true;
                    mark_wire(&mut wire_roles, dc.cluster_wire, WireRole::CarrySource);
                }
            }
        }
    }

    // Nodes are visited in index order, so the first node seen for each root
    // is that group's smallest member.
    let mut group_of_root: BTreeMap<usize, PinGroupId> = BTreeMap::new();
    let mut groups: Vec<PinGroup> = Vec::new();
    let mut pin_group_of = HashMap::new();
    for node in 0..node_count {
        if !member[node] {
            continue;
        }
        let root = sets.find(node);
        let id = *group_of_root.entry(root).or_insert_with(|| {
            let id = PinGroupId::from_raw(groups.len() as u32);
            groups.push(PinGroup::empty(id));
            id
        });
        let group = &mut groups[id.index()];

        if node < pin_count {
            let pin_id = BelPinId::from_raw(node as u32);
            let direction = template.bel_pin(pin_id).direction;
            if direction.is_source() {
                group.source_pins.push(pin_id);
            }
            if direction.is_sink() {
                group.sink_pins.push(pin_id);
            }
            pin_group_of.insert(pin_id, id);
        } else {
            let wire = WireId::from_raw((node - pin_count) as u32);
            for role in wire_roles.get(&wire).into_iter().flatten() {
                match role {
                    WireRole::Sink => group.sink_wires.push(wire),
                    WireRole::Source => group.source_wires.push(wire),
                    WireRole::CarrySink => group.carry_chain_sinks.push(wire),
                    WireRole::CarrySource => group.carry_chain_sources.push(wire),
                }
            }
        }
    }

    (groups, pin_group_of)
}

fn mark_wire(roles: &mut HashMap<WireId, Vec<WireRole>>, wire: WireId, role: WireRole) {
    let entry = roles.entry(wire).or_default();
    if !entry.contains(&role) {
        entry.push(role);
    }
}

/// Floods from `start` and yields every BEL pin and boundary wire met.
///
/// Forward floods stop at sink pins and cluster outputs; backward floods stop
/// at source pins and cluster inputs.
fn flood(
    template: &ClusterTemplate,
    start: WireId,
    forward: bool,
) -> Vec<(Option<BelPinId>, Option<WireId>)> {
    let is_edge = |w: WireId| {
        if forward {
            template.is_output(w)
        } else {
            template.is_input(w)
        }
    };

    let mut met = Vec::new();
    let mut queued = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    if is_edge(start) {
        met.push((None, Some(start)));
    }
    while let Some(wire) = queue.pop_front() {
        let pins = if forward {
            template.terminals(wire)
        } else {
            template.drivers(wire)
        };
        met.extend(pins.iter().map(|&p| (Some(p), None)));
        if is_edge(wire) {
            continue;
        }
        let conns = if forward {
            template.connections(wire)
        } else {
            template.reverse_connections(wire)
        };
        for c in conns {
            if is_edge(c.wire) {
                met.push((None, Some(c.wire)));
            }
            if queued.insert(c.wire) {
                queue.push_back(c.wire);
            }
        }
    }
    met
}
