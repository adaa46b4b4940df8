//! Conditional placement resolution.
//!
//! When negotiation cannot finish cleanly because a net touches a cell that
//! is not placed yet, this module works out where that cell could go. The
//! candidate BEL pins replace the affected mappings so that a second pass can
//! route to them, and the BELs are reported to the packer as conditionals.

use crate::design::PackDesign;
use crate::ids::{CellId, CellPinId, ClusterId, NetId};
use crate::routing::classify::{NetSource, PinMappings, SortedNetPins};
use kestrel_device::{BelId, BelPinId, ClusterConnection, ClusterTemplate};
use std::collections::{BTreeMap, BTreeSet};

/// Candidate BELs per unplaced cell.
pub type Conditionals = BTreeMap<CellId, BTreeSet<BelId>>;

/// How to treat a cell left with no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strictness {
    /// Fail the whole resolution.
    Strict,
    /// Drop the cell and keep going.
    Lenient,
}

/// Which endpoint of a net a candidate set applies to.
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Source(CellPinId),
    Sink(CellPinId),
}

struct Candidate {
    net: NetId,
    endpoint: Endpoint,
    cell: CellId,
    pins: BTreeSet<BelPinId>,
}

/// Computes conditionals for `nets` and rewrites their mappings in
/// `classification` to the candidate BEL pins.
///
/// Returns `None` when a strict resolution fails. Constraints on the same
/// cell, from several pins or several nets, are intersected.
pub(crate) fn build_conditionals(
    design: &PackDesign,
    cluster: ClusterId,
    nets: &BTreeSet<NetId>,
    classification: &mut BTreeMap<NetId, SortedNetPins>,
    strictness: Strictness,
) -> Option<Conditionals> {
    let template = design.template(cluster);
    let mut candidates = Vec::new();
    for &net in nets {
        let Some(pins) = classification.get(&net) else {
            continue;
        };
        match pins.source {
            NetSource::Unplaced { pin } => {
                let cell = design.netlist().pin(pin).cell;
                let found = source_candidates(design, cluster, template, pin, pins);
                candidates.push(Candidate {
                    net,
                    endpoint: Endpoint::Source(pin),
                    cell,
                    pins: found,
                });
            }
            NetSource::InCluster { bel_pin, .. } => {
                for &sink in pins.conditional_sinks.keys() {
                    let cell = design.netlist().pin(sink).cell;
                    let found = sink_candidates(design, cluster, template, bel_pin, sink);
                    candidates.push(Candidate {
                        net,
                        endpoint: Endpoint::Sink(sink),
                        cell,
                        pins: found,
                    });
                }
            }
            NetSource::Outside { .. } | NetSource::Static(_) => {}
        }
    }

    let mut conditionals = Conditionals::new();
    let mut dropped = BTreeSet::new();
    for c in &candidates {
        if dropped.contains(&c.cell) {
            continue;
        }
        let bels: BTreeSet<BelId> = c.pins.iter().map(|&p| template.bel_pin(p).bel).collect();
        let merged = match conditionals.get(&c.cell) {
            Some(existing) => existing.intersection(&bels).copied().collect(),
            None => bels,
        };
        if merged.is_empty() {
            match strictness {
                Strictness::Strict => return None,
                Strictness::Lenient => {
                    conditionals.remove(&c.cell);
                    dropped.insert(c.cell);
                    continue;
                }
            }
        }
        conditionals.insert(c.cell, merged);
    }

    for c in candidates {
        let Some(bels) = conditionals.get(&c.cell) else {
            continue;
        };
        let bel_pins: Vec<BelPinId> = c
            .pins
            .into_iter()
            .filter(|&p| bels.contains(&template.bel_pin(p).bel))
            .collect();
        let Some(pins) = classification.get_mut(&c.net) else {
            continue;
        };
        let mapping = PinMappings {
            cell_pin: Some(match c.endpoint {
                Endpoint::Source(pin) | Endpoint::Sink(pin) => pin,
            }),
            conditional: true,
            bel_pins,
            ..PinMappings::default()
        };
        match c.endpoint {
            Endpoint::Source(_) => pins.source_mappings = vec![mapping],
            Endpoint::Sink(sink) => {
                pins.conditional_sinks.insert(sink, mapping);
            }
        }
    }

    Some(conditionals)
}

/// Source BEL pins inside one site that reach every internal sink.
fn source_candidates(
    design: &PackDesign,
    cluster: ClusterId,
    template: &ClusterTemplate,
    source: CellPinId,
    pins: &SortedNetPins,
) -> BTreeSet<BelPinId> {
    let mut result: Option<BTreeSet<BelPinId>> = None;
    for sink in pins.internal_sinks.values() {
        let reachable: BTreeSet<BelPinId> = sink
            .bel_pins
            .iter()
            .flat_map(|&bp| template.sources_of_sink(bp).iter())
            .filter(|cc| usable(design, cluster, template, source, cc))
            .map(|cc| cc.pin)
            .collect();
        result = Some(match result {
            Some(acc) => acc.intersection(&reachable).copied().collect(),
            None => reachable,
        });
    }
    result.unwrap_or_default()
}

/// Sink BEL pins inside the source's site that `sink` could be placed on.
fn sink_candidates(
    design: &PackDesign,
    cluster: ClusterId,
    template: &ClusterTemplate,
    source: BelPinId,
    sink: CellPinId,
) -> BTreeSet<BelPinId> {
    template
        .sinks_of_source(source)
        .iter()
        .filter(|cc| usable(design, cluster, template, sink, cc))
        .map(|cc| cc.pin)
        .collect()
}

/// A within-site pin on a free BEL that the cell of `pin` may anchor on,
/// under a matching pin name.
fn usable(
    design: &PackDesign,
    cluster: ClusterId,
    template: &ClusterTemplate,
    pin: CellPinId,
    cc: &ClusterConnection,
) -> bool {
    if !cc.within_site {
        return false;
    }
    let bel = template.bel_pin(cc.pin).bel;
    if design.is_bel_occupied(cluster, bel) {
        return false;
    }
    let netlist = design.netlist();
    let bel_type = template.bel(bel).bel_type;
    if !netlist.lib_of(netlist.pin(pin).cell).can_anchor(bel_type) {
        return false;
    }
    netlist
        .possible_pin_names(pin, bel_type)
        .contains(&template.bel_pin(cc.pin).name)
}
