//! Net pin classification.
//!
//! Before every routing call each net touching the cluster is sorted into the
//! pins the router has to reach: internal sinks, sinks that must leave the
//! cluster, direct-connection sinks and (in incremental mode) sinks whose cell
//! is not placed yet. Sources are resolved into one or more alternative sets
//! of legal starting wires and BEL pins.

use crate::design::PackDesign;
use crate::ids::{CellPinId, ClusterId, NetId};
use crate::netlist::{NetKind, OperatingMode};
use kestrel_common::{InternalError, KestrelResult};
use kestrel_device::{BelId, BelPinId, ClusterTemplate, LutSize, WireId};
use std::collections::{BTreeMap, BTreeSet};

/// The legal terminals of one net endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PinMappings {
    /// The cell pin this mapping belongs to. `None` for static sources.
    pub cell_pin: Option<CellPinId>,
    /// For sinks, whether the pin can be reached through general fabric and
    /// therefore through any cluster output. For sources, whether the
    /// mapping enters through general-fabric inputs.
    pub generally_driven: bool,
    /// Whether a dedicated direct connection reaches the pin.
    pub carry_chain: bool,
    /// Only valid for conditional routing.
    pub conditional: bool,
    /// Cluster boundary wires (inputs for sources, exits for sinks).
    pub edge_wires: Vec<WireId>,
    /// BEL pins inside the cluster.
    pub bel_pins: Vec<BelPinId>,
}

/// Where a net's source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetSource {
    /// Placed in this cluster on a single BEL pin.
    InCluster {
        /// The source cell pin.
        pin: CellPinId,
        /// Its BEL pin.
        bel_pin: BelPinId,
    },
    /// Placed in another cluster.
    Outside {
        /// The source cell pin.
        pin: CellPinId,
    },
    /// Not placed anywhere yet.
    Unplaced {
        /// The source cell pin.
        pin: CellPinId,
    },
    /// Tied off inside the cluster.
    Static(NetKind),
}

impl NetSource {
    /// The source cell pin, if the net has one.
    pub fn cell_pin(&self) -> Option<CellPinId> {
        match *self {
            NetSource::InCluster { pin, .. }
            | NetSource::Outside { pin }
            | NetSource::Unplaced { pin } => Some(pin),
            NetSource::Static(_) => None,
        }
    }
}

/// The classified pins of one net.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedNetPins {
    /// The net.
    pub net: NetId,
    /// Where the net is driven from.
    pub source: NetSource,
    /// Alternative source mappings, tried in order.
    pub source_mappings: Vec<PinMappings>,
    /// Sinks on cells placed in this cluster.
    pub internal_sinks: BTreeMap<CellPinId, PinMappings>,
    /// Whether at least one sink must be reached through a cluster output.
    pub must_route_external: bool,
    /// External sinks needing their own search (direct-connection sinks).
    pub external_sinks: BTreeMap<CellPinId, PinMappings>,
    /// Sinks on unplaced cells.
    pub conditional_sinks: BTreeMap<CellPinId, PinMappings>,
}

impl SortedNetPins {
    /// Returns `true` for VCC and GND nets.
    pub fn is_static(&self) -> bool {
        matches!(self.source, NetSource::Static(_))
    }
}

/// Classifies every net touching `cluster`.
///
/// Undriven signal nets are skipped. Without `incremental`, sinks on unplaced
/// cells are treated like sinks placed elsewhere.
pub fn classify_cluster(
    design: &PackDesign,
    cluster: ClusterId,
    incremental: bool,
) -> KestrelResult<BTreeMap<NetId, SortedNetPins>> {
    let mut out = BTreeMap::new();
    for net in design.nets_of_cluster(cluster) {
        if let Some(pins) = classify_net(design, cluster, net, incremental)? {
            out.insert(net, pins);
        }
    }
    Ok(out)
}

fn classify_net(
    design: &PackDesign,
    cluster: ClusterId,
    net: NetId,
    incremental: bool,
) -> KestrelResult<Option<SortedNetPins>> {
    let netlist = design.netlist();
    let n = netlist.net(net);
    let template = design.template(cluster);

    let mut internal_sinks = BTreeMap::new();
    for &sink in &n.sinks {
        if design.is_in_cluster(netlist.pin(sink).cell, cluster) {
            internal_sinks.insert(
                sink,
                PinMappings {
                    cell_pin: Some(sink),
                    bel_pins: design.possible_bel_pins(sink),
                    ..PinMappings::default()
                },
            );
        }
    }

    let source = if n.kind.is_static() {
        NetSource::Static(n.kind)
    } else {
        let Some(pin) = n.source else {
            return Ok(None);
        };
        let cell = netlist.pin(pin).cell;
        if design.is_in_cluster(cell, cluster) {
            let bel_pins = design.possible_bel_pins(pin);
            let [bel_pin] = bel_pins.as_slice() else {
                return Err(InternalError::new(format!(
                    "source pin {pin} of net {net} maps to {} BEL pins, expected one",
                    bel_pins.len()
                )));
            };
            NetSource::InCluster {
                pin,
                bel_pin: *bel_pin,
            }
        } else if design.location(cell).is_some() {
            NetSource::Outside { pin }
        } else {
            NetSource::Unplaced { pin }
        }
    };

    let source_mappings = match source {
        NetSource::InCluster { pin, bel_pin } => vec![PinMappings {
            cell_pin: Some(pin),
            bel_pins: vec![bel_pin],
            ..PinMappings::default()
        }],
        NetSource::Outside { pin } | NetSource::Unplaced { pin } => {
            external_source_mappings(design, template, pin, &internal_sinks)
        }
        NetSource::Static(kind) => vec![static_source_mapping(
            design,
            cluster,
            template,
            kind,
            &internal_sinks,
        )],
    };

    let mut pins = SortedNetPins {
        net,
        source,
        source_mappings,
        internal_sinks,
        must_route_external: false,
        external_sinks: BTreeMap::new(),
        conditional_sinks: BTreeMap::new(),
    };

    if let NetSource::InCluster { bel_pin, .. } = source {
        for &sink in &n.sinks {
            if pins.internal_sinks.contains_key(&sink) {
                continue;
            }
            let mapping = external_sink_mapping(design, template, bel_pin, sink);
            let unplaced = design.location(netlist.pin(sink).cell).is_none();
            if incremental && unplaced {
                pins.conditional_sinks.insert(
                    sink,
                    PinMappings {
                        conditional: true,
                        ..mapping
                    },
                );
            } else if mapping.generally_driven && !mapping.carry_chain {
                pins.must_route_external = true;
            } else {
                pins.external_sinks.insert(sink, mapping);
            }
        }
    }

    Ok(Some(pins))
}

/// Entry alternatives for a source outside the cluster: general-fabric
/// inputs first, then one alternative per matching direct connection.
fn external_source_mappings(
    design: &PackDesign,
    template: &ClusterTemplate,
    pin: CellPinId,
    internal_sinks: &BTreeMap<CellPinId, PinMappings>,
) -> Vec<PinMappings> {
    let device = design.device();
    let candidates = design.possible_pin_templates(pin);
    let site = design.site_index(design.netlist().pin(pin).cell);

    let general_inputs: Vec<WireId> = internal_sinks
        .values()
        .flat_map(|m| m.bel_pins.iter())
        .flat_map(|&bp| template.inputs_of_sink(bp).iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let drives_general = candidates
        .iter()
        .any(|&r| device.pin_template(r).is_some_and(|t| t.drives_general_fabric));

    let mut entrances = BTreeSet::new();
    for dc in template.direct_sources() {
        if !candidates.contains(&dc.end_pin) {
            continue;
        }
        if site.is_some_and(|s| s != dc.end_site_index) {
            continue;
        }
        let general = device
            .pin_template(dc.end_pin)
            .is_some_and(|t| t.drives_general_fabric);
        entrances.insert((dc.cluster_wire, general));
    }

    let mut out = Vec::new();
    if drives_general && !general_inputs.is_empty() {
        out.push(PinMappings {
            cell_pin: Some(pin),
            generally_driven: true,
            edge_wires: general_inputs.clone(),
            ..PinMappings::default()
        });
    }
    for (wire, general) in entrances {
        let mut edge_wires = vec![wire];
        if general {
            edge_wires.extend(general_inputs.iter().copied());
            edge_wires.sort();
            edge_wires.dedup();
        }
        out.push(PinMappings {
            cell_pin: Some(pin),
            generally_driven: general,
            carry_chain: true,
            edge_wires,
            ..PinMappings::default()
        });
    }
    out
}

/// Tie-off alternative for a VCC or GND net.
fn static_source_mapping(
    design: &PackDesign,
    cluster: ClusterId,
    template: &ClusterTemplate,
    kind: NetKind,
    internal_sinks: &BTreeMap<CellPinId, PinMappings>,
) -> PinMappings {
    let edge_wires: BTreeSet<WireId> = internal_sinks
        .values()
        .flat_map(|m| m.bel_pins.iter())
        .filter(|&&bp| template.bel_pin(bp).driven_by_general_fabric)
        .flat_map(|&bp| template.inputs_of_sink(bp).iter().copied())
        .collect();
    let sources = match kind {
        NetKind::Gnd => template.gnd_sources(),
        _ => template.vcc_sources(),
    };
    let bel_pins = sources
        .iter()
        .copied()
        .filter(|&bp| !is_bel_taken(design, cluster, template.bel_pin(bp).bel))
        .collect();
    PinMappings {
        generally_driven: !edge_wires.is_empty(),
        edge_wires: edge_wires.into_iter().collect(),
        bel_pins,
        ..PinMappings::default()
    }
}

/// Exit terminals for a sink outside the cluster driven from `source`.
fn external_sink_mapping(
    design: &PackDesign,
    template: &ClusterTemplate,
    source: BelPinId,
    sink: CellPinId,
) -> PinMappings {
    let device = design.device();
    let site = design.site_index(design.netlist().pin(sink).cell);
    let mut mapping = PinMappings {
        cell_pin: Some(sink),
        ..PinMappings::default()
    };
    let mut exits = BTreeSet::new();
    for r in design.possible_pin_templates(sink) {
        if device
            .pin_template(r)
            .is_some_and(|t| t.driven_by_general_fabric)
        {
            mapping.generally_driven = true;
        }
        for dc in template.direct_sinks() {
            if dc.cluster_pin == source
                && dc.end_pin == r
                && site.map_or(true, |s| s == dc.end_site_index)
            {
                exits.insert(dc.cluster_wire);
                mapping.carry_chain = true;
            }
        }
    }
    if mapping.generally_driven {
        exits.extend(template.outputs().iter().copied());
    }
    mapping.edge_wires = exits.into_iter().collect();
    mapping
}

/// Occupancy test for tie-off and conditional candidates.
///
/// Besides plain occupancy, a 5-input LUT BEL is unavailable while its
/// 6-input partner holds a cell using six inputs or a non-LUT mode, and a
/// 6-input LUT BEL is unavailable while its 5-input partner holds a non-LUT
/// cell.
pub fn is_bel_taken(design: &PackDesign, cluster: ClusterId, bel: BelId) -> bool {
    if design.is_bel_occupied(cluster, bel) {
        return true;
    }
    let template = design.template(cluster);
    let Some(slot) = template.lut_slot(bel) else {
        return false;
    };
    let Some(partner) = design.cell_at(cluster, slot.partner) else {
        return false;
    };
    let netlist = design.netlist();
    let non_lut = netlist.cell(partner).mode != OperatingMode::Lut;
    match slot.size {
        LutSize::Five => non_lut || netlist.lut_inputs(partner).unwrap_or(0) > 5,
        LutSize::Six => non_lut,
    }
}

/// Returns `true` if `pin` is the `A6` input of a 6-input LUT whose 5-input
/// partner is occupied; the partner then owns that input.
pub fn is_shared_a6(design: &PackDesign, cluster: ClusterId, pin: BelPinId) -> bool {
    let template = design.template(cluster);
    let bel_pin = template.bel_pin(pin);
    if template.bel_pin_name(pin) != "A6" {
        return false;
    }
    match template.lut_slot(bel_pin.bel) {
        Some(slot) if slot.size == LutSize::Six => design.is_bel_occupied(cluster, slot.partner),
        _ => false,
    }
}
