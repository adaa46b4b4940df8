//! Routing tables: every multiplexer configuration of a pin group, traced
//! once per template.
//!
//! A multiplexer is a wire inside the group fed by more than one PIP. One
//! row fixes the selected input of every multiplexer and records, for each
//! sink BEL pin, the single source pin or cluster entry feeding it, and for
//! each source BEL pin, everything it reaches.

use kestrel_common::{InternalError, KestrelResult};
use kestrel_device::{
    BelPinId, ClusterTemplate, Connection, ConnectionKind, PinDirection, PinGroup, PinGroupId,
    WireId,
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// What one source BEL pin reaches in a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePinEntry {
    /// The pin reaches a cluster output.
    pub drives_general_fabric: bool,
    /// Sink BEL pins reached, in discovery order.
    pub driven_sinks: Vec<BelPinId>,
    /// Cluster outputs and carry-chain exits reached.
    pub driven_cluster_pins: Vec<WireId>,
}

/// What feeds one sink BEL pin in a row.
///
/// Exactly one of `source_pin` and `source_cluster_pin` is set in a well
/// formed table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkPinEntry {
    /// Fed from a general-fabric cluster input.
    pub driven_by_general_fabric: bool,
    /// The cluster input or carry-chain entry feeding the pin.
    pub source_cluster_pin: Option<WireId>,
    /// The BEL pin feeding the pin.
    pub source_pin: Option<BelPinId>,
}

/// One multiplexer configuration of a pin group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// Selected input of each multiplexer.
    pub selection: BTreeMap<WireId, WireId>,
    /// Reach of every source pin of the group.
    pub source_pins: BTreeMap<BelPinId, SourcePinEntry>,
    /// Feed of every reachable sink pin of the group.
    pub sink_pins: BTreeMap<BelPinId, SinkPinEntry>,
}

/// All rows of one pin group.
///
/// Rows are ordered lexicographically by multiplexer option, multiplexers
/// by wire ID, the last multiplexer varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    /// The pin group.
    pub group: PinGroupId,
    /// The multiplexers and their options, both sorted by wire ID.
    pub muxes: BTreeMap<WireId, Vec<WireId>>,
    /// The rows.
    pub rows: Vec<Row>,
}

impl RoutingTable {
    /// Enumerates and traces every multiplexer configuration of `group`.
    pub fn build(template: &ClusterTemplate, group: &PinGroup) -> KestrelResult<Self> {
        let muxes = find_muxes(template, group);
        let mut rows = Vec::new();
        for selection in configurations(&muxes) {
            rows.push(build_row(template, group, selection)?);
        }
        Ok(Self {
            group: group.id,
            muxes,
            rows,
        })
    }
}

/// Routing tables of every pin group of one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTables {
    tables: Vec<RoutingTable>,
}

impl TemplateTables {
    /// Builds the table of every pin group.
    pub fn build(template: &ClusterTemplate) -> KestrelResult<Self> {
        let tables = template
            .pin_groups()
            .iter()
            .map(|group| RoutingTable::build(template, group))
            .collect::<KestrelResult<Vec<_>>>()?;
        Ok(Self { tables })
    }

    /// The table of `group`.
    pub fn table(&self, group: PinGroupId) -> &RoutingTable {
        &self.tables[group.as_raw() as usize]
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` for a template without pin groups.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total rows over all tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

/// Walks backwards from the group's sink pins and exits, collecting every
/// wire fed by two or more PIPs.
fn find_muxes(template: &ClusterTemplate, group: &PinGroup) -> BTreeMap<WireId, Vec<WireId>> {
    let mut options: BTreeMap<WireId, BTreeSet<WireId>> = BTreeMap::new();
    let mut queue: VecDeque<WireId> = group
        .sink_pins
        .iter()
        .map(|&p| template.bel_pin(p).wire)
        .chain(group.sink_wires.iter().copied())
        .collect();
    let mut visited = HashSet::new();

    while let Some(wire) = queue.pop_front() {
        if !visited.insert(wire) {
            continue;
        }
        for c in template.reverse_connections(wire) {
            if c.is_route_through() {
                continue;
            }
            if c.kind == ConnectionKind::Pip {
                options.entry(wire).or_default().insert(c.wire);
            }
            if !template.is_input(c.wire) {
                queue.push_back(c.wire);
            }
        }
    }

    options
        .into_iter()
        .filter(|(_, inputs)| inputs.len() > 1)
        .map(|(mux, inputs)| (mux, inputs.into_iter().collect()))
        .collect()
}

/// Odometer over the multiplexer options. No multiplexers gives one empty
/// configuration.
fn configurations(muxes: &BTreeMap<WireId, Vec<WireId>>) -> Vec<BTreeMap<WireId, WireId>> {
    let entries: Vec<(WireId, &Vec<WireId>)> = muxes.iter().map(|(&m, o)| (m, o)).collect();
    let mut digits = vec![0usize; entries.len()];
    let mut out = Vec::new();
    loop {
        out.push(
            entries
                .iter()
                .zip(&digits)
                .map(|((mux, opts), &d)| (*mux, opts[d]))
                .collect(),
        );
        let mut i = entries.len();
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            digits[i] += 1;
            if digits[i] < entries[i].1.len() {
                break;
            }
            digits[i] = 0;
        }
    }
}

fn build_row(
    template: &ClusterTemplate,
    group: &PinGroup,
    selection: BTreeMap<WireId, WireId>,
) -> KestrelResult<Row> {
    let mut row = Row {
        selection,
        ..Row::default()
    };
    trace_source_pins(template, group, &mut row);
    for &entry in &group.source_wires {
        trace_entry(template, group, &mut row, entry, true)?;
    }
    for &entry in &group.carry_chain_sources {
        trace_entry(template, group, &mut row, entry, false)?;
    }
    Ok(row)
}

/// Whether the walk may cross `c` from `from` under the row's multiplexer
/// selection. Site pins are never multiplexer inputs.
fn passes(row: &Row, from: WireId, c: &Connection) -> bool {
    c.kind == ConnectionKind::SitePin
        || row.selection.get(&c.wire).map_or(true, |&selected| selected == from)
}

fn trace_source_pins(template: &ClusterTemplate, group: &PinGroup, row: &mut Row) {
    for &source in &group.source_pins {
        let mut entry = SourcePinEntry::default();
        let mut queue = VecDeque::from([template.bel_pin(source).wire]);
        let mut visited = HashSet::new();

        while let Some(wire) = queue.pop_front() {
            if !visited.insert(wire) {
                continue;
            }
            for c in template.connections(wire) {
                if c.is_route_through() {
                    continue;
                }
                if group.has_sink_wire(c.wire) {
                    entry.driven_cluster_pins.push(c.wire);
                    entry.drives_general_fabric = true;
                } else if group.has_carry_chain_sink(c.wire) {
                    entry.driven_cluster_pins.push(c.wire);
                } else if passes(row, wire, c) {
                    queue.push_back(c.wire);
                }
            }
            for &sink in template.terminals(wire) {
                entry.driven_sinks.push(sink);
                let sink_entry = row.sink_pins.entry(sink).or_default();
                // a plain output wins over a bidirectional pin
                let replace = match sink_entry.source_pin {
                    None => true,
                    Some(prev) => template.bel_pin(prev).direction != PinDirection::Out,
                };
                if replace {
                    sink_entry.source_pin = Some(source);
                }
            }
        }
        row.source_pins.insert(source, entry);
    }
}

/// Traces from a cluster input (`general`) or a carry-chain entry.
fn trace_entry(
    template: &ClusterTemplate,
    group: &PinGroup,
    row: &mut Row,
    entry: WireId,
    general: bool,
) -> KestrelResult<()> {
    let mut queue = VecDeque::from([entry]);
    let mut visited = HashSet::new();

    while let Some(wire) = queue.pop_front() {
        if !visited.insert(wire) {
            continue;
        }
        for c in template.connections(wire) {
            if c.is_route_through() {
                continue;
            }
            if group.has_sink_wire(c.wire) || group.has_carry_chain_sink(c.wire) {
                return Err(InternalError::new(format!(
                    "cluster entry {} of template {} runs straight to exit {}",
                    template.wire_name(entry),
                    template.name(),
                    template.wire_name(c.wire)
                )));
            }
            if passes(row, wire, c) {
                queue.push_back(c.wire);
            }
        }
        for &sink in template.terminals(wire) {
            let sink_entry = row.sink_pins.entry(sink).or_default();
            if sink_entry.source_pin.is_some() || sink_entry.source_cluster_pin.is_some() {
                return Err(InternalError::new(format!(
                    "BEL pin {} of template {} is fed twice in one routing table row",
                    template.bel_pin_name(sink),
                    template.name()
                )));
            }
            sink_entry.source_cluster_pin = Some(entry);
            sink_entry.driven_by_general_fabric = general;
        }
    }
    Ok(())
}
