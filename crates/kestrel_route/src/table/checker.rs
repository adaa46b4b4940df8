//! Routability checking by routing-table lookup.
//!
//! Instead of searching, the checker keeps a summary of every net touching
//! the cluster (where its source is, which of its sinks must leave the
//! cluster or ride a carry chain) and, for each pin group touched by a
//! change, scans the group's rows for one multiplexer configuration that
//! serves every placed pin. All state lives in [`StackedMap`]s so the packer
//! can back out of a placement with [`RoutabilityChecker::rollback`].

use crate::checker::{Routability, RoutabilityChecker, RoutabilityResult};
use crate::design::PackDesign;
use crate::ids::{CellId, CellPinId, ClusterId, NetId};
use crate::netlist::NetKind;
use crate::routing::classify::is_bel_taken;
use crate::routing::Conditionals;
use crate::stacked_map::StackedMap;
use crate::table::routing_table::{Row, RoutingTable, SinkPinEntry, SourcePinEntry};
use crate::table::TemplateTables;
use kestrel_common::{InternalError, KestrelResult};
use kestrel_device::{BelId, BelPinId, ClusterTemplate, PinGroupId, PinTemplateRef, WireId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

/// Where a net is driven from, as far as this cluster can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Source {
    /// Placed in this cluster or in another one.
    placed: bool,
    /// Tie-off kind of a static net.
    constant: Option<NetKind>,
    drives_general_fabric: bool,
    /// The BEL pin, when placed in this cluster.
    bel_pin: Option<BelPinId>,
    /// Carry-chain entries the source can arrive on.
    source_wires: BTreeSet<WireId>,
    cell_pin: Option<CellPinId>,
}

/// What a net's sinks demand of its source inside this cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Sinks {
    in_cluster: Vec<CellPinId>,
    /// A sink outside the cluster is reachable only through general fabric.
    must_leave: bool,
    /// Unplaced sinks reachable through general fabric.
    conditional_must_leave: BTreeSet<CellPinId>,
    /// Unplaced sinks reachable neither through general fabric nor a carry
    /// chain of this cluster.
    conditionals: BTreeSet<CellPinId>,
    required_carry_chains: BTreeMap<CellPinId, BTreeSet<WireId>>,
    optional_carry_chains: BTreeMap<CellPinId, BTreeSet<WireId>>,
}

/// A resource two nets cannot share within one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Claim {
    Pin(BelPinId),
    Wire(WireId),
}

/// Verdict of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RowStatus {
    routability: Routability,
    conditionals: Conditionals,
}

impl RowStatus {
    fn new(routability: Routability) -> Self {
        Self {
            routability,
            conditionals: Conditionals::new(),
        }
    }

    /// Narrows the row's conditionals; a cell left without candidates makes
    /// the row infeasible.
    fn merge(&mut self, cell: CellId, bels: BTreeSet<BelId>) {
        match self.conditionals.get_mut(&cell) {
            Some(prev) => {
                prev.retain(|b| bels.contains(b));
                if prev.is_empty() {
                    self.routability = Routability::Infeasible;
                }
            }
            None => {
                self.conditionals.insert(cell, bels);
            }
        }
    }
}

/// Verdict of one pin group, with the verdicts of its rows so later checks
/// can skip rows already known to be infeasible.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupStatus {
    routability: Routability,
    conditionals: Conditionals,
    rows: Vec<RowStatus>,
}

struct SinkVerdict {
    routability: Routability,
    claim: Claim,
    conditional_source: Option<BelId>,
}

/// Table-driven [`RoutabilityChecker`] for one cluster.
///
/// Changed cells are expected to have just been placed in the cluster;
/// changed cells placed elsewhere are ignored.
#[derive(Debug, Clone)]
pub struct TableRoutabilityChecker {
    cluster: ClusterId,
    template: Arc<ClusterTemplate>,
    tables: Arc<TemplateTables>,
    bel_to_cell: StackedMap<BelPinId, CellPinId>,
    cell_to_bel: StackedMap<CellPinId, BelPinId>,
    sources: StackedMap<NetId, Source>,
    sinks: StackedMap<NetId, Sinks>,
    groups: StackedMap<PinGroupId, GroupStatus>,
}

impl TableRoutabilityChecker {
    /// Creates a checker for `cluster` using the tables of its template.
    pub fn new(design: &PackDesign, cluster: ClusterId, tables: Arc<TemplateTables>) -> Self {
        Self {
            cluster,
            template: Arc::clone(design.template(cluster)),
            tables,
            bel_to_cell: StackedMap::new(),
            cell_to_bel: StackedMap::new(),
            sources: StackedMap::new(),
            sinks: StackedMap::new(),
            groups: StackedMap::new(),
        }
    }

    /// The cluster being checked.
    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    /// Evaluates every row of `group` against the current state, without
    /// consulting or updating cached row verdicts.
    pub fn row_feasibility(
        &self,
        design: &PackDesign,
        group: PinGroupId,
    ) -> KestrelResult<Vec<Routability>> {
        let table = self.tables.table(group);
        table
            .rows
            .iter()
            .map(|row| Ok(self.check_row(design, table, row)?.routability))
            .collect()
    }

    fn init_new_nets(&mut self, design: &PackDesign, changed: &[CellId]) -> KestrelResult<()> {
        let netlist = design.netlist();
        for &cell in changed {
            for &pin in &netlist.cell(cell).pins {
                let Some(net) = netlist.pin(pin).net else {
                    continue;
                };
                if !self.sources.contains_key(&net) {
                    let source = self.init_source(design, net)?;
                    self.sources.insert(net, source);
                    self.sinks.insert(net, Sinks::default());
                }
            }
        }
        Ok(())
    }

    /// Summarizes the source of a net first seen by this cluster. A source
    /// in this cluster starts out like an unplaced one and is pinned down by
    /// [`Self::update_source_pin`].
    fn init_source(&self, design: &PackDesign, net: NetId) -> KestrelResult<Source> {
        let n = design.netlist().net(net);
        if n.kind.is_static() {
            return Ok(Source {
                constant: Some(n.kind),
                drives_general_fabric: true,
                ..Source::default()
            });
        }
        let Some(pin) = n.source else {
            return Ok(Source::default());
        };
        let cell = design.netlist().pin(pin).cell;
        let device = design.device();
        let candidates = design.possible_pin_templates(pin);
        let mut source = Source {
            cell_pin: Some(pin),
            ..Source::default()
        };

        match design.location(cell) {
            Some(loc) if loc.cluster != self.cluster => {
                let [end_pin] = candidates.as_slice() else {
                    return Err(InternalError::new(format!(
                        "source pin {pin} of net {net} maps to {} BEL pins, expected one",
                        candidates.len()
                    )));
                };
                let site = design.site_index(cell);
                source.placed = true;
                source.drives_general_fabric = device
                    .pin_template(*end_pin)
                    .is_some_and(|t| t.drives_general_fabric);
                source.source_wires = self
                    .template
                    .direct_sources()
                    .iter()
                    .filter(|dc| dc.end_pin == *end_pin && Some(dc.end_site_index) == site)
                    .map(|dc| dc.cluster_wire)
                    .collect();
            }
            _ => {
                source.drives_general_fabric = candidates
                    .iter()
                    .any(|&r| device.pin_template(r).is_some_and(|t| t.drives_general_fabric));
                source.source_wires = self
                    .template
                    .direct_sources()
                    .iter()
                    .filter(|dc| candidates.contains(&dc.end_pin))
                    .map(|dc| dc.cluster_wire)
                    .collect();
            }
        }
        Ok(source)
    }

    fn update_changed_nets(&mut self, design: &PackDesign, changed: &[CellId]) -> KestrelResult<()> {
        let netlist = design.netlist();
        for &cell in changed {
            for &pin in &netlist.cell(cell).pins {
                let Some(net) = netlist.pin(pin).net else {
                    continue;
                };
                if netlist.net(net).source == Some(pin) {
                    self.update_source_pin(design, net, pin)?;
                } else {
                    self.update_sink_pin(design, net, pin)?;
                }
            }
        }
        Ok(())
    }

    fn placed_bel_pin(&self, design: &PackDesign, pin: CellPinId) -> KestrelResult<BelPinId> {
        match design.possible_bel_pins(pin).as_slice() {
            [bel_pin] => Ok(*bel_pin),
            other => Err(InternalError::new(format!(
                "cell pin {pin} maps to {} BEL pins in cluster {}, expected one",
                other.len(),
                self.cluster
            ))),
        }
    }

    fn update_sink_pin(&mut self, design: &PackDesign, net: NetId, pin: CellPinId) -> KestrelResult<()> {
        let bel_pin = self.placed_bel_pin(design, pin)?;
        let sinks = self
            .sinks
            .make_mut(&net)
            .ok_or_else(|| InternalError::new(format!("net {net} has no sink summary")))?;
        sinks.conditional_must_leave.remove(&pin);
        sinks.conditionals.remove(&pin);
        sinks.required_carry_chains.remove(&pin);
        sinks.optional_carry_chains.remove(&pin);
        sinks.in_cluster.push(pin);
        self.bel_to_cell.insert(bel_pin, pin);
        self.cell_to_bel.insert(pin, bel_pin);
        Ok(())
    }

    fn update_source_pin(&mut self, design: &PackDesign, net: NetId, pin: CellPinId) -> KestrelResult<()> {
        let bel_pin = self.placed_bel_pin(design, pin)?;
        let drives_general_fabric = self.template.bel_pin(bel_pin).drives_general_fabric;
        let source = self
            .sources
            .make_mut(&net)
            .ok_or_else(|| InternalError::new(format!("net {net} has no source summary")))?;
        if source.placed {
            return Err(InternalError::new(format!(
                "source of net {net} placed twice in cluster {}",
                self.cluster
            )));
        }
        source.source_wires.clear();
        source.placed = true;
        source.bel_pin = Some(bel_pin);
        source.drives_general_fabric = drives_general_fabric;
        self.bel_to_cell.insert(bel_pin, pin);
        self.cell_to_bel.insert(pin, bel_pin);

        let netlist = design.netlist();
        let mut sinks = self
            .sinks
            .get(&net)
            .cloned()
            .ok_or_else(|| InternalError::new(format!("net {net} has no sink summary")))?;
        for &sink in &netlist.net(net).sinks {
            match design.location(netlist.pin(sink).cell) {
                None => self.init_unplaced_sink(design, &mut sinks, sink),
                Some(loc) if loc.cluster != self.cluster => {
                    self.init_outside_sink(design, &mut sinks, sink)?
                }
                Some(_) => {}
            }
        }
        self.sinks.insert(net, sinks);
        Ok(())
    }

    /// Carry-chain exits of this cluster ending on one of `ends`.
    fn carry_exits(&self, ends: &[PinTemplateRef], site: Option<u32>) -> BTreeSet<WireId> {
        self.template
            .direct_sinks()
            .iter()
            .filter(|dc| ends.contains(&dc.end_pin))
            .filter(|dc| site.map_or(true, |s| s == dc.end_site_index))
            .map(|dc| dc.cluster_wire)
            .collect()
    }

    fn init_outside_sink(
        &self,
        design: &PackDesign,
        sinks: &mut Sinks,
        sink: CellPinId,
    ) -> KestrelResult<()> {
        let candidates = design.possible_pin_templates(sink);
        let [end_pin] = candidates.as_slice() else {
            return Err(InternalError::new(format!(
                "sink pin {sink} maps to {} BEL pins, expected one",
                candidates.len()
            )));
        };
        let site = design.site_index(design.netlist().pin(sink).cell);
        let exits = self.carry_exits(&candidates, site);
        let general = design
            .device()
            .pin_template(*end_pin)
            .is_some_and(|t| t.driven_by_general_fabric);
        if general && !exits.is_empty() {
            sinks.optional_carry_chains.insert(sink, exits);
        } else if general {
            sinks.must_leave = true;
        } else {
            sinks.required_carry_chains.insert(sink, exits);
        }
        Ok(())
    }

    fn init_unplaced_sink(&self, design: &PackDesign, sinks: &mut Sinks, sink: CellPinId) {
        let candidates = design.possible_pin_templates(sink);
        let general = candidates.iter().any(|&r| {
            design
                .device()
                .pin_template(r)
                .is_some_and(|t| t.driven_by_general_fabric)
        });
        let exits = self.carry_exits(&candidates, None);
        match (general, !exits.is_empty()) {
            (true, true) => {
                sinks.optional_carry_chains.insert(sink, exits);
            }
            (false, true) => {
                sinks.required_carry_chains.insert(sink, exits);
            }
            (true, false) => {
                sinks.conditional_must_leave.insert(sink);
            }
            (false, false) => {
                sinks.conditionals.insert(sink);
            }
        }
    }

    /// Pin groups of the changed cells' connected pins, plus the groups of
    /// unconnected LUT outputs, whose occupancy still matters.
    fn changed_groups(
        &self,
        design: &PackDesign,
        changed: &[CellId],
    ) -> KestrelResult<BTreeSet<PinGroupId>> {
        let netlist = design.netlist();
        let mut groups = BTreeSet::new();
        for &cell in changed {
            let is_lut = netlist.lib_of(cell).is_lut();
            for &pin in &netlist.cell(cell).pins {
                let p = netlist.pin(pin);
                let bel_pin = if p.net.is_some() {
                    self.cell_to_bel.get(&pin).copied()
                } else if is_lut && p.direction.is_source() {
                    Some(self.placed_bel_pin(design, pin)?)
                } else {
                    None
                };
                let Some(bel_pin) = bel_pin else {
                    continue;
                };
                let group = self.template.pin_group_of(bel_pin).ok_or_else(|| {
                    InternalError::new(format!("BEL pin {bel_pin} belongs to no pin group"))
                })?;
                groups.insert(group);
            }
        }
        Ok(groups)
    }

    /// Rescans the rows of every group in `groups`. Returns `false` as soon
    /// as one group has no usable row.
    fn check_groups(
        &mut self,
        design: &PackDesign,
        groups: &BTreeSet<PinGroupId>,
    ) -> KestrelResult<bool> {
        for &group in groups {
            let table = self.tables.table(group);
            let old = self.groups.get(&group).cloned();
            let old_row = |i: usize| {
                old.as_ref()
                    .and_then(|g| g.rows.get(i).cloned())
                    .unwrap_or_else(|| RowStatus::new(Routability::Feasible))
            };

            let mut rows = Vec::with_capacity(table.rows.len());
            let mut found_feasible = false;
            let mut found_conditional = false;
            for (i, row) in table.rows.iter().enumerate() {
                if found_feasible {
                    rows.push(old_row(i));
                    continue;
                }
                if old_row(i).routability == Routability::Infeasible {
                    rows.push(RowStatus::new(Routability::Infeasible));
                    continue;
                }
                let status = self.check_row(design, table, row)?;
                match status.routability {
                    Routability::Feasible => {
                        trace!(cluster = %self.cluster, %group, row = i, "feasible row");
                        found_feasible = true;
                    }
                    Routability::Conditional => found_conditional = true,
                    Routability::Infeasible => {}
                }
                rows.push(status);
            }

            let routability = if found_feasible {
                Routability::Feasible
            } else if found_conditional {
                Routability::Conditional
            } else {
                Routability::Infeasible
            };
            let mut conditionals = Conditionals::new();
            if routability == Routability::Conditional {
                for row in rows.iter().filter(|r| r.routability == Routability::Conditional) {
                    for (&cell, bels) in &row.conditionals {
                        conditionals.entry(cell).or_default().extend(bels.iter().copied());
                    }
                }
            }
            self.groups.insert(
                group,
                GroupStatus {
                    routability,
                    conditionals,
                    rows,
                },
            );
            if routability == Routability::Infeasible {
                trace!(cluster = %self.cluster, %group, "no usable row");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_row(
        &self,
        design: &PackDesign,
        table: &RoutingTable,
        row: &Row,
    ) -> KestrelResult<RowStatus> {
        let mut status = RowStatus::new(Routability::Feasible);
        self.check_row_sinks(design, table.group, row, &mut status)?;
        if status.routability != Routability::Infeasible {
            self.check_row_sources(design, row, &mut status)?;
        }
        Ok(status)
    }

    fn check_row_sinks(
        &self,
        design: &PackDesign,
        group: PinGroupId,
        row: &Row,
        status: &mut RowStatus,
    ) -> KestrelResult<()> {
        let netlist = design.netlist();
        let mut claimed: BTreeMap<Claim, NetId> = BTreeMap::new();
        for (&bel_pin, entry) in &row.sink_pins {
            let Some(&cell_pin) = self.bel_to_cell.get(&bel_pin) else {
                continue;
            };
            let net = netlist.pin(cell_pin).net.ok_or_else(|| {
                InternalError::new(format!("mapped cell pin {cell_pin} has no net"))
            })?;
            let verdict = self.sink_verdict(design, group, row, net, bel_pin, entry)?;
            status.routability = status.routability.meet(verdict.routability);

            if let Some(bel) = verdict.conditional_source {
                let source_pin = netlist.net(net).source.ok_or_else(|| {
                    InternalError::new(format!("net {net} is conditional without a source"))
                })?;
                status.merge(netlist.pin(source_pin).cell, BTreeSet::from([bel]));
            }

            if status.routability != Routability::Infeasible {
                match claimed.get(&verdict.claim) {
                    Some(&other) if other != net => status.routability = Routability::Infeasible,
                    Some(_) => {}
                    None => {
                        claimed.insert(verdict.claim, net);
                    }
                }
            }
            if status.routability == Routability::Infeasible {
                break;
            }
        }
        Ok(())
    }

    fn check_row_sources(
        &self,
        design: &PackDesign,
        row: &Row,
        status: &mut RowStatus,
    ) -> KestrelResult<()> {
        for (&bel_pin, entry) in &row.source_pins {
            let Some(&cell_pin) = self.bel_to_cell.get(&bel_pin) else {
                continue;
            };
            let net = design.netlist().pin(cell_pin).net.ok_or_else(|| {
                InternalError::new(format!("mapped cell pin {cell_pin} has no net"))
            })?;
            let (routability, conditionals) = self.source_verdict(design, row, net, entry)?;
            status.routability = status.routability.meet(routability);
            for (cell, bels) in conditionals {
                status.merge(cell, bels);
            }
            if status.routability == Routability::Infeasible {
                break;
            }
        }
        Ok(())
    }

    /// Can the row feed the sink on `bel_pin` from its net's source?
    fn sink_verdict(
        &self,
        design: &PackDesign,
        group: PinGroupId,
        row: &Row,
        net: NetId,
        bel_pin: BelPinId,
        entry: &SinkPinEntry,
    ) -> KestrelResult<SinkVerdict> {
        let source = self
            .sources
            .get(&net)
            .ok_or_else(|| InternalError::new(format!("net {net} has no source summary")))?;
        let mut verdict = SinkVerdict {
            routability: Routability::Feasible,
            claim: Claim::Pin(bel_pin),
            conditional_source: None,
        };
        let infeasible_unless = |ok: bool| {
            if ok {
                Routability::Feasible
            } else {
                Routability::Infeasible
            }
        };

        if let Some(entry_pin) = entry.source_pin {
            verdict.claim = Claim::Pin(entry_pin);
            let entry_bel = self.template.bel_pin(entry_pin).bel;
            verdict.routability = if source.placed {
                infeasible_unless(source.bel_pin == Some(entry_pin))
            } else if let Some(kind) = source.constant {
                let tie_offs = match kind {
                    NetKind::Gnd => self.template.gnd_sources(),
                    _ => self.template.vcc_sources(),
                };
                infeasible_unless(
                    tie_offs.contains(&entry_pin) && !is_bel_taken(design, self.cluster, entry_bel),
                )
            } else if design.is_bel_occupied(self.cluster, entry_bel) {
                Routability::Infeasible
            } else if source
                .cell_pin
                .is_some_and(|pin| self.could_use(design, pin, entry_pin))
            {
                verdict.conditional_source = Some(entry_bel);
                Routability::Conditional
            } else {
                Routability::Infeasible
            };
        } else if entry.driven_by_general_fabric {
            let entry_wire = entry.source_cluster_pin.ok_or_else(|| {
                InternalError::new(format!(
                    "routing table row feeds BEL pin {bel_pin} from general fabric without an entry wire"
                ))
            })?;
            verdict.claim = Claim::Wire(entry_wire);
            let drives = match source.bel_pin {
                Some(source_pin) if self.template.pin_group(group).has_source_pin(source_pin) => row
                    .source_pins
                    .get(&source_pin)
                    .is_some_and(|e| e.drives_general_fabric),
                _ => source.drives_general_fabric,
            };
            verdict.routability = infeasible_unless(drives);
        } else if let Some(entry_wire) = entry.source_cluster_pin {
            verdict.claim = Claim::Wire(entry_wire);
            verdict.routability = infeasible_unless(source.source_wires.contains(&entry_wire));
        } else {
            return Err(InternalError::new(format!(
                "routing table row names no source for BEL pin {} of template {}",
                self.template.bel_pin_name(bel_pin),
                self.template.name()
            )));
        }
        Ok(verdict)
    }

    /// Can the row carry the net driven from the source pin `entry` to all
    /// of its sinks?
    fn source_verdict(
        &self,
        design: &PackDesign,
        row: &Row,
        net: NetId,
        entry: &SourcePinEntry,
    ) -> KestrelResult<(Routability, Conditionals)> {
        let sinks = self
            .sinks
            .get(&net)
            .ok_or_else(|| InternalError::new(format!("net {net} has no sink summary")))?;
        let infeasible = Ok((Routability::Infeasible, Conditionals::new()));
        let mut pending: BTreeSet<CellPinId> = BTreeSet::new();

        if sinks.must_leave {
            if !entry.drives_general_fabric {
                return infeasible;
            }
        } else if !entry.drives_general_fabric {
            pending.extend(sinks.conditional_must_leave.iter().copied());
        }
        pending.extend(sinks.conditionals.iter().copied());

        // a sink outside this group is reached by leaving and re-entering
        for sink in &sinks.in_cluster {
            let sink_bel_pin = self
                .cell_to_bel
                .get(sink)
                .ok_or_else(|| InternalError::new(format!("sink pin {sink} has no BEL pin")))?;
            if !row.sink_pins.contains_key(sink_bel_pin)
                && !(self.template.bel_pin(*sink_bel_pin).driven_by_general_fabric
                    && entry.drives_general_fabric)
            {
                return infeasible;
            }
        }

        let chains = sinks
            .required_carry_chains
            .iter()
            .chain(sinks.optional_carry_chains.iter().filter(|_| !entry.drives_general_fabric));
        for (&sink, exits) in chains {
            if entry.driven_cluster_pins.iter().any(|w| exits.contains(w)) {
                continue;
            }
            if design.location(design.netlist().pin(sink).cell).is_some() {
                return infeasible;
            }
            pending.insert(sink);
        }

        if pending.is_empty() {
            return Ok((Routability::Feasible, Conditionals::new()));
        }
        self.conditional_sinks(design, entry, &pending)
    }

    /// Candidate BELs for the unplaced sinks in `pins` among the sinks the
    /// source reaches in this row.
    fn conditional_sinks(
        &self,
        design: &PackDesign,
        entry: &SourcePinEntry,
        pins: &BTreeSet<CellPinId>,
    ) -> KestrelResult<(Routability, Conditionals)> {
        if entry.driven_sinks.len() < pins.len() {
            return Ok((Routability::Infeasible, Conditionals::new()));
        }
        let netlist = design.netlist();
        let mut conditionals = Conditionals::new();
        for &pin in pins {
            let bels: BTreeSet<BelId> = entry
                .driven_sinks
                .iter()
                .filter(|&&bp| self.could_use(design, pin, bp))
                .map(|&bp| self.template.bel_pin(bp).bel)
                .collect();
            let cell = netlist.pin(pin).cell;
            let merged = match conditionals.remove(&cell) {
                Some(prev) => prev.intersection(&bels).copied().collect(),
                None => bels,
            };
            if merged.is_empty() {
                return Ok((Routability::Infeasible, Conditionals::new()));
            }
            conditionals.insert(cell, merged);
        }
        Ok((Routability::Conditional, conditionals))
    }

    /// Whether the unplaced cell owning `pin` could sit on the free BEL of
    /// `bel_pin` with `pin` mapped onto it.
    fn could_use(&self, design: &PackDesign, pin: CellPinId, bel_pin: BelPinId) -> bool {
        let bp = self.template.bel_pin(bel_pin);
        let bel_type = self.template.bel(bp.bel).bel_type;
        let cell = design.netlist().pin(pin).cell;
        !design.is_bel_occupied(self.cluster, bp.bel)
            && design.netlist().lib_of(cell).can_anchor(bel_type)
            && design.netlist().possible_pin_names(pin, bel_type).contains(&bp.name)
    }
}

impl RoutabilityChecker for TableRoutabilityChecker {
    fn check(&mut self, design: &PackDesign, changed: &[CellId]) -> KestrelResult<RoutabilityResult> {
        let changed: Vec<CellId> = changed
            .iter()
            .copied()
            .filter(|&c| design.is_in_cluster(c, self.cluster))
            .collect();
        self.init_new_nets(design, &changed)?;
        self.update_changed_nets(design, &changed)?;
        let groups = self.changed_groups(design, &changed)?;
        if !self.check_groups(design, &groups)? {
            return Ok(RoutabilityResult::infeasible());
        }

        let routability = self
            .groups
            .values()
            .fold(Routability::Feasible, |acc, g| acc.meet(g.routability));
        if routability != Routability::Conditional {
            return Ok(RoutabilityResult::from_parts(routability, Conditionals::new()));
        }
        let mut conditionals = Conditionals::new();
        for status in self.groups.values() {
            for (&cell, bels) in &status.conditionals {
                conditionals.entry(cell).or_default().extend(bels.iter().copied());
            }
        }
        Ok(RoutabilityResult::conditional(conditionals))
    }

    fn checkpoint(&mut self) {
        self.bel_to_cell.checkpoint();
        self.cell_to_bel.checkpoint();
        self.sources.checkpoint();
        self.sinks.checkpoint();
        self.groups.checkpoint();
    }

    fn rollback(&mut self) -> KestrelResult<()> {
        self.bel_to_cell.rollback()?;
        self.cell_to_bel.rollback()?;
        self.sources.rollback()?;
        self.sinks.rollback()?;
        self.groups.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{slice, slice_with, Slice};

    fn checker(s: &Slice) -> TableRoutabilityChecker {
        let tables = Arc::new(TemplateTables::build(s.design.template(s.cluster)).unwrap());
        TableRoutabilityChecker::new(&s.design, s.cluster, tables)
    }

    fn ff_group(s: &Slice) -> PinGroupId {
        let t = s.design.template(s.cluster);
        t.pin_group_of(t.pin_by_name(s.ff_bel, "D").unwrap()).unwrap()
    }

    #[test]
    fn internal_net_is_feasible_in_every_row() {
        let mut s = slice();
        let lut = s.add_cell("lut", s.lut_lib);
        let ff = s.add_cell("ff", s.ff_lib);
        s.net("n", NetKind::Signal, &[(lut, "O"), (ff, "D")]);
        s.design.place(lut, s.cluster, s.lut_bel).unwrap();
        s.design.place(ff, s.cluster, s.ff_bel).unwrap();

        let mut c = checker(&s);
        assert_eq!(c.check(&s.design, &[lut, ff]).unwrap(), RoutabilityResult::feasible());
        // the LUT output also leaves through OUT0, so re-entering on IN1 works
        assert_eq!(
            c.row_feasibility(&s.design, ff_group(&s)).unwrap(),
            vec![Routability::Feasible, Routability::Feasible]
        );
    }

    #[test]
    fn ambiguous_sink_mapping_is_internal_error() {
        let mut s = slice();
        let ext = s.add_cell("ext", s.lut_lib);
        let lut = s.add_cell("lut", s.lut_lib);
        s.net("a", NetKind::Signal, &[(ext, "O"), (lut, "I0")]);
        s.design.place(lut, s.cluster, s.lut_bel).unwrap();

        // I0 may use A1 or A2
        let mut c = checker(&s);
        assert!(c.check(&s.design, &[lut]).is_err());
    }

    #[test]
    fn unplaced_source_may_enter_from_fabric() {
        let mut s = slice();
        let src = s.add_cell("src", s.lut_lib);
        let ff = s.add_cell("ff", s.ff_lib);
        s.net("n", NetKind::Signal, &[(src, "O"), (ff, "D")]);
        s.design.place(ff, s.cluster, s.ff_bel).unwrap();

        let mut c = checker(&s);
        assert_eq!(c.check(&s.design, &[ff]).unwrap(), RoutabilityResult::feasible());
        assert_eq!(
            c.row_feasibility(&s.design, ff_group(&s)).unwrap(),
            vec![Routability::Feasible, Routability::Conditional]
        );
    }

    #[test]
    fn source_without_fabric_access_is_conditional() {
        let mut s = slice_with(false);
        let src = s.add_cell("src", s.lut_lib);
        let ff = s.add_cell("ff", s.ff_lib);
        s.net("n", NetKind::Signal, &[(src, "O"), (ff, "D")]);
        s.design.place(ff, s.cluster, s.ff_bel).unwrap();

        let mut c = checker(&s);
        let result = c.check(&s.design, &[ff]).unwrap();
        assert_eq!(result.routability, Routability::Conditional);
        assert_eq!(
            result.conditionals,
            Conditionals::from([(src, BTreeSet::from([s.lut_bel]))])
        );
        assert_eq!(c.check(&s.design, &[]).unwrap(), result);
    }

    #[test]
    fn blocking_the_candidate_bel_makes_it_infeasible() {
        let mut s = slice_with(false);
        let src = s.add_cell("src", s.lut_lib);
        let ff = s.add_cell("ff", s.ff_lib);
        let blocker = s.add_cell("blocker", s.lut_lib);
        s.net("n", NetKind::Signal, &[(src, "O"), (ff, "D")]);
        s.design.place(ff, s.cluster, s.ff_bel).unwrap();
        let mut c = checker(&s);
        let conditional = c.check(&s.design, &[ff]).unwrap();

        c.checkpoint();
        // an unconnected LUT output still claims its pin group
        s.design.place(blocker, s.cluster, s.lut_bel).unwrap();
        assert_eq!(c.check(&s.design, &[blocker]).unwrap(), RoutabilityResult::infeasible());
        assert_eq!(c.check(&s.design, &[]).unwrap(), RoutabilityResult::infeasible());

        s.design.unplace(blocker);
        c.rollback().unwrap();
        assert_eq!(c.check(&s.design, &[]).unwrap(), conditional);
    }

    #[test]
    fn outside_source_must_reach_the_fabric() {
        for (general, expected) in [(true, Routability::Feasible), (false, Routability::Infeasible)] {
            let mut s = slice_with(general);
            let template = Arc::clone(s.design.template(s.cluster));
            let other = s.design.add_cluster("slice_1", template);
            let src = s.add_cell("src", s.lut_lib);
            let ff = s.add_cell("ff", s.ff_lib);
            s.net("n", NetKind::Signal, &[(src, "O"), (ff, "D")]);
            s.design.place(src, other, s.lut_bel).unwrap();
            s.design.place(ff, s.cluster, s.ff_bel).unwrap();

            let mut c = checker(&s);
            assert_eq!(c.check(&s.design, &[ff]).unwrap().routability, expected);
        }
    }

    #[test]
    fn static_sink_enters_from_fabric() {
        let mut s = slice();
        let ff = s.add_cell("ff", s.ff_lib);
        s.net("vcc", NetKind::Vcc, &[(ff, "D")]);
        s.design.place(ff, s.cluster, s.ff_bel).unwrap();

        let mut c = checker(&s);
        assert_eq!(c.check(&s.design, &[ff]).unwrap(), RoutabilityResult::feasible());
    }

    #[test]
    fn cells_of_other_clusters_are_ignored() {
        let mut s = slice();
        let template = Arc::clone(s.design.template(s.cluster));
        let other = s.design.add_cluster("slice_1", template);
        let ext = s.add_cell("ext", s.lut_lib);
        let lut = s.add_cell("lut", s.lut_lib);
        s.net("a", NetKind::Signal, &[(ext, "O"), (lut, "I0")]);
        s.design.place(lut, other, s.lut_bel).unwrap();

        let mut c = checker(&s);
        assert_eq!(c.check(&s.design, &[lut]).unwrap(), RoutabilityResult::feasible());
    }

    #[test]
    fn rollback_restores_state() {
        let mut s = slice();
        let lut = s.add_cell("lut", s.lut_lib);
        let ff = s.add_cell("ff", s.ff_lib);
        let net = s.net("n", NetKind::Signal, &[(lut, "O"), (ff, "D")]);
        s.design.place(lut, s.cluster, s.lut_bel).unwrap();

        let mut c = checker(&s);
        c.check(&s.design, &[lut]).unwrap();
        let before = c.clone();

        c.checkpoint();
        s.design.place(ff, s.cluster, s.ff_bel).unwrap();
        c.check(&s.design, &[ff]).unwrap();
        assert_ne!(c.sinks.get(&net), before.sinks.get(&net));
        c.rollback().unwrap();

        assert_eq!(c.sources, before.sources);
        assert_eq!(c.sinks, before.sinks);
        assert_eq!(c.groups, before.groups);
        assert_eq!(c.bel_to_cell, before.bel_to_cell);
        assert_eq!(c.cell_to_bel, before.cell_to_bel);
        assert!(c.rollback().is_err());
    }
}
