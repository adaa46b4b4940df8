//! Negotiated-congestion routing of one cluster.
//!
//! [`ClusterRouter`] routes every net touching its cluster, ripping up and
//! rerouting the nets that share wires until either no wire is shared or the
//! iteration bound runs out. In incremental mode a second, conditional pass
//! tries to explain the remaining failures with placements of cells that are
//! not placed yet.

use crate::checker::Routability;
use crate::design::PackDesign;
use crate::ids::{CellPinId, ClusterId, NetId};
use crate::netlist::OperatingMode;
use crate::route_tree::RouteForest;
use crate::routing::classify::{classify_cluster, is_shared_a6, NetSource, PinMappings, SortedNetPins};
use crate::routing::conditional::{build_conditionals, Conditionals, Strictness};
use crate::routing::maze::{route_to_terminals, SearchContext, Terminals};
use crate::routing::occupancy::OccupancyTable;
use kestrel_common::{InternalError, KestrelResult};
use kestrel_config::RouterConfig;
use kestrel_device::{BelPinId, ClusterTemplate, DeviceFamily, WireId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// SLICEM DI-mux wires that must stay unused while a shift register's `DI`
/// input is routed to a 5-input LUT BEL.
const SRL_DI_MUX_WIRES: [&str; 6] = [
    "intrasite:SLICEM/CDI1MUX.DI",
    "intrasite:SLICEM/CDI1MUX.DMC31",
    "intrasite:SLICEM/BDI1MUX.DI",
    "intrasite:SLICEM/BDI1MUX.CMC31",
    "intrasite:SLICEM/ADI1MUX.BDI1",
    "intrasite:SLICEM/ADI1MUX.BMC31",
];

/// Outcome of routing one net, or of one full pass over all nets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetStatus {
    /// Routed without sharing any wire.
    Success,
    /// Routed, but through at least one shared wire.
    Contention,
    /// Cannot be routed as classified.
    Impossible,
    /// Can only be routed once an unplaced cell is placed.
    Conditional,
}

/// Counters of the last [`ClusterRouter::route_cluster`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    /// Net routing attempts.
    pub nets_routed: usize,
    /// Sink searches.
    pub pins_routed: usize,
    /// Negotiation passes over both phases.
    pub iterations: u32,
}

/// Everything a checkpoint has to capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RouterState {
    pub occupancy: OccupancyTable,
    pub routes: BTreeMap<NetId, RouteForest>,
    pub pin_maps: BTreeMap<NetId, BTreeMap<CellPinId, BelPinId>>,
    pub classification: BTreeMap<NetId, SortedNetPins>,
    pub conditionals: Conditionals,
}

/// The nets rerouted by one pass and the pass outcome.
struct Pass {
    status: NetStatus,
    rerouted: Vec<NetId>,
}

/// The sink category a failed alternative stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Internal,
    External,
    Conditional,
}

/// A fully routed source alternative.
struct Routed {
    forest: RouteForest,
    pin_map: BTreeMap<CellPinId, BelPinId>,
    cost: u64,
    contended: bool,
}

/// Negotiated-congestion router owning the routing state of one cluster.
#[derive(Debug, Clone)]
pub struct ClusterRouter {
    cluster: ClusterId,
    config: RouterConfig,
    pub(crate) state: RouterState,
    stats: RouteStats,
}

impl ClusterRouter {
    /// Creates a router for `cluster` with nothing routed.
    pub fn new(cluster: ClusterId, config: RouterConfig) -> Self {
        Self {
            cluster,
            config,
            state: RouterState::default(),
            stats: RouteStats::default(),
        }
    }

    /// The cluster this router works on.
    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    /// The configuration in use.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Wire occupancy and history.
    pub fn occupancy(&self) -> &OccupancyTable {
        &self.state.occupancy
    }

    /// Committed route trees of `net`.
    pub fn route_trees(&self, net: NetId) -> Option<&RouteForest> {
        self.state.routes.get(&net)
    }

    /// Nets with a committed route, in ID order.
    pub fn routed_nets(&self) -> impl Iterator<Item = NetId> + '_ {
        self.state.routes.keys().copied()
    }

    /// Cell pin to BEL pin assignments chosen for `net`.
    pub fn pin_map(&self, net: NetId) -> Option<&BTreeMap<CellPinId, BelPinId>> {
        self.state.pin_maps.get(&net)
    }

    /// Classification computed by the last call.
    pub fn classification(&self) -> &BTreeMap<NetId, SortedNetPins> {
        &self.state.classification
    }

    /// Conditionals of the last call; empty unless it returned
    /// [`Routability::Conditional`].
    pub fn conditionals(&self) -> &Conditionals {
        &self.state.conditionals
    }

    /// Counters of the last call.
    pub fn stats(&self) -> RouteStats {
        self.stats
    }

    /// Unroutes `net` if it has a committed route.
    pub fn invalidate_net(&mut self, net: NetId) -> KestrelResult<()> {
        if let Some(forest) = self.state.routes.remove(&net) {
            self.state.occupancy.release(&forest.wires())?;
        }
        self.state.pin_maps.remove(&net);
        Ok(())
    }

    /// Routes every net touching the cluster and reports whether the
    /// placement is routable.
    ///
    /// Nets already routed without contention are kept, even if one of their
    /// cells moved since; call [`Self::invalidate_net`] for every net of a
    /// moved cell first. Nets that no longer touch the cluster are unrouted.
    ///
    /// A feasible result keeps every committed route. Otherwise the routes
    /// of nets settled late in negotiation or set aside as conditional are
    /// dropped again.
    pub fn route_cluster(&mut self, design: &PackDesign) -> KestrelResult<Routability> {
        self.stats = RouteStats::default();
        self.state.conditionals.clear();
        self.state.classification =
            classify_cluster(design, self.cluster, self.config.incremental)?;
        let stale: Vec<NetId> = self
            .state
            .routes
            .keys()
            .filter(|n| !self.state.classification.contains_key(n))
            .copied()
            .collect();
        for net in stale {
            self.invalidate_net(net)?;
        }

        let template = Arc::clone(design.template(self.cluster));
        let mut skipped = BTreeSet::new();
        let mut late = BTreeSet::new();
        let first = self.negotiate(
            design,
            &template,
            &mut skipped,
            false,
            self.config.iterations,
            &mut late,
        )?;
        debug!(cluster = %self.cluster, status = ?first, "first negotiation phase done");

        let mut speculative: BTreeSet<NetId> = late.union(&skipped).copied().collect();
        let routability = match first {
            NetStatus::Success => Routability::Feasible,
            NetStatus::Impossible => Routability::Infeasible,
            _ if !self.config.incremental => Routability::Infeasible,
            NetStatus::Contention => {
                match self.resolve_conditionals(design, &late, Strictness::Lenient) {
                    Some(c) if !c.is_empty() => {
                        self.conditional_phase(design, &template, c, &mut speculative)?
                    }
                    _ => Routability::Infeasible,
                }
            }
            NetStatus::Conditional => {
                match self.resolve_conditionals(design, &skipped, Strictness::Strict) {
                    Some(c) => self.conditional_phase(design, &template, c, &mut speculative)?,
                    None => Routability::Infeasible,
                }
            }
        };

        if routability != Routability::Feasible {
            for net in speculative {
                self.invalidate_net(net)?;
            }
        }
        if routability != Routability::Conditional {
            self.state.conditionals.clear();
        }
        debug!(
            cluster = %self.cluster,
            ?routability,
            nets_routed = self.stats.nets_routed,
            pins_routed = self.stats.pins_routed,
            iterations = self.stats.iterations,
            "routed cluster"
        );
        Ok(routability)
    }

    fn resolve_conditionals(
        &mut self,
        design: &PackDesign,
        nets: &BTreeSet<NetId>,
        strictness: Strictness,
    ) -> Option<Conditionals> {
        build_conditionals(
            design,
            self.cluster,
            nets,
            &mut self.state.classification,
            strictness,
        )
    }

    /// Reroutes with conditional mappings, including the nets the first
    /// phase set aside.
    fn conditional_phase(
        &mut self,
        design: &PackDesign,
        template: &ClusterTemplate,
        conditionals: Conditionals,
        speculative: &mut BTreeSet<NetId>,
    ) -> KestrelResult<Routability> {
        debug!(cluster = %self.cluster, cells = conditionals.len(), "conditional negotiation phase");
        let mut skipped = BTreeSet::new();
        let mut late = BTreeSet::new();
        let status = self.negotiate(
            design,
            template,
            &mut skipped,
            true,
            self.config.conditional_iterations,
            &mut late,
        )?;
        speculative.extend(skipped);
        if status == NetStatus::Success {
            self.state.conditionals = conditionals;
            Ok(Routability::Conditional)
        } else {
            Ok(Routability::Infeasible)
        }
    }

    /// Runs up to `bound` passes, stopping at the first pass without
    /// contention. Nets rerouted in the second half of the passes are added
    /// to `late`. A clean pass that left nets in `skipped` is conditional.
    fn negotiate(
        &mut self,
        design: &PackDesign,
        template: &ClusterTemplate,
        skipped: &mut BTreeSet<NetId>,
        conditional: bool,
        bound: u32,
        late: &mut BTreeSet<NetId>,
    ) -> KestrelResult<NetStatus> {
        let mut status = NetStatus::Success;
        for iteration in 0..bound {
            let pass = self.route_nets(design, template, skipped, conditional)?;
            self.stats.iterations += 1;
            if iteration >= bound / 2 {
                late.extend(pass.rerouted.iter().copied());
            }
            debug!(
                cluster = %self.cluster,
                iteration,
                conditional,
                rerouted = pass.rerouted.len(),
                overused = self.state.occupancy.overused_count(),
                "negotiation pass"
            );
            status = pass.status;
            if status != NetStatus::Contention {
                break;
            }
        }
        if status == NetStatus::Success && !skipped.is_empty() {
            status = NetStatus::Conditional;
        }
        if status == NetStatus::Contention {
            warn!(
                cluster = %self.cluster,
                iterations = bound,
                overused = self.state.occupancy.overused_count(),
                "negotiation did not converge"
            );
        }
        Ok(status)
    }

    fn route_nets(
        &mut self,
        design: &PackDesign,
        template: &ClusterTemplate,
        skipped: &mut BTreeSet<NetId>,
        conditional: bool,
    ) -> KestrelResult<Pass> {
        let mut pass = Pass {
            status: NetStatus::Success,
            rerouted: Vec::new(),
        };
        let nets: Vec<NetId> = self.state.classification.keys().copied().collect();
        for net in nets {
            if skipped.contains(&net) {
                continue;
            }
            if let Some(forest) = self.state.routes.get(&net) {
                if !self.is_contended(forest) {
                    continue;
                }
                self.invalidate_net(net)?;
            }
            let is_static = self
                .state
                .classification
                .get(&net)
                .is_some_and(SortedNetPins::is_static);
            if !is_static {
                pass.rerouted.push(net);
            }
            self.stats.nets_routed += 1;
            let status = self.route_net(design, template, net, conditional)?;
            trace!(cluster = %self.cluster, %net, ?status, "routed net");
            match status {
                NetStatus::Impossible => {
                    pass.status = NetStatus::Impossible;
                    return Ok(pass);
                }
                NetStatus::Contention => pass.status = NetStatus::Contention,
                NetStatus::Conditional => {
                    skipped.insert(net);
                    if pass.status != NetStatus::Contention {
                        pass.status = NetStatus::Conditional;
                    }
                }
                NetStatus::Success => {}
            }
        }
        Ok(pass)
    }

    fn is_contended(&self, forest: &RouteForest) -> bool {
        forest
            .wires()
            .into_iter()
            .any(|w| self.state.occupancy.is_contended(w))
    }

    /// Tries every source alternative of `net` and commits the chosen one.
    fn route_net(
        &mut self,
        design: &PackDesign,
        template: &ClusterTemplate,
        net: NetId,
        conditional: bool,
    ) -> KestrelResult<NetStatus> {
        let pins = self
            .state
            .classification
            .get(&net)
            .ok_or_else(|| InternalError::new(format!("net {net} has no classification")))?;
        let ctx = SearchContext {
            template,
            occupancy: &self.state.occupancy,
            weights: &self.config.cost,
            route_throughs: self.config.route_throughs,
        };

        let mut best: Option<Routed> = None;
        let mut failed_on_conditional = false;
        let mut pins_routed = 0;
        for sources in &pins.source_mappings {
            match route_alternative(design, self.cluster, &ctx, pins, sources, &mut pins_routed) {
                Err(stage) => {
                    if stage == Stage::Conditional {
                        failed_on_conditional = true;
                    }
                }
                Ok(routed) if routed.contended => {
                    best = Some(routed);
                    break;
                }
                Ok(routed) => {
                    if best.as_ref().map_or(true, |b| routed.cost < b.cost) {
                        best = Some(routed);
                    }
                }
            }
        }
        let unplaced_source = matches!(pins.source, NetSource::Unplaced { .. });
        self.stats.pins_routed += pins_routed;

        let Some(routed) = best else {
            let deferred = self.config.incremental
                && !conditional
                && (unplaced_source || failed_on_conditional);
            return Ok(if deferred {
                NetStatus::Conditional
            } else {
                NetStatus::Impossible
            });
        };

        let wires = routed.forest.wires();
        self.state.occupancy.claim(&wires);
        let contended = wires.iter().any(|&w| self.state.occupancy.is_contended(w));
        self.state.routes.insert(net, routed.forest.compacted());
        self.state.pin_maps.insert(net, routed.pin_map);
        Ok(if contended {
            NetStatus::Contention
        } else {
            NetStatus::Success
        })
    }
}

/// Routes every sink of `pins` from one source alternative.
fn route_alternative(
    design: &PackDesign,
    cluster: ClusterId,
    ctx: &SearchContext<'_>,
    pins: &SortedNetPins,
    sources: &PinMappings,
    pins_routed: &mut usize,
) -> Result<Routed, Stage> {
    let template = ctx.template;
    let no_invalidation = HashSet::new();
    let mut forest = RouteForest::new();
    for &wire in &sources.edge_wires {
        forest.add_root(wire, ctx.wire_cost(wire, &no_invalidation));
    }
    for &bp in &sources.bel_pins {
        let wire = template.bel_pin(bp).wire;
        forest.add_root(wire, ctx.wire_cost(wire, &no_invalidation));
    }

    let mut pin_map = BTreeMap::new();
    if let NetSource::InCluster { pin, bel_pin } = pins.source {
        pin_map.insert(pin, bel_pin);
    }
    let mut sinks = Vec::new();

    for (&sink, mapping) in &pins.internal_sinks {
        *pins_routed += 1;
        let terminals = sink_terminals(design, cluster, template, mapping);
        let invalidated = invalidated_wires(design, cluster, template, sink);
        let reached = route_to_terminals(ctx, &mut forest, &mut sinks, &terminals, &invalidated)
            .ok_or(Stage::Internal)?;
        if let Some(bp) = reached.pin {
            pin_map.insert(sink, bp);
        }
    }

    let mut exited = false;
    if pins.must_route_external {
        *pins_routed += 1;
        let terminals: Terminals = template.outputs().iter().map(|&w| (w, None)).collect();
        route_to_terminals(ctx, &mut forest, &mut sinks, &terminals, &no_invalidation)
            .ok_or(Stage::External)?;
        exited = true;
    }

    let later = pins
        .external_sinks
        .values()
        .map(|m| (m, Stage::External))
        .chain(pins.conditional_sinks.values().map(|m| (m, Stage::Conditional)));
    for (mapping, stage) in later {
        if exited && mapping.generally_driven {
            continue;
        }
        *pins_routed += 1;
        let terminals = sink_terminals(design, cluster, template, mapping);
        let reached =
            route_to_terminals(ctx, &mut forest, &mut sinks, &terminals, &no_invalidation)
                .ok_or(stage)?;
        if template.is_output(reached.wire) {
            exited = true;
        }
    }

    forest.prune(&sinks, true);
    let wires = forest.wires();
    let cost = wires
        .iter()
        .map(|&w| u64::from(ctx.occupancy.wire_cost(w, ctx.weights)))
        .sum();
    let contended = wires.iter().any(|&w| ctx.occupancy.is_contended(w));
    Ok(Routed {
        forest,
        pin_map,
        cost,
        contended,
    })
}

/// Terminal wires of one sink mapping.
fn sink_terminals(
    design: &PackDesign,
    cluster: ClusterId,
    template: &ClusterTemplate,
    mapping: &PinMappings,
) -> Terminals {
    let mut terminals = Terminals::new();
    for &bp in &mapping.bel_pins {
        if is_shared_a6(design, cluster, bp) {
            continue;
        }
        terminals.insert(template.bel_pin(bp).wire, Some(bp));
    }
    for &wire in &mapping.edge_wires {
        terminals.entry(wire).or_insert(None);
    }
    if mapping.generally_driven {
        for &wire in template.outputs() {
            terminals.entry(wire).or_insert(None);
        }
    }
    terminals
}

/// Wires a search towards `sink` must avoid.
///
/// On Virtex6 a shift register's `DI` input routed to a 5-input LUT BEL
/// would fight the SLICEM DI multiplexers feeding the neighbouring LUTs.
fn invalidated_wires(
    design: &PackDesign,
    cluster: ClusterId,
    template: &ClusterTemplate,
    sink: CellPinId,
) -> HashSet<WireId> {
    let mut wires = HashSet::new();
    if design.device().family() != DeviceFamily::Virtex6 {
        return wires;
    }
    let netlist = design.netlist();
    let pin = netlist.pin(sink);
    if pin.name != "DI" || netlist.cell(pin.cell).mode != OperatingMode::ShiftRegister {
        return wires;
    }
    let Some(loc) = design.location(pin.cell).filter(|l| l.cluster == cluster) else {
        return wires;
    };
    if !is_lut5_name(template.bel_name(loc.bel)) {
        return wires;
    }
    let site = template.bel(loc.bel).site_index;
    wires.extend(
        SRL_DI_MUX_WIRES
            .iter()
            .filter_map(|name| template.site_wire(site, name)),
    );
    wires
}

/// Matches `A5LUT` through `D5LUT`.
fn is_lut5_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 5 && (b'A'..=b'D').contains(&bytes[0]) && &name[1..] == "5LUT"
}
