//! Cluster templates: the read-only routing graph of one kind of cluster.
//!
//! A [`ClusterTemplate`] is built once per cluster kind with a
//! [`ClusterTemplateBuilder`] and then shared by every cluster instance of
//! that kind. Besides the raw wire graph it precomputes the reachability
//! summaries the router consults on every check: which cluster inputs reach a
//! sink pin, which sink pins a source pin reaches, and the pin groups.

use crate::device::Device;
use crate::error::TemplateError;
use crate::ids::{BelId, BelPinId, BelTypeId, PinGroupId, TemplateId, WireId};
use crate::pin_group::{build_pin_groups, PinGroup};
use crate::types::{
    Bel, BelPin, ClusterConnection, Connection, ConnectionKind, DirectConnection, LutSize,
    LutSlot, PinTemplateRef, Wire, WireKind,
};
use kestrel_common::Ident;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// The internal routing graph of one kind of cluster.
#[derive(Debug)]
pub struct ClusterTemplate {
    id: TemplateId,
    name: Ident,
    device: Arc<Device>,
    wires: Vec<Wire>,
    wire_lookup: HashMap<(WireKind, Ident), WireId>,
    bels: Vec<Bel>,
    bel_lookup: HashMap<(u32, Ident), BelId>,
    bel_pins: Vec<BelPin>,
    forward: Vec<Vec<Connection>>,
    reverse: Vec<Vec<Connection>>,
    terminals: Vec<Vec<BelPinId>>,
    drivers: Vec<Vec<BelPinId>>,
    inputs: Vec<WireId>,
    outputs: Vec<WireId>,
    input_set: HashSet<WireId>,
    output_set: HashSet<WireId>,
    direct_sinks: Vec<DirectConnection>,
    direct_sources: Vec<DirectConnection>,
    vcc_sources: Vec<BelPinId>,
    gnd_sources: Vec<BelPinId>,
    inputs_of_sink: HashMap<BelPinId, Vec<WireId>>,
    sinks_of_source: HashMap<BelPinId, Vec<ClusterConnection>>,
    sources_of_sink: HashMap<BelPinId, Vec<ClusterConnection>>,
    pin_groups: Vec<PinGroup>,
    pin_group_of: HashMap<BelPinId, PinGroupId>,
}

impl ClusterTemplate {
    /// Returns the template ID.
    pub fn id(&self) -> TemplateId {
        self.id
    }

    /// Returns the template name.
    pub fn name(&self) -> &str {
        self.device.name(self.name)
    }

    /// Returns the device this template belongs to.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the number of wires.
    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    /// Returns a wire.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this template.
    pub fn wire(&self, id: WireId) -> &Wire {
        &self.wires[id.index()]
    }

    /// Returns a wire's name.
    pub fn wire_name(&self, id: WireId) -> &str {
        self.device.name(self.wire(id).name)
    }

    /// Looks up a site wire by name.
    pub fn site_wire(&self, site_index: u32, name: &str) -> Option<WireId> {
        self.wire_by_name(WireKind::Site(site_index), name)
    }

    /// Looks up a tile wire by name.
    pub fn tile_wire(&self, name: &str) -> Option<WireId> {
        self.wire_by_name(WireKind::Tile, name)
    }

    fn wire_by_name(&self, kind: WireKind, name: &str) -> Option<WireId> {
        let name = self.device.interner().get(name)?;
        self.wire_lookup.get(&(kind, name)).copied()
    }

    /// Returns a BEL.
    pub fn bel(&self, id: BelId) -> &Bel {
        &self.bels[id.index()]
    }

    /// Returns a BEL's name.
    pub fn bel_name(&self, id: BelId) -> &str {
        self.device.name(self.bel(id).name)
    }

    /// Returns all BELs with their IDs.
    pub fn bels(&self) -> impl Iterator<Item = (BelId, &Bel)> {
        self.bels
            .iter()
            .enumerate()
            .map(|(i, b)| (BelId::from_raw(i as u32), b))
    }

    /// Looks up a BEL by site and name.
    pub fn bel_by_name(&self, site_index: u32, name: &str) -> Option<BelId> {
        let name = self.device.interner().get(name)?;
        self.bel_lookup.get(&(site_index, name)).copied()
    }

    /// Returns the LUT pairing of a BEL, if any.
    pub fn lut_slot(&self, bel: BelId) -> Option<LutSlot> {
        self.bel(bel).lut
    }

    /// Returns a BEL pin.
    pub fn bel_pin(&self, id: BelPinId) -> &BelPin {
        &self.bel_pins[id.index()]
    }

    /// Returns all BEL pins with their IDs.
    pub fn bel_pins(&self) -> impl Iterator<Item = (BelPinId, &BelPin)> {
        self.bel_pins
            .iter()
            .enumerate()
            .map(|(i, p)| (BelPinId::from_raw(i as u32), p))
    }

    /// Returns a BEL pin's name.
    pub fn bel_pin_name(&self, id: BelPinId) -> &str {
        self.device.name(self.bel_pin(id).name)
    }

    /// Finds the pin of `bel` with the given interned name.
    pub fn pin_of(&self, bel: BelId, name: Ident) -> Option<BelPinId> {
        self.bel(bel)
            .pins
            .iter()
            .copied()
            .find(|&p| self.bel_pin(p).name == name)
    }

    /// Finds the pin of `bel` with the given name.
    pub fn pin_by_name(&self, bel: BelId, name: &str) -> Option<BelPinId> {
        self.pin_of(bel, self.device.interner().get(name)?)
    }

    /// Forward connections leaving `wire`.
    pub fn connections(&self, wire: WireId) -> &[Connection] {
        &self.forward[wire.index()]
    }

    /// Reverse connections entering `wire`; each names the driving wire.
    pub fn reverse_connections(&self, wire: WireId) -> &[Connection] {
        &self.reverse[wire.index()]
    }

    /// Sink BEL pins fed by `wire`.
    pub fn terminals(&self, wire: WireId) -> &[BelPinId] {
        &self.terminals[wire.index()]
    }

    /// Source BEL pins driving `wire`.
    pub fn drivers(&self, wire: WireId) -> &[BelPinId] {
        &self.drivers[wire.index()]
    }

    /// Cluster entry wires reachable from the general fabric.
    pub fn inputs(&self) -> &[WireId] {
        &self.inputs
    }

    /// Cluster exit wires leading to the general fabric.
    pub fn outputs(&self) -> &[WireId] {
        &self.outputs
    }

    /// Returns `true` if `wire` is a cluster input.
    pub fn is_input(&self, wire: WireId) -> bool {
        self.input_set.contains(&wire)
    }

    /// Returns `true` if `wire` is a cluster output.
    pub fn is_output(&self, wire: WireId) -> bool {
        self.output_set.contains(&wire)
    }

    /// Direct connections leaving the cluster.
    pub fn direct_sinks(&self) -> &[DirectConnection] {
        &self.direct_sinks
    }

    /// Direct connections entering the cluster.
    pub fn direct_sources(&self) -> &[DirectConnection] {
        &self.direct_sources
    }

    /// BEL pins able to supply logic one.
    pub fn vcc_sources(&self) -> &[BelPinId] {
        &self.vcc_sources
    }

    /// BEL pins able to supply logic zero.
    pub fn gnd_sources(&self) -> &[BelPinId] {
        &self.gnd_sources
    }

    /// Cluster inputs from which `sink` can be reached.
    pub fn inputs_of_sink(&self, sink: BelPinId) -> &[WireId] {
        self.inputs_of_sink
            .get(&sink)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sink pins reachable from `source` without leaving the cluster.
    pub fn sinks_of_source(&self, source: BelPinId) -> &[ClusterConnection] {
        self.sinks_of_source
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Source pins that reach `sink` without leaving the cluster.
    pub fn sources_of_sink(&self, sink: BelPinId) -> &[ClusterConnection] {
        self.sources_of_sink
            .get(&sink)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All pin groups, indexed by [`PinGroupId`].
    pub fn pin_groups(&self) -> &[PinGroup] {
        &self.pin_groups
    }

    /// Returns a pin group.
    pub fn pin_group(&self, id: PinGroupId) -> &PinGroup {
        &self.pin_groups[id.index()]
    }

    /// The pin group containing `pin`.
    pub fn pin_group_of(&self, pin: BelPinId) -> Option<PinGroupId> {
        self.pin_group_of.get(&pin).copied()
    }

    /// Resolves the BEL pin of `bel` matching a pin template, if `bel` has
    /// the template's type.
    pub fn pin_for_template(&self, bel: BelId, pin: PinTemplateRef) -> Option<BelPinId> {
        if self.bel(bel).bel_type != pin.bel_type {
            return None;
        }
        self.pin_of(bel, pin.pin)
    }

    fn compute_reachability(&mut self) {
        let mut inputs_of_sink = HashMap::new();
        let mut sinks_of_source: HashMap<BelPinId, Vec<ClusterConnection>> = HashMap::new();
        let mut sources_of_sink: BTreeMap<BelPinId, Vec<ClusterConnection>> = BTreeMap::new();

        for (id, pin) in self.bel_pins() {
            if pin.direction.is_sink() {
                inputs_of_sink.insert(id, self.reverse_reach_inputs(pin.wire));
            }
            if pin.direction.is_source() {
                let site = WireKind::Site(self.bel(pin.bel).site_index);
                let within: BTreeSet<BelPinId> =
                    self.forward_reach_sinks(pin.wire, Some(site)).into_iter().collect();
                let all = self.forward_reach_sinks(pin.wire, None);
                let reached: Vec<ClusterConnection> = all
                    .into_iter()
                    .map(|sink| ClusterConnection {
                        pin: sink,
                        within_site: within.contains(&sink),
                    })
                    .collect();
                for cc in &reached {
                    sources_of_sink.entry(cc.pin).or_default().push(ClusterConnection {
                        pin: id,
                        within_site: cc.within_site,
                    });
                }
                sinks_of_source.insert(id, reached);
            }
        }

        self.inputs_of_sink = inputs_of_sink;
        self.sinks_of_source = sinks_of_source;
        self.sources_of_sink = sources_of_sink.into_iter().collect();
    }

    /// Walks backwards from `start`, stopping at cluster inputs.
    fn reverse_reach_inputs(&self, start: WireId) -> Vec<WireId> {
        let mut found = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(wire) = queue.pop_front() {
            if !visited.insert(wire) {
                continue;
            }
            if self.is_input(wire) {
                found.insert(wire);
                continue;
            }
            for c in self.reverse_connections(wire) {
                if !c.is_route_through() {
                    queue.push_back(c.wire);
                }
            }
        }
        found.into_iter().collect()
    }

    /// Walks forwards from `start` collecting sink pins, optionally confined
    /// to the wires of one site. Never continues past a cluster output.
    fn forward_reach_sinks(&self, start: WireId, confine: Option<WireKind>) -> Vec<BelPinId> {
        let mut found = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(wire) = queue.pop_front() {
            if !visited.insert(wire) {
                continue;
            }
            found.extend(self.terminals(wire).iter().copied());
            if self.is_output(wire) {
                continue;
            }
            for c in self.connections(wire) {
                if c.is_route_through() {
                    continue;
                }
                if let Some(kind) = confine {
                    if self.wire(c.wire).kind != kind {
                        continue;
                    }
                }
                queue.push_back(c.wire);
            }
        }
        found.into_iter().collect()
    }
}

/// Incrementally describes a [`ClusterTemplate`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use kestrel_device::{ClusterTemplateBuilder, ConnectionKind, Device, DeviceFamily, PinDirection};
///
/// let mut device = Device::new(DeviceFamily::Generic);
/// let pins = vec![
///     device.pin("I", PinDirection::In, true),
///     device.pin("O", PinDirection::Out, true),
/// ];
/// let buf = device.add_bel_type("BUF", pins);
/// let device = Arc::new(device);
///
/// let mut b = ClusterTemplateBuilder::new(device, 0, "CLB");
/// let input = b.tile_wire("IN").unwrap();
/// let pin_i = b.site_wire(0, "BUF.I").unwrap();
/// b.connect(input, pin_i, ConnectionKind::SitePin).unwrap();
/// b.add_input(input).unwrap();
/// let bel = b.bel(0, "BUF", buf).unwrap();
/// let sink = b.bind_pin(bel, "I", pin_i).unwrap();
/// let template = b.build().unwrap();
/// assert_eq!(template.inputs_of_sink(sink), &[input]);
/// ```
#[derive(Debug)]
pub struct ClusterTemplateBuilder {
    id: TemplateId,
    name: Ident,
    device: Arc<Device>,
    wires: Vec<Wire>,
    wire_lookup: HashMap<(WireKind, Ident), WireId>,
    bels: Vec<Bel>,
    bel_lookup: HashMap<(u32, Ident), BelId>,
    bel_pins: Vec<BelPin>,
    forward: Vec<Vec<Connection>>,
    inputs: BTreeSet<WireId>,
    outputs: BTreeSet<WireId>,
    direct_sinks: Vec<DirectConnection>,
    direct_sources: Vec<DirectConnection>,
    vcc_sources: BTreeSet<BelPinId>,
    gnd_sources: BTreeSet<BelPinId>,
}

impl ClusterTemplateBuilder {
    /// Starts a template with the given ID and name.
    pub fn new(device: Arc<Device>, id: u32, name: &str) -> Self {
        let name = device.intern(name);
        Self {
            id: TemplateId::from_raw(id),
            name,
            device,
            wires: Vec::new(),
            wire_lookup: HashMap::new(),
            bels: Vec::new(),
            bel_lookup: HashMap::new(),
            bel_pins: Vec::new(),
            forward: Vec::new(),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            direct_sinks: Vec::new(),
            direct_sources: Vec::new(),
            vcc_sources: BTreeSet::new(),
            gnd_sources: BTreeSet::new(),
        }
    }

    /// Returns the device.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Adds a tile wire.
    pub fn tile_wire(&mut self, name: &str) -> Result<WireId, TemplateError> {
        self.add_wire(WireKind::Tile, name)
    }

    /// Adds a wire internal to the site with the given index.
    pub fn site_wire(&mut self, site_index: u32, name: &str) -> Result<WireId, TemplateError> {
        self.add_wire(WireKind::Site(site_index), name)
    }

    fn add_wire(&mut self, kind: WireKind, name: &str) -> Result<WireId, TemplateError> {
        let ident = self.device.intern(name);
        if self.wire_lookup.contains_key(&(kind, ident)) {
            return Err(TemplateError::DuplicateWire(name.to_string()));
        }
        let id = WireId::from_raw(self.wires.len() as u32);
        self.wires.push(Wire { name: ident, kind });
        self.forward.push(Vec::new());
        self.wire_lookup.insert((kind, ident), id);
        Ok(id)
    }

    /// Adds a BEL of the given type to a site.
    pub fn bel(
        &mut self,
        site_index: u32,
        name: &str,
        bel_type: BelTypeId,
    ) -> Result<BelId, TemplateError> {
        let ident = self.device.intern(name);
        if self.bel_lookup.contains_key(&(site_index, ident)) {
            return Err(TemplateError::DuplicateBel {
                name: name.to_string(),
                site: site_index,
            });
        }
        let id = BelId::from_raw(self.bels.len() as u32);
        self.bels.push(Bel {
            name: ident,
            bel_type,
            site_index,
            pins: Vec::new(),
            lut: None,
        });
        self.bel_lookup.insert((site_index, ident), id);
        Ok(id)
    }

    /// Binds a pin of `bel` to the wire it drives or is fed by.
    pub fn bind_pin(
        &mut self,
        bel: BelId,
        pin: &str,
        wire: WireId,
    ) -> Result<BelPinId, TemplateError> {
        self.check_wire(wire)?;
        let bel_ref = self.bels.get(bel.index()).ok_or(TemplateError::UnknownBel(bel))?;
        let bel_name = self.device.name(bel_ref.name).to_string();
        let ident = self.device.intern(pin);
        let template = self
            .device
            .bel_type(bel_ref.bel_type)
            .pin(ident)
            .cloned()
            .ok_or_else(|| TemplateError::UnknownPin {
                bel: bel_name.clone(),
                pin: pin.to_string(),
            })?;
        if bel_ref
            .pins
            .iter()
            .any(|&p| self.bel_pins[p.index()].name == ident)
        {
            return Err(TemplateError::PinAlreadyBound {
                bel: bel_name,
                pin: pin.to_string(),
            });
        }

        let id = BelPinId::from_raw(self.bel_pins.len() as u32);
        self.bel_pins.push(BelPin {
            bel,
            name: ident,
            direction: template.direction,
            wire,
            template: PinTemplateRef {
                bel_type: bel_ref.bel_type,
                pin: ident,
            },
            drives_general_fabric: template.drives_general_fabric,
            driven_by_general_fabric: template.driven_by_general_fabric,
        });
        self.bels[bel.index()].pins.push(id);
        Ok(id)
    }

    /// Marks two BELs of one site as the 6- and 5-input halves of a LUT.
    pub fn pair_luts(&mut self, lut6: BelId, lut5: BelId) -> Result<(), TemplateError> {
        let (Some(six), Some(five)) = (self.bels.get(lut6.index()), self.bels.get(lut5.index()))
        else {
            return Err(TemplateError::InvalidLutPair(lut6, lut5));
        };
        if lut6 == lut5 || six.site_index != five.site_index {
            return Err(TemplateError::InvalidLutPair(lut6, lut5));
        }
        self.bels[lut6.index()].lut = Some(LutSlot {
            size: LutSize::Six,
            partner: lut5,
        });
        self.bels[lut5.index()].lut = Some(LutSlot {
            size: LutSize::Five,
            partner: lut6,
        });
        Ok(())
    }

    /// Adds a directed connection between two wires.
    pub fn connect(
        &mut self,
        from: WireId,
        to: WireId,
        kind: ConnectionKind,
    ) -> Result<(), TemplateError> {
        self.check_wire(from)?;
        self.check_wire(to)?;
        let conn = Connection { kind, wire: to };
        if !self.forward[from.index()].contains(&conn) {
            self.forward[from.index()].push(conn);
        }
        Ok(())
    }

    /// Marks a wire as a cluster input.
    pub fn add_input(&mut self, wire: WireId) -> Result<(), TemplateError> {
        self.check_wire(wire)?;
        self.inputs.insert(wire);
        Ok(())
    }

    /// Marks a wire as a cluster output.
    pub fn add_output(&mut self, wire: WireId) -> Result<(), TemplateError> {
        self.check_wire(wire)?;
        self.outputs.insert(wire);
        Ok(())
    }

    /// Adds a direct connection leaving the cluster.
    pub fn add_direct_sink(&mut self, dc: DirectConnection) -> Result<(), TemplateError> {
        self.check_direct(&dc)?;
        self.direct_sinks.push(dc);
        Ok(())
    }

    /// Adds a direct connection entering the cluster.
    pub fn add_direct_source(&mut self, dc: DirectConnection) -> Result<(), TemplateError> {
        self.check_direct(&dc)?;
        self.direct_sources.push(dc);
        Ok(())
    }

    /// Registers a pin as a logic-one tie-off.
    pub fn add_vcc_source(&mut self, pin: BelPinId) -> Result<(), TemplateError> {
        self.check_pin(pin)?;
        self.vcc_sources.insert(pin);
        Ok(())
    }

    /// Registers a pin as a logic-zero tie-off.
    pub fn add_gnd_source(&mut self, pin: BelPinId) -> Result<(), TemplateError> {
        self.check_pin(pin)?;
        self.gnd_sources.insert(pin);
        Ok(())
    }

    fn check_wire(&self, wire: WireId) -> Result<(), TemplateError> {
        if wire.index() < self.wires.len() {
            Ok(())
        } else {
            Err(TemplateError::UnknownWire(wire))
        }
    }

    fn check_pin(&self, pin: BelPinId) -> Result<(), TemplateError> {
        if pin.index() < self.bel_pins.len() {
            Ok(())
        } else {
            Err(TemplateError::UnknownBelPin(pin))
        }
    }

    fn check_direct(&self, dc: &DirectConnection) -> Result<(), TemplateError> {
        self.check_wire(dc.cluster_wire)?;
        self.check_pin(dc.cluster_pin)
    }

    /// Finishes the template, computing reverse adjacency, reachability
    /// summaries and pin groups.
    pub fn build(self) -> Result<ClusterTemplate, TemplateError> {
        let wire_count = self.wires.len();
        let mut reverse = vec![Vec::new(); wire_count];
        for (from, conns) in self.forward.iter().enumerate() {
            for c in conns {
                reverse[c.wire.index()].push(Connection {
                    kind: c.kind,
                    wire: WireId::from_raw(from as u32),
                });
            }
        }

        let mut terminals = vec![Vec::new(); wire_count];
        let mut drivers = vec![Vec::new(); wire_count];
        for (i, pin) in self.bel_pins.iter().enumerate() {
            let id = BelPinId::from_raw(i as u32);
            if pin.direction.is_sink() {
                terminals[pin.wire.index()].push(id);
            }
            if pin.direction.is_source() {
                drivers[pin.wire.index()].push(id);
            }
        }

        let mut template = ClusterTemplate {
            id: self.id,
            name: self.name,
            device: self.device,
            wires: self.wires,
            wire_lookup: self.wire_lookup,
            bels: self.bels,
            bel_lookup: self.bel_lookup,
            bel_pins: self.bel_pins,
            forward: self.forward,
            reverse,
            terminals,
            drivers,
            input_set: self.inputs.iter().copied().collect(),
            output_set: self.outputs.iter().copied().collect(),
            inputs: self.inputs.into_iter().collect(),
            outputs: self.outputs.into_iter().collect(),
            direct_sinks: self.direct_sinks,
            direct_sources: self.direct_sources,
            vcc_sources: self.vcc_sources.into_iter().collect(),
            gnd_sources: self.gnd_sources.into_iter().collect(),
            inputs_of_sink: HashMap::new(),
            sinks_of_source: HashMap::new(),
            sources_of_sink: HashMap::new(),
            pin_groups: Vec::new(),
            pin_group_of: HashMap::new(),
        };
        template.compute_reachability();
        let (groups, group_of) = build_pin_groups(&template);
        template.pin_groups = groups;
        template.pin_group_of = group_of;
        Ok(template)
    }
}
