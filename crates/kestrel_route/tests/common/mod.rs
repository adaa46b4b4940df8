//! Hand-built cluster templates shared by the integration tests.
//!
//! Every template has one site (index 0) holding LUT BELs named `L*` with an
//! `O` output and flip-flop BELs named `F*` with a `D` input. BEL pin wires
//! are site wires named `<bel>.<pin>`; everything else is a tile wire.

#![allow(dead_code)]

use kestrel_device::{
    BelId, BelTypeId, ClusterTemplate, ClusterTemplateBuilder, ConnectionKind, Device,
    DeviceFamily, DirectConnection, PinDirection, PinTemplateRef, WireId,
};
use kestrel_route::{
    CellId, CellPinId, ClusterId, LibCell, LibCellId, NetId, NetKind, Netlist, PackDesign,
};
use std::collections::HashMap;
use std::sync::Arc;

/// A device with a LUT type, a flip-flop type and a carry type whose chain
/// pins never touch the general fabric.
pub struct Kit {
    pub device: Arc<Device>,
    pub lut: BelTypeId,
    pub ff: BelTypeId,
    pub carry: BelTypeId,
}

/// `ff_d_general` decides whether flip-flop inputs are reachable from the
/// general fabric.
pub fn kit(ff_d_general: bool) -> Kit {
    let mut device = Device::new(DeviceFamily::Generic);
    let lut_pins = vec![
        device.pin("O", PinDirection::Out, true),
        device.pin("I", PinDirection::In, true),
    ];
    let lut = device.add_bel_type("LUT", lut_pins);
    let ff_pins = vec![device.pin("D", PinDirection::In, ff_d_general)];
    let ff = device.add_bel_type("FF", ff_pins);
    let carry_pins = vec![
        device.pin("CIN", PinDirection::In, false),
        device.pin("COUT", PinDirection::Out, false),
    ];
    let carry = device.add_bel_type("CARRY", carry_pins);
    Kit {
        device: Arc::new(device),
        lut,
        ff,
        carry,
    }
}

/// Builds a template from BEL names and PIPs between wire names. Names in
/// `inputs` become cluster inputs; any other PIP endpoint that is not a BEL
/// pin wire becomes a tile wire on first use.
fn template(
    kit: &Kit,
    name: &str,
    inputs: &[&str],
    luts: &[&str],
    ffs: &[&str],
    pips: &[(&str, &str)],
) -> ClusterTemplate {
    let mut b = ClusterTemplateBuilder::new(Arc::clone(&kit.device), 0, name);
    let mut wires: HashMap<String, WireId> = HashMap::new();
    for &input in inputs {
        let w = b.tile_wire(input).unwrap();
        b.add_input(w).unwrap();
        wires.insert(input.to_string(), w);
    }
    for (bels, bel_type, pin) in [(luts, kit.lut, "O"), (ffs, kit.ff, "D")] {
        for &name in bels {
            let bel = b.bel(0, name, bel_type).unwrap();
            let wire_name = format!("{name}.{pin}");
            let w = b.site_wire(0, &wire_name).unwrap();
            b.bind_pin(bel, pin, w).unwrap();
            wires.insert(wire_name, w);
        }
    }
    for &(from, to) in pips {
        let from = wire_of(&mut b, &mut wires, from);
        let to = wire_of(&mut b, &mut wires, to);
        b.connect(from, to, ConnectionKind::Pip).unwrap();
    }
    b.build().unwrap()
}

fn wire_of(
    b: &mut ClusterTemplateBuilder,
    wires: &mut HashMap<String, WireId>,
    name: &str,
) -> WireId {
    if let Some(&w) = wires.get(name) {
        return w;
    }
    let w = b.tile_wire(name).unwrap();
    wires.insert(name.to_string(), w);
    w
}

/// `L.O` feeds `F.D` through one PIP.
pub fn direct_pair(kit: &Kit) -> ClusterTemplate {
    template(kit, "PAIR", &[], &["L"], &["F"], &[("L.O", "F.D")])
}

/// Both LUTs reach both flip-flops only through the tile wire `M`.
pub fn shared_wire(kit: &Kit) -> ClusterTemplate {
    template(
        kit,
        "SHARED",
        &[],
        &["L0", "L1"],
        &["F0", "F1"],
        &[("L0.O", "M"), ("L1.O", "M"), ("M", "F0.D"), ("M", "F1.D")],
    )
}

/// `L0` reaches `F0` through `MA` or `MB`; `L1` reaches `F1` only through
/// `MA`.
pub fn two_paths(kit: &Kit) -> ClusterTemplate {
    template(
        kit,
        "PATHS",
        &[],
        &["L0", "L1"],
        &["F0", "F1"],
        &[
            ("L0.O", "MA"),
            ("L0.O", "MB"),
            ("L1.O", "MA"),
            ("MA", "F0.D"),
            ("MB", "F0.D"),
            ("MA", "F1.D"),
        ],
    )
}

/// `L.O` fans out to `F0.D` and `F1.D`.
pub fn fanout(kit: &Kit) -> ClusterTemplate {
    template(
        kit,
        "FANOUT",
        &[],
        &["L"],
        &["F0", "F1"],
        &[("L.O", "F0.D"), ("L.O", "F1.D")],
    )
}

/// Two multiplexers: `F0.D` selects `IN0` or `L.O`, `F1.D` selects `IN1` or
/// `L.O`.
pub fn two_muxes(kit: &Kit) -> ClusterTemplate {
    template(
        kit,
        "MUXES",
        &["IN0", "IN1"],
        &["L"],
        &["F0", "F1"],
        &[
            ("IN0", "F0.D"),
            ("L.O", "F0.D"),
            ("IN1", "F1.D"),
            ("L.O", "F1.D"),
        ],
    )
}

/// Three LUTs and three flip-flops joined through two shared wires.
pub fn crossbar(kit: &Kit) -> ClusterTemplate {
    let mut pips = Vec::new();
    for l in ["L0.O", "L1.O", "L2.O"] {
        for m in ["M0", "M1"] {
            pips.push((l, m));
        }
    }
    for m in ["M0", "M1"] {
        for f in ["F0.D", "F1.D", "F2.D"] {
            pips.push((m, f));
        }
    }
    template(kit, "XBAR", &[], &["L0", "L1", "L2"], &["F0", "F1", "F2"], &pips)
}

/// One site with a carry BEL `C`, a LUT `L` and a flip-flop `F`, linked to
/// neighbouring clusters by direct connections:
///
/// ```text
/// C.COUT ──> COUT_EXIT          (to a neighbour's C.CIN)
/// L.O ──> LINK                  (to a neighbour's F.D)
/// L.O ──> OUT                   (general output)
/// CIN_A ──> X ──> C.CIN <── CIN_B   (both from a neighbour's C.COUT)
/// ```
pub fn carry_chain(kit: &Kit) -> ClusterTemplate {
    let device = &kit.device;
    let mut b = ClusterTemplateBuilder::new(Arc::clone(device), 0, "CHAIN");
    let cin_a = b.tile_wire("CIN_A").unwrap();
    let cin_b = b.tile_wire("CIN_B").unwrap();
    let x = b.tile_wire("X").unwrap();
    let cout_exit = b.tile_wire("COUT_EXIT").unwrap();
    let link = b.tile_wire("LINK").unwrap();
    let out = b.tile_wire("OUT").unwrap();
    let cin = b.site_wire(0, "C.CIN").unwrap();
    let cout = b.site_wire(0, "C.COUT").unwrap();
    let lo = b.site_wire(0, "L.O").unwrap();
    let fd = b.site_wire(0, "F.D").unwrap();
    for (from, to) in [(cin_a, x), (x, cin), (cin_b, cin)] {
        b.connect(from, to, ConnectionKind::Pip).unwrap();
    }
    b.connect(cout, cout_exit, ConnectionKind::Wire).unwrap();
    b.connect(lo, link, ConnectionKind::Wire).unwrap();
    b.connect(lo, out, ConnectionKind::SitePin).unwrap();
    b.add_output(out).unwrap();

    let c = b.bel(0, "C", kit.carry).unwrap();
    let cin_pin = b.bind_pin(c, "CIN", cin).unwrap();
    let cout_pin = b.bind_pin(c, "COUT", cout).unwrap();
    let l = b.bel(0, "L", kit.lut).unwrap();
    let lo_pin = b.bind_pin(l, "O", lo).unwrap();
    let f = b.bel(0, "F", kit.ff).unwrap();
    b.bind_pin(f, "D", fd).unwrap();

    let far = |bel_type, pin: &str| PinTemplateRef {
        bel_type,
        pin: device.intern(pin),
    };
    b.add_direct_sink(DirectConnection {
        cluster_wire: cout_exit,
        cluster_pin: cout_pin,
        end_pin: far(kit.carry, "CIN"),
        end_site_index: 0,
    })
    .unwrap();
    b.add_direct_sink(DirectConnection {
        cluster_wire: link,
        cluster_pin: lo_pin,
        end_pin: far(kit.ff, "D"),
        end_site_index: 0,
    })
    .unwrap();
    for wire in [cin_a, cin_b] {
        b.add_direct_source(DirectConnection {
            cluster_wire: wire,
            cluster_pin: cin_pin,
            end_pin: far(kit.carry, "COUT"),
            end_site_index: 0,
        })
        .unwrap();
    }
    b.build().unwrap()
}

/// A design with one cluster of a given template plus LUT, flip-flop and
/// carry library cells.
pub struct Bench {
    pub design: PackDesign,
    pub cluster: ClusterId,
    pub template: Arc<ClusterTemplate>,
    pub lut_lib: LibCellId,
    pub ff_lib: LibCellId,
    pub carry_lib: LibCellId,
}

impl Bench {
    pub fn new(kit: &Kit, template: ClusterTemplate) -> Self {
        let o = kit.device.intern("O");
        let i = kit.device.intern("I");
        let d = kit.device.intern("D");
        let cin = kit.device.intern("CIN");
        let cout = kit.device.intern("COUT");
        let mut netlist = Netlist::new();
        let lut_lib = netlist.add_lib_cell(
            LibCell::new("LUT1")
                .lut(1)
                .anchor(kit.lut)
                .pin("O", PinDirection::Out, [(kit.lut, vec![o])])
                .pin("I0", PinDirection::In, [(kit.lut, vec![i])]),
        );
        let ff_lib = netlist.add_lib_cell(
            LibCell::new("FDRE")
                .anchor(kit.ff)
                .pin("D", PinDirection::In, [(kit.ff, vec![d])]),
        );
        let carry_lib = netlist.add_lib_cell(
            LibCell::new("CARRY4")
                .anchor(kit.carry)
                .pin("CI", PinDirection::In, [(kit.carry, vec![cin])])
                .pin("CO", PinDirection::Out, [(kit.carry, vec![cout])]),
        );
        let template = Arc::new(template);
        let mut design = PackDesign::new(Arc::clone(&kit.device), netlist);
        let cluster = design.add_cluster("c0", Arc::clone(&template));
        Self {
            design,
            cluster,
            template,
            lut_lib,
            ff_lib,
            carry_lib,
        }
    }

    /// Another instance of the same template.
    pub fn add_cluster(&mut self, name: &str) -> ClusterId {
        self.design.add_cluster(name, Arc::clone(&self.template))
    }

    pub fn bel(&self, name: &str) -> BelId {
        self.template.bel_by_name(0, name).unwrap()
    }

    pub fn wire(&self, name: &str) -> WireId {
        self.template
            .site_wire(0, name)
            .or_else(|| self.template.tile_wire(name))
            .unwrap()
    }

    pub fn lut(&mut self, name: &str) -> CellId {
        let lib = self.lut_lib;
        self.design.netlist_mut().add_cell(name, lib)
    }

    pub fn ff(&mut self, name: &str) -> CellId {
        let lib = self.ff_lib;
        self.design.netlist_mut().add_cell(name, lib)
    }

    pub fn pin(&self, cell: CellId, name: &str) -> CellPinId {
        self.design.netlist().cell_pin(cell, name).unwrap()
    }

    pub fn carry(&mut self, name: &str) -> CellId {
        let lib = self.carry_lib;
        self.design.netlist_mut().add_cell(name, lib)
    }

    /// Connects `driver` to every pin of `sinks`.
    pub fn connect(
        &mut self,
        name: &str,
        driver: (CellId, &str),
        sinks: &[(CellId, &str)],
    ) -> NetId {
        let pins: Vec<CellPinId> = std::iter::once(driver)
            .chain(sinks.iter().copied())
            .map(|(cell, pin)| self.pin(cell, pin))
            .collect();
        let nl = self.design.netlist_mut();
        let net = nl.add_net(name, NetKind::Signal);
        for pin in pins {
            nl.connect(net, pin).unwrap();
        }
        net
    }

    /// Connects a LUT output to a flip-flop input.
    pub fn net(&mut self, name: &str, lut: CellId, ff: CellId) -> NetId {
        let o = self.pin(lut, "O");
        let d = self.pin(ff, "D");
        let nl = self.design.netlist_mut();
        let net = nl.add_net(name, NetKind::Signal);
        nl.connect(net, o).unwrap();
        nl.connect(net, d).unwrap();
        net
    }

    pub fn place(&mut self, cell: CellId, bel: &str) {
        let bel = self.bel(bel);
        self.design.place(cell, self.cluster, bel).unwrap();
    }
}
