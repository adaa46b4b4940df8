//! Small hand-built clusters shared by unit tests.

use crate::design::PackDesign;
use crate::ids::{CellId, ClusterId, LibCellId, NetId};
use crate::netlist::{LibCell, NetKind, Netlist};
use kestrel_device::{
    BelId, BelTypeId, ClusterTemplate, ClusterTemplateBuilder, ConnectionKind, Device,
    DeviceFamily, PinDirection, WireId,
};
use std::sync::Arc;

/// A one-site cluster with a LUT feeding a flip-flop.
///
/// ```text
/// IN0 ──> LUT.A1            LUT.O ──> OUT0
/// IN1 ──> LUT.A2            LUT.O ─┐
/// IN1 ─────────────────────────────┴─(mux)─> FF.D      FF.Q ──> OUT1
/// ```
pub(crate) struct Slice {
    pub design: PackDesign,
    pub cluster: ClusterId,
    pub lut_bel: BelId,
    pub ff_bel: BelId,
    pub lut_lib: LibCellId,
    pub ff_lib: LibCellId,
}

fn slice_device(lut_out_general: bool) -> (Device, BelTypeId, BelTypeId) {
    let mut device = Device::new(DeviceFamily::Generic);
    let lut_pins = vec![
        device.pin("A1", PinDirection::In, true),
        device.pin("A2", PinDirection::In, true),
        device.pin("O", PinDirection::Out, lut_out_general),
    ];
    let lut = device.add_bel_type("LUT", lut_pins);
    let ff_pins = vec![
        device.pin("D", PinDirection::In, true),
        device.pin("Q", PinDirection::Out, true),
    ];
    let ff = device.add_bel_type("FF", ff_pins);
    (device, lut, ff)
}

fn slice_template(device: Arc<Device>, lut: BelTypeId, ff: BelTypeId) -> ClusterTemplate {
    let mut b = ClusterTemplateBuilder::new(device, 0, "SLICE");
    let in0 = b.tile_wire("IN0").unwrap();
    let in1 = b.tile_wire("IN1").unwrap();
    let out0 = b.tile_wire("OUT0").unwrap();
    let out1 = b.tile_wire("OUT1").unwrap();
    let a1 = b.site_wire(0, "LUT.A1").unwrap();
    let a2 = b.site_wire(0, "LUT.A2").unwrap();
    let o = b.site_wire(0, "LUT.O").unwrap();
    let d = b.site_wire(0, "FF.D").unwrap();
    let q = b.site_wire(0, "FF.Q").unwrap();
    b.connect(in0, a1, ConnectionKind::SitePin).unwrap();
    b.connect(in1, a2, ConnectionKind::SitePin).unwrap();
    b.connect(o, d, ConnectionKind::Pip).unwrap();
    b.connect(in1, d, ConnectionKind::Pip).unwrap();
    b.connect(o, out0, ConnectionKind::SitePin).unwrap();
    b.connect(q, out1, ConnectionKind::SitePin).unwrap();
    b.add_input(in0).unwrap();
    b.add_input(in1).unwrap();
    b.add_output(out0).unwrap();
    b.add_output(out1).unwrap();
    let lut_bel = b.bel(0, "LUT", lut).unwrap();
    b.bind_pin(lut_bel, "A1", a1).unwrap();
    b.bind_pin(lut_bel, "A2", a2).unwrap();
    b.bind_pin(lut_bel, "O", o).unwrap();
    let ff_bel = b.bel(0, "FF", ff).unwrap();
    b.bind_pin(ff_bel, "D", d).unwrap();
    b.bind_pin(ff_bel, "Q", q).unwrap();
    b.build().unwrap()
}

pub(crate) fn slice() -> Slice {
    slice_with(true)
}

/// Like [`slice`], choosing whether the LUT output counts as reaching the
/// general fabric.
pub(crate) fn slice_with(lut_out_general: bool) -> Slice {
    let (device, lut, ff) = slice_device(lut_out_general);
    let device = Arc::new(device);
    let template = slice_template(device.clone(), lut, ff);
    slice_from(device, template, lut, ff, "LUT", "FF")
}

/// Wraps `template` in a one-cluster design with the slice library cells.
fn slice_from(
    device: Arc<Device>,
    template: ClusterTemplate,
    lut: BelTypeId,
    ff: BelTypeId,
    lut_bel: &str,
    ff_bel: &str,
) -> Slice {
    let a1 = device.intern("A1");
    let a2 = device.intern("A2");
    let o = device.intern("O");
    let d = device.intern("D");
    let q = device.intern("Q");
    let template = Arc::new(template);
    let lut_bel = template.bel_by_name(0, lut_bel).unwrap();
    let ff_bel = template.bel_by_name(0, ff_bel).unwrap();

    let mut netlist = Netlist::new();
    let lut_lib = netlist.add_lib_cell(
        LibCell::new("LUT1")
            .lut(1)
            .anchor(lut)
            .pin("I0", PinDirection::In, [(lut, vec![a1, a2])])
            .pin("O", PinDirection::Out, [(lut, vec![o])]),
    );
    let ff_lib = netlist.add_lib_cell(
        LibCell::new("FDRE")
            .anchor(ff)
            .pin("D", PinDirection::In, [(ff, vec![d])])
            .pin("Q", PinDirection::Out, [(ff, vec![q])]),
    );
    let mut design = PackDesign::new(device, netlist);
    let cluster = design.add_cluster("slice_0", template);
    Slice {
        design,
        cluster,
        lut_bel,
        ff_bel,
        lut_lib,
        ff_lib,
    }
}

impl Slice {
    pub fn add_cell(&mut self, name: &str, lib: LibCellId) -> CellId {
        self.design.netlist_mut().add_cell(name, lib)
    }

    pub fn net(&mut self, name: &str, kind: NetKind, pins: &[(CellId, &str)]) -> NetId {
        add_net(&mut self.design, name, kind, pins)
    }
}

fn add_net(design: &mut PackDesign, name: &str, kind: NetKind, pins: &[(CellId, &str)]) -> NetId {
    let nl = design.netlist_mut();
    let net = nl.add_net(name, kind);
    for &(cell, pin) in pins {
        let p = nl.cell_pin(cell, pin).unwrap();
        nl.connect(net, p).unwrap();
    }
    net
}

/// A slice whose two LUTs reach two flip-flops only through the tile wire
/// `M`. The wrapped [`Slice`] names `L0` and `F0`.
pub(crate) struct Shared {
    pub slice: Slice,
    pub lut1: BelId,
    pub ff1: BelId,
    pub m: WireId,
}

pub(crate) fn shared() -> Shared {
    let (device, lut, ff) = slice_device(true);
    let device = Arc::new(device);
    let mut b = ClusterTemplateBuilder::new(device.clone(), 0, "SHARED");
    let m = b.tile_wire("M").unwrap();
    for i in 0..2 {
        let o = b.site_wire(0, &format!("L{i}.O")).unwrap();
        let d = b.site_wire(0, &format!("F{i}.D")).unwrap();
        b.connect(o, m, ConnectionKind::Pip).unwrap();
        b.connect(m, d, ConnectionKind::Pip).unwrap();
        let l = b.bel(0, &format!("L{i}"), lut).unwrap();
        b.bind_pin(l, "O", o).unwrap();
        let f = b.bel(0, &format!("F{i}"), ff).unwrap();
        b.bind_pin(f, "D", d).unwrap();
    }
    let template = b.build().unwrap();
    let lut1 = template.bel_by_name(0, "L1").unwrap();
    let ff1 = template.bel_by_name(0, "F1").unwrap();
    Shared {
        slice: slice_from(device, template, lut, ff, "L0", "F0"),
        lut1,
        ff1,
        m,
    }
}

/// One site holding a fracturable LUT, `A6LUT` paired with `A5LUT`, and a
/// flip-flop. Both LUT outputs are VCC tie-offs.
///
/// ```text
/// IN0 ──> A6LUT.A6          A6LUT.O ─┐
/// IN1 ──> A6LUT.A1          A5LUT.O ─┴─(mux)─> FF.D
/// ```
pub(crate) struct LutPair {
    pub design: PackDesign,
    pub cluster: ClusterId,
    pub lut6: BelId,
    pub lut5: BelId,
    pub ff_bel: BelId,
    /// Five-input LUT cells; widen with `set_lut_inputs`.
    pub lut_lib: LibCellId,
    pub ff_lib: LibCellId,
}

pub(crate) fn lut_pair() -> LutPair {
    let mut device = Device::new(DeviceFamily::Generic);
    let lut_pins = vec![
        device.pin("A1", PinDirection::In, true),
        device.pin("A6", PinDirection::In, true),
        device.pin("O", PinDirection::Out, true),
    ];
    let lut = device.add_bel_type("LUT", lut_pins);
    let ff_pins = vec![device.pin("D", PinDirection::In, true)];
    let ff = device.add_bel_type("FF", ff_pins);
    let a1 = device.intern("A1");
    let a6 = device.intern("A6");
    let o = device.intern("O");
    let d = device.intern("D");
    let device = Arc::new(device);

    let mut b = ClusterTemplateBuilder::new(device.clone(), 0, "FRACTURED");
    let in0 = b.tile_wire("IN0").unwrap();
    let in1 = b.tile_wire("IN1").unwrap();
    let a6_wire = b.site_wire(0, "A6LUT.A6").unwrap();
    let a1_wire = b.site_wire(0, "A6LUT.A1").unwrap();
    let o6 = b.site_wire(0, "A6LUT.O").unwrap();
    let o5 = b.site_wire(0, "A5LUT.O").unwrap();
    let d_wire = b.site_wire(0, "FF.D").unwrap();
    b.connect(in0, a6_wire, ConnectionKind::SitePin).unwrap();
    b.connect(in1, a1_wire, ConnectionKind::SitePin).unwrap();
    b.connect(o6, d_wire, ConnectionKind::Pip).unwrap();
    b.connect(o5, d_wire, ConnectionKind::Pip).unwrap();
    b.add_input(in0).unwrap();
    b.add_input(in1).unwrap();
    let lut6 = b.bel(0, "A6LUT", lut).unwrap();
    b.bind_pin(lut6, "A6", a6_wire).unwrap();
    b.bind_pin(lut6, "A1", a1_wire).unwrap();
    let vcc6 = b.bind_pin(lut6, "O", o6).unwrap();
    let lut5 = b.bel(0, "A5LUT", lut).unwrap();
    let vcc5 = b.bind_pin(lut5, "O", o5).unwrap();
    b.pair_luts(lut6, lut5).unwrap();
    b.add_vcc_source(vcc6).unwrap();
    b.add_vcc_source(vcc5).unwrap();
    let ff_bel = b.bel(0, "FF", ff).unwrap();
    b.bind_pin(ff_bel, "D", d_wire).unwrap();
    let template = Arc::new(b.build().unwrap());

    let mut netlist = Netlist::new();
    let lut_lib = netlist.add_lib_cell(
        LibCell::new("LUT5")
            .lut(5)
            .anchor(lut)
            .pin("I0", PinDirection::In, [(lut, vec![a6, a1])])
            .pin("O", PinDirection::Out, [(lut, vec![o])]),
    );
    let ff_lib = netlist.add_lib_cell(
        LibCell::new("FDRE")
            .anchor(ff)
            .pin("D", PinDirection::In, [(ff, vec![d])]),
    );
    let mut design = PackDesign::new(device, netlist);
    let cluster = design.add_cluster("slice_0", template);
    LutPair {
        design,
        cluster,
        lut6,
        lut5,
        ff_bel,
        lut_lib,
        ff_lib,
    }
}

impl LutPair {
    pub fn add_cell(&mut self, name: &str, lib: LibCellId) -> CellId {
        self.design.netlist_mut().add_cell(name, lib)
    }

    pub fn net(&mut self, name: &str, kind: NetKind, pins: &[(CellId, &str)]) -> NetId {
        add_net(&mut self.design, name, kind, pins)
    }
}
