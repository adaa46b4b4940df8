//! The packing netlist: library cells, cells, cell pins and nets.
//!
//! The netlist is owned by the packer. The router only reads it, through a
//! [`PackDesign`](crate::design::PackDesign), to learn which pins each net
//! connects and which BEL pins a cell pin may be mapped onto.

use crate::ids::{CellId, CellPinId, LibCellId, NetId};
use kestrel_common::Ident;
use kestrel_device::{BelTypeId, PinDirection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a LUT-capable cell uses its BEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Plain lookup table.
    Lut,
    /// Distributed RAM.
    Ram,
    /// Shift register (SRL).
    ShiftRegister,
    /// Not a lookup-table cell at all.
    Fixed,
}

/// Kind of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetKind {
    /// An ordinary signal with one driving cell pin.
    Signal,
    /// Constant one, tied off inside the cluster.
    Vcc,
    /// Constant zero, tied off inside the cluster.
    Gnd,
}

impl NetKind {
    /// Returns `true` for VCC and GND nets.
    pub fn is_static(self) -> bool {
        !matches!(self, NetKind::Signal)
    }
}

/// A pin of a library cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibPin {
    /// Pin name.
    pub name: String,
    /// Pin direction.
    pub direction: PinDirection,
    /// For each BEL type the cell can occupy, the BEL pin names this pin may
    /// be mapped onto.
    pub bel_pins: BTreeMap<BelTypeId, Vec<Ident>>,
}

/// A library cell: the type shared by every cell instance of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibCell {
    /// Library cell name.
    pub name: String,
    /// Number of LUT inputs, for lookup-table cells.
    pub lut_inputs: Option<u8>,
    /// BEL types the cell may be placed on.
    pub anchors: Vec<BelTypeId>,
    /// Pins, in declaration order.
    pub pins: Vec<LibPin>,
}

impl LibCell {
    /// Creates a library cell with no pins and no anchors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lut_inputs: None,
            anchors: Vec::new(),
            pins: Vec::new(),
        }
    }

    /// Marks the cell as a lookup table with `inputs` inputs.
    pub fn lut(mut self, inputs: u8) -> Self {
        self.lut_inputs = Some(inputs);
        self
    }

    /// Adds a BEL type the cell may be placed on.
    pub fn anchor(mut self, bel_type: BelTypeId) -> Self {
        if !self.anchors.contains(&bel_type) {
            self.anchors.push(bel_type);
        }
        self
    }

    /// Adds a pin with its per-BEL-type pin name mappings.
    pub fn pin(
        mut self,
        name: impl Into<String>,
        direction: PinDirection,
        mappings: impl IntoIterator<Item = (BelTypeId, Vec<Ident>)>,
    ) -> Self {
        self.pins.push(LibPin {
            name: name.into(),
            direction,
            bel_pins: mappings.into_iter().collect(),
        });
        self
    }

    /// Returns `true` for lookup-table cells.
    pub fn is_lut(&self) -> bool {
        self.lut_inputs.is_some()
    }

    /// Returns `true` if the cell may be placed on `bel_type`.
    pub fn can_anchor(&self, bel_type: BelTypeId) -> bool {
        self.anchors.contains(&bel_type)
    }
}

/// A cell instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// The ID assigned by the netlist.
    pub id: CellId,
    /// Instance name.
    pub name: String,
    /// Library cell.
    pub lib: LibCellId,
    /// LUT operating mode.
    pub mode: OperatingMode,
    /// Per-instance override of the number of used LUT inputs.
    pub lut_inputs: Option<u8>,
    /// Pins, in library pin order.
    pub pins: Vec<CellPinId>,
}

/// A pin of a cell instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPin {
    /// The ID assigned by the netlist.
    pub id: CellPinId,
    /// Owning cell.
    pub cell: CellId,
    /// Index into the library cell's pins.
    pub lib_pin: usize,
    /// Pin name.
    pub name: String,
    /// Pin direction.
    pub direction: PinDirection,
    /// Connected net, if any.
    pub net: Option<NetId>,
}

/// A net connecting one source pin to any number of sink pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    /// The ID assigned by the netlist.
    pub id: NetId,
    /// Net name.
    pub name: String,
    /// Signal or constant.
    pub kind: NetKind,
    /// Driving pin. Always `None` for static nets.
    pub source: Option<CellPinId>,
    /// Driven pins.
    pub sinks: Vec<CellPinId>,
}

impl Net {
    /// All pins of the net, source first.
    pub fn pins(&self) -> impl Iterator<Item = CellPinId> + '_ {
        self.source.into_iter().chain(self.sinks.iter().copied())
    }
}

/// Errors raised while building a netlist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetlistError {
    /// The pin is already connected to a net.
    #[error("pin {pin} is already connected to a net")]
    PinAlreadyConnected {
        /// The pin.
        pin: CellPinId,
    },
    /// A second output pin was connected to a signal net.
    #[error("net {net} already has a source")]
    MultipleSources {
        /// The net.
        net: NetId,
    },
    /// An output pin was connected to a VCC or GND net.
    #[error("static net {net} cannot be driven by a cell pin")]
    DrivenStaticNet {
        /// The net.
        net: NetId,
    },
}

/// The packing netlist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Netlist {
    /// All library cells.
    pub lib_cells: Vec<LibCell>,
    /// All cells.
    pub cells: Vec<Cell>,
    /// All cell pins.
    pub pins: Vec<CellPin>,
    /// All nets.
    pub nets: Vec<Net>,
}

impl Netlist {
    /// Creates an empty netlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a library cell and returns its ID.
    pub fn add_lib_cell(&mut self, lib: LibCell) -> LibCellId {
        let id = LibCellId::from_raw(self.lib_cells.len() as u32);
        self.lib_cells.push(lib);
        id
    }

    /// Instantiates `lib`, creating one unconnected pin per library pin.
    pub fn add_cell(&mut self, name: impl Into<String>, lib: LibCellId) -> CellId {
        let id = CellId::from_raw(self.cells.len() as u32);
        let lib_cell = &self.lib_cells[lib.index()];
        let mode = if lib_cell.is_lut() {
            OperatingMode::Lut
        } else {
            OperatingMode::Fixed
        };
        let mut pins = Vec::with_capacity(lib_cell.pins.len());
        for (index, lib_pin) in lib_cell.pins.iter().enumerate() {
            let pin_id = CellPinId::from_raw(self.pins.len() as u32);
            self.pins.push(CellPin {
                id: pin_id,
                cell: id,
                lib_pin: index,
                name: lib_pin.name.clone(),
                direction: lib_pin.direction,
                net: None,
            });
            pins.push(pin_id);
        }
        self.cells.push(Cell {
            id,
            name: name.into(),
            lib,
            mode,
            lut_inputs: None,
            pins,
        });
        id
    }

    /// Adds an empty net and returns its ID.
    pub fn add_net(&mut self, name: impl Into<String>, kind: NetKind) -> NetId {
        let id = NetId::from_raw(self.nets.len() as u32);
        self.nets.push(Net {
            id,
            name: name.into(),
            kind,
            source: None,
            sinks: Vec::new(),
        });
        id
    }

    /// Connects `pin` to `net`. Output pins become the net's source, all
    /// other pins become sinks.
    pub fn connect(&mut self, net: NetId, pin: CellPinId) -> Result<(), NetlistError> {
        if self.pins[pin.index()].net.is_some() {
            return Err(NetlistError::PinAlreadyConnected { pin });
        }
        let direction = self.pins[pin.index()].direction;
        let n = &mut self.nets[net.index()];
        if direction == PinDirection::Out {
            if n.kind.is_static() {
                return Err(NetlistError::DrivenStaticNet { net });
            }
            if n.source.is_some() {
                return Err(NetlistError::MultipleSources { net });
            }
            n.source = Some(pin);
        } else {
            n.sinks.push(pin);
        }
        self.pins[pin.index()].net = Some(net);
        Ok(())
    }

    /// Sets the operating mode of a cell.
    pub fn set_mode(&mut self, cell: CellId, mode: OperatingMode) {
        self.cells[cell.index()].mode = mode;
    }

    /// Overrides the number of LUT inputs a cell uses.
    pub fn set_lut_inputs(&mut self, cell: CellId, inputs: u8) {
        self.cells[cell.index()].lut_inputs = Some(inputs);
    }

    /// Returns the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    /// Returns the pin with the given ID.
    pub fn pin(&self, id: CellPinId) -> &CellPin {
        &self.pins[id.index()]
    }

    /// Returns the net with the given ID.
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    /// Returns the library cell with the given ID.
    pub fn lib_cell(&self, id: LibCellId) -> &LibCell {
        &self.lib_cells[id.index()]
    }

    /// Returns the library cell of `cell`.
    pub fn lib_of(&self, cell: CellId) -> &LibCell {
        self.lib_cell(self.cell(cell).lib)
    }

    /// Finds a pin of `cell` by name.
    pub fn cell_pin(&self, cell: CellId, name: &str) -> Option<CellPinId> {
        self.cell(cell)
            .pins
            .iter()
            .copied()
            .find(|&p| self.pin(p).name == name)
    }

    /// Number of LUT inputs `cell` uses, preferring the instance override.
    pub fn lut_inputs(&self, cell: CellId) -> Option<u8> {
        let c = self.cell(cell);
        c.lut_inputs.or(self.lib_cell(c.lib).lut_inputs)
    }

    /// BEL pin names `pin` may map onto when its cell sits on `bel_type`.
    pub fn possible_pin_names(&self, pin: CellPinId, bel_type: BelTypeId) -> &[Ident] {
        let p = self.pin(pin);
        self.lib_of(p.cell).pins[p.lib_pin]
            .bel_pins
            .get(&bel_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
