//! Structural elements of a cluster template: BELs, pins, wires and the
//! connections between them.

use crate::ids::{BelId, BelPinId, BelTypeId, WireId};
use kestrel_common::Ident;
use serde::{Deserialize, Serialize};

/// Device family, used to enable family-specific routing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// No family-specific rules.
    Generic,
    /// Xilinx Virtex-6 (SLICEM shift-register DI multiplexers).
    Virtex6,
}

/// Direction of a BEL pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    /// Input pin (a routing sink).
    In,
    /// Output pin (a routing source).
    Out,
    /// Bidirectional pin.
    InOut,
}

impl PinDirection {
    /// Returns `true` if a pin of this direction can drive a wire.
    pub fn is_source(self) -> bool {
        matches!(self, PinDirection::Out | PinDirection::InOut)
    }

    /// Returns `true` if a pin of this direction can be driven by a wire.
    pub fn is_sink(self) -> bool {
        matches!(self, PinDirection::In | PinDirection::InOut)
    }
}

/// A pin of a BEL type, shared by every BEL of that type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BelPinTemplate {
    /// Pin name.
    pub name: Ident,
    /// Pin direction.
    pub direction: PinDirection,
    /// The pin can reach the general routing fabric outside its cluster.
    pub drives_general_fabric: bool,
    /// The pin can be reached from the general routing fabric.
    pub driven_by_general_fabric: bool,
}

/// A kind of BEL, e.g. a 6-input LUT or a flip-flop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelType {
    /// Type name.
    pub name: Ident,
    /// Pins of every BEL of this type.
    pub pins: Vec<BelPinTemplate>,
}

impl BelType {
    /// Looks up a pin template by name.
    pub fn pin(&self, name: Ident) -> Option<&BelPinTemplate> {
        self.pins.iter().find(|p| p.name == name)
    }
}

/// Names a pin of a BEL type independently of any template instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PinTemplateRef {
    /// The BEL type.
    pub bel_type: BelTypeId,
    /// The pin name on that type.
    pub pin: Ident,
}

/// Width of a fracturable LUT BEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LutSize {
    /// The 5-input half of a LUT pair.
    Five,
    /// The 6-input LUT of a pair.
    Six,
}

/// Links a LUT BEL to the other half of its 5/6 pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LutSlot {
    /// Which half this BEL is.
    pub size: LutSize,
    /// The other half of the pair.
    pub partner: BelId,
}

/// A BEL instance inside a cluster template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bel {
    /// BEL name, unique within its site.
    pub name: Ident,
    /// The BEL's type.
    pub bel_type: BelTypeId,
    /// Index of the site within the cluster.
    pub site_index: u32,
    /// Pins bound to wires.
    pub pins: Vec<BelPinId>,
    /// LUT pairing, if the BEL is half of a fracturable LUT.
    pub lut: Option<LutSlot>,
}

/// A pin of a BEL instance, bound to the wire it drives or is fed by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelPin {
    /// Owning BEL.
    pub bel: BelId,
    /// Pin name.
    pub name: Ident,
    /// Pin direction.
    pub direction: PinDirection,
    /// The wire this pin is attached to.
    pub wire: WireId,
    /// The pin template of the owning BEL's type.
    pub template: PinTemplateRef,
    /// Copied from the pin template.
    pub drives_general_fabric: bool,
    /// Copied from the pin template.
    pub driven_by_general_fabric: bool,
}

/// Where a wire lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireKind {
    /// A tile-level routing wire.
    Tile,
    /// A wire internal to the site with the given index.
    Site(u32),
}

/// A routing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wire {
    /// Wire name.
    pub name: Ident,
    /// Tile or site wire.
    pub kind: WireKind,
}

/// How one wire reaches the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// A fixed wire-to-wire connection.
    Wire,
    /// A programmable interconnect point; a wire fed by several PIPs is a
    /// multiplexer.
    Pip,
    /// A site pin crossing between tile and site wires.
    SitePin,
    /// A path through an unused BEL.
    RouteThrough,
}

/// A directed edge of the template graph.
///
/// In reverse adjacency lists `wire` names the driving wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Connection kind.
    pub kind: ConnectionKind,
    /// The wire at the other end.
    pub wire: WireId,
}

impl Connection {
    /// Returns `true` for route-through connections.
    pub fn is_route_through(&self) -> bool {
        self.kind == ConnectionKind::RouteThrough
    }
}

/// A dedicated link (e.g. a carry chain) between a pin inside the cluster and
/// a pin of a neighbouring cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectConnection {
    /// The boundary wire of this cluster (exit for direct sinks, entry for
    /// direct sources).
    pub cluster_wire: WireId,
    /// The pin inside this cluster.
    pub cluster_pin: BelPinId,
    /// The pin at the far end, in the neighbouring cluster.
    pub end_pin: PinTemplateRef,
    /// Site index of the far-end pin within its cluster.
    pub end_site_index: u32,
}

/// A BEL pin reachable from another inside the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterConnection {
    /// The reached pin.
    pub pin: BelPinId,
    /// Whether the path stays inside one site.
    pub within_site: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_direction_roles() {
        assert!(PinDirection::Out.is_source());
        assert!(!PinDirection::Out.is_sink());
        assert!(PinDirection::In.is_sink());
        assert!(PinDirection::InOut.is_source() && PinDirection::InOut.is_sink());
    }

    #[test]
    fn bel_type_pin_lookup() {
        let a = Ident::from_raw(0);
        let o = Ident::from_raw(1);
        let ty = BelType {
            name: Ident::from_raw(2),
            pins: vec![
                BelPinTemplate {
                    name: a,
                    direction: PinDirection::In,
                    drives_general_fabric: false,
                    driven_by_general_fabric: true,
                },
                BelPinTemplate {
                    name: o,
                    direction: PinDirection::Out,
                    drives_general_fabric: true,
                    driven_by_general_fabric: false,
                },
            ],
        };
        assert_eq!(ty.pin(o).map(|p| p.direction), Some(PinDirection::Out));
        assert!(ty.pin(Ident::from_raw(9)).is_none());
    }

    #[test]
    fn route_through_flag() {
        let c = Connection {
            kind: ConnectionKind::RouteThrough,
            wire: WireId::from_raw(0),
        };
        assert!(c.is_route_through());
    }
}
