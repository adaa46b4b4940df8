//! Opaque ID newtypes for packing-side entities.
//!
//! [`CellId`], [`CellPinId`], [`NetId`], [`LibCellId`] and [`ClusterId`] are
//! thin `u32` wrappers used as arena indices into the [`Netlist`] and
//! [`PackDesign`]. They are ordered so that every map keyed by them iterates
//! deterministically.
//!
//! [`Netlist`]: crate::netlist::Netlist
//! [`PackDesign`]: crate::design::PackDesign

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// A cell in the packing netlist.
    CellId
);

define_id!(
    /// A pin of a cell.
    CellPinId
);

define_id!(
    /// A net in the packing netlist.
    NetId
);

define_id!(
    /// A library cell (the type of a cell).
    LibCellId
);

define_id!(
    /// A cluster instance being packed.
    ClusterId
);
