//! Opaque ID newtypes for device and cluster-template entities.
//!
//! All IDs are thin `u32` wrappers used as arena indices into a
//! [`ClusterTemplate`](crate::ClusterTemplate) or [`Device`](crate::Device).
//! They are ordered so that routing decisions iterating over them are
//! deterministic.

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
    /// A wire (routing node) inside a cluster template.
    WireId
);

define_id!(
    /// A BEL inside a cluster template.
    BelId
);

define_id!(
    /// A BEL pin inside a cluster template.
    BelPinId
);

define_id!(
    /// A BEL type registered with a [`Device`](crate::Device).
    BelTypeId
);

define_id!(
    /// A pin group inside a cluster template.
    PinGroupId
);

define_id!(
    /// A cluster template.
    TemplateId
);
